//! # Rollback Command

use super::{Env, ServerArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Debug, Clone, Default, Args)]
pub struct RollbackArgs {
    /// The widget package you want to rollback
    pub package_id: Option<String>,

    /// The version to rollback to
    pub version: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Rollback the global package of this project
    #[arg(short = 'g', long)]
    pub global: bool,
}

/// Execute the `widget-cli rollback` command
pub async fn execute(env: &Env<'_>, args: RollbackArgs) -> Result<()> {
    let package_id = env.package_id(args.package_id, args.global)?;
    let version = env.require(
        args.version,
        "The version of the widget package you want to rollback",
        None,
    )?;
    let registry = env.registry(&args.server)?;

    println!("{}", format!("Rollback version to {}", version).yellow());
    let message = registry.rollback(&package_id, &version).await?;
    println!("{}", message.green());
    Ok(())
}
