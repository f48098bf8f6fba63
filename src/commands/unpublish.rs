//! # Unpublish Command
//!
//! Take a package offline after showing what is about to go.

use super::list_release::package_details;
use super::{Env, ServerArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Debug, Clone, Default, Args)]
pub struct UnpublishArgs {
    /// The widget package you want to unpublish
    pub package_id: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Skip the confirmation
    #[arg(long = "noConfirm", alias = "no-confirm")]
    pub no_confirm: bool,

    /// Unpublish the global package of this project
    #[arg(short = 'g', long)]
    pub global: bool,
}

/// Execute the `widget-cli unpublish` command
pub async fn execute(env: &Env<'_>, args: UnpublishArgs) -> Result<()> {
    let package_id = env.package_id(args.package_id, args.global)?;
    let registry = env.registry(&args.server)?;

    let Some(package) = registry.get_package(&package_id).await? else {
        anyhow::bail!("packageId: {} not exist", package_id);
    };

    println!("{}", package_details(&package));

    if !args.no_confirm {
        let prompt = format!("Are you sure to unpublish {}", package.name());
        if !env.confirm(&prompt)? {
            println!("canceled!");
            return Ok(());
        }
    }

    let message = registry.unpublish(&package_id).await?;
    tracing::debug!(%message, "unpublished");
    println!("{}", "Unpublish succeed!".green());
    Ok(())
}
