//! # Submit Command
//!
//! Send a global widget version for marketplace review.

use super::{Env, ServerArgs};
use crate::pipeline::{Pipeline, ReleaseOptions, ReleaseTarget};
use anyhow::Result;
use clap::Args;

#[derive(Debug, Clone, Default, Args)]
pub struct SubmitArgs {
    /// The global widget package you want to submit
    pub package_id: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Version to submit; defaults to a patch bump
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Space of a newly created package
    #[arg(short = 's', long = "spaceId")]
    pub space_id: Option<String>,

    /// Also upload the encrypted source code
    #[arg(short = 'o', long = "openSource")]
    pub open_source: bool,
}

/// Execute the `widget-cli submit` command
pub async fn execute(env: &Env<'_>, args: SubmitArgs) -> Result<()> {
    let root = env.root()?;
    let pipeline = Pipeline {
        root: &root,
        prompter: env.prompter,
        bundler: env.bundler,
    };

    let options = ReleaseOptions {
        package_id: args.package_id,
        host: args.server.host,
        token: args.server.token,
        version: args.version,
        space_id: args.space_id,
        open_source: args.open_source,
        ci: env.ci,
        ..ReleaseOptions::new(ReleaseTarget::Submit)
    };

    let submitted = pipeline.run(options).await?;
    tracing::info!(%submitted, "submit finished");
    Ok(())
}
