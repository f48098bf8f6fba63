//! # Release Command
//!
//! Compile and publish a new version of the widget to a space, or to the
//! whole marketplace with `--global`.

use super::{Env, ServerArgs};
use crate::pipeline::{Pipeline, ReleaseOptions, ReleaseTarget};
use anyhow::Result;
use clap::Args;

#[derive(Debug, Clone, Default, Args)]
pub struct ReleaseArgs {
    /// The widget package you want to release
    pub package_id: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Version to release; defaults to a patch bump
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Release as a global widget
    #[arg(short = 'g', long)]
    pub global: bool,

    /// Space of a newly created package
    #[arg(short = 's', long = "spaceId")]
    pub space_id: Option<String>,

    /// Also upload the encrypted source code
    #[arg(short = 'o', long = "openSource")]
    pub open_source: bool,
}

impl ReleaseArgs {
    fn into_options(self, ci: bool) -> ReleaseOptions {
        ReleaseOptions {
            package_id: self.package_id,
            host: self.server.host,
            token: self.server.token,
            version: self.version,
            global: self.global,
            space_id: self.space_id,
            open_source: self.open_source,
            ci,
            ..ReleaseOptions::new(ReleaseTarget::Release)
        }
    }
}

/// Execute the `widget-cli release` command
pub async fn execute(env: &Env<'_>, args: ReleaseArgs) -> Result<()> {
    let root = env.root()?;
    let pipeline = Pipeline {
        root: &root,
        prompter: env.prompter,
        bundler: env.bundler,
    };

    let released = pipeline.run(args.into_options(env.ci)).await?;
    tracing::info!(%released, "release finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WIDGET_CONFIG_FILE;
    use crate::testing::{FakeBundler, ScriptedPrompter, StubServer};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_release_from_project_directory() {
        let server = StubServer::start().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(WIDGET_CONFIG_FILE),
            json!({
                "packageId": "wpkDeveloper",
                "spaceId": "spcTest",
                "version": "1.0.0",
                "name": { "en-US": "Developer Widget" }
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join(".gitignore"), "dist\n").unwrap();
        let nested = dir.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();

        let prompter = ScriptedPrompter::new(Vec::<&str>::new());
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: nested,
            prompter: &prompter,
            bundler: &bundler,
            ci: true,
        };

        let args = ReleaseArgs {
            server: ServerArgs {
                host: Some(server.host()),
                token: Some("uskToken".into()),
            },
            ..ReleaseArgs::default()
        };
        execute(&env, args).await.unwrap();

        assert_eq!(bundler.runs(), 1);
        assert_eq!(bundler.jobs()[0].root, dir.path());
        let released = server.bodies("/widget/package/v2/release");
        assert_eq!(released.len(), 1);
        assert_eq!(released[0]["version"], "1.0.1");
    }
}
