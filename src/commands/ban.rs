//! # Ban Command
//!
//! Ban or unban a widget package (administrators only).

use super::{Env, ServerArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Debug, Clone, Default, Args)]
pub struct BanArgs {
    /// The widget package you want to ban
    pub package_id: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Unban the package instead
    #[arg(long)]
    pub unban: bool,

    /// Ban the global package of this project
    #[arg(short = 'g', long)]
    pub global: bool,
}

/// Execute the `widget-cli ban` command
pub async fn execute(env: &Env<'_>, args: BanArgs) -> Result<()> {
    let package_id = env.package_id(args.package_id, args.global)?;
    let registry = env.registry(&args.server)?;

    let action = if args.unban { "Unban" } else { "Ban" };
    println!("{}", format!("{} widget package: {}", action, package_id).yellow());

    if !env.confirm("Are you sure?")? {
        println!("canceled");
        return Ok(());
    }

    let message = registry.ban(&package_id, args.unban).await?;
    println!("{}", message.green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBundler, ScriptedPrompter, StubServer};
    use serde_json::json;
    use tempfile::TempDir;

    fn args(server: &StubServer) -> BanArgs {
        BanArgs {
            package_id: Some("wpkDeveloper".into()),
            server: ServerArgs {
                host: Some(server.host()),
                token: Some("uskToken".into()),
            },
            ..BanArgs::default()
        }
    }

    #[tokio::test]
    async fn test_ban_after_confirm() {
        let server = StubServer::start().await;
        let dir = TempDir::new().unwrap();
        let prompter = ScriptedPrompter::new(["y"]);
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: false,
        };

        execute(&env, args(&server)).await.unwrap();

        assert_eq!(prompter.asked(), vec!["Are you sure?"]);
        assert_eq!(
            server.bodies("/widget/package/ban"),
            vec![json!({ "packageId": "wpkDeveloper", "unban": false })]
        );
    }

    #[tokio::test]
    async fn test_declined_ban_sends_nothing() {
        let server = StubServer::start().await;
        let dir = TempDir::new().unwrap();
        let prompter = ScriptedPrompter::new(["n"]);
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: false,
        };

        execute(&env, args(&server)).await.unwrap();
        assert_eq!(server.count("POST", "/widget/package/ban"), 0);
    }

    #[tokio::test]
    async fn test_unban_in_ci() {
        let server = StubServer::start().await;
        let dir = TempDir::new().unwrap();
        let prompter = ScriptedPrompter::new(Vec::<&str>::new());
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: true,
        };

        let args = BanArgs {
            unban: true,
            ..args(&server)
        };
        execute(&env, args).await.unwrap();

        assert!(prompter.asked().is_empty());
        assert_eq!(server.bodies("/widget/package/ban")[0]["unban"], true);
    }
}
