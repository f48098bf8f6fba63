//! # Auth Command
//!
//! Verify an API token and store it with the host in the project's
//! private config.

use super::Env;
use crate::config::DEFAULT_HOST;
use crate::display::spinner;
use crate::project::PrivateConfig;
use crate::prompt;
use crate::registry::Registry;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

#[derive(Debug, Clone, Default, Args)]
pub struct AuthArgs {
    /// Your API Token
    pub token: Option<String>,

    /// Specifies the host of the server, such as https://apitable.com
    #[arg(short = 'h', long, env = "WIDGET_CLI_HOST")]
    pub host: Option<String>,
}

/// Execute the `widget-cli auth` command
pub async fn execute(env: &Env<'_>, args: AuthArgs) -> Result<()> {
    let message = authorize(env, args).await?;
    println!("{}", message.green());
    Ok(())
}

/// Verify the token and store the credentials, returning the message to show
async fn authorize(env: &Env<'_>, args: AuthArgs) -> Result<String> {
    let root = env.root()?;
    let stored = PrivateConfig::load(root.path());

    let (host, token) = if env.ci {
        let host = args
            .host
            .or(stored.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let token = args.token.context("API token is required")?;
        (host.trim_end_matches('/').to_string(), token)
    } else {
        let host = prompt::host(env.prompter, args.host, stored.host.as_deref())?;
        let token = prompt::token(env.prompter, args.token, None)?;
        (host, token)
    };

    let registry = Registry::new(&host, &token)?;
    let progress = spinner("Authorizing");
    let result = registry.auth(None).await;
    progress.finish_and_clear();
    result.context("Authorize failed")?;

    PrivateConfig::update(root.path(), &host, &token)?;
    tracing::info!(%host, "stored credentials");

    Ok("Authorize succeed!".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PRIVATE_CONFIG_FILE, WIDGET_CONFIG_FILE};
    use crate::testing::{FakeBundler, ScriptedPrompter, StubServer};
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(WIDGET_CONFIG_FILE), "{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_auth_stores_credentials() {
        let server = StubServer::start().await;
        let dir = project();
        let prompter = ScriptedPrompter::new([server.host()]);
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: false,
        };

        let args = AuthArgs {
            token: Some("uskToken".into()),
            host: None,
        };
        let message = authorize(&env, args).await.unwrap();

        assert_eq!(message, "Authorize succeed!");
        assert_eq!(prompter.asked(), vec!["Host of the server"]);
        assert_eq!(server.count("POST", "/widget/package/auth"), 1);
        let stored = PrivateConfig::load(dir.path());
        assert_eq!(stored.token.as_deref(), Some("uskToken"));
        assert_eq!(stored.host, Some(server.host()));
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_stored() {
        let server = StubServer::start().await;
        server.fail("/widget/package/auth", "invalid token", 401);
        let dir = project();
        let prompter = ScriptedPrompter::new(["uskWrong"]);
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: false,
        };

        let args = AuthArgs {
            token: None,
            host: Some(server.host()),
        };
        let err = execute(&env, args).await.unwrap_err();

        assert!(format!("{:#}", err).contains("invalid token (code: 401)"));
        assert!(!dir.path().join(PRIVATE_CONFIG_FILE).exists());
    }

    #[tokio::test]
    async fn test_auth_needs_a_project() {
        let dir = TempDir::new().unwrap();
        let prompter = ScriptedPrompter::new(Vec::<&str>::new());
        let bundler = FakeBundler::succeeding();
        let env = Env {
            cwd: dir.path().to_path_buf(),
            prompter: &prompter,
            bundler: &bundler,
            ci: false,
        };

        let err = execute(&env, AuthArgs::default()).await.unwrap_err();
        assert!(err.to_string().contains("Not a widget project"));
        assert!(prompter.asked().is_empty());
    }
}
