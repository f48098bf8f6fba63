//! # Commands
//!
//! One module per subcommand. Each exposes its clap arguments and an
//! `execute` entry point taking the shared [`Env`].

pub mod auth;
pub mod ban;
pub mod init;
pub mod link;
pub mod list_release;
pub mod release;
pub mod rollback;
pub mod start;
pub mod submit;
pub mod unpublish;

use crate::bundler::Bundler;
use crate::project::{PrivateConfig, WidgetRoot};
use crate::prompt::{self, Prompter};
use crate::registry::Registry;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Server flags shared by authenticated commands
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Specifies the host of the server, such as https://apitable.com
    #[arg(short = 'h', long, env = "WIDGET_CLI_HOST")]
    pub host: Option<String>,

    /// Your API Token
    #[arg(short = 't', long, env = "WIDGET_CLI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Process-wide inputs handed to every command
pub struct Env<'a> {
    /// Directory the command was started from
    pub cwd: PathBuf,
    pub prompter: &'a dyn Prompter,
    pub bundler: &'a dyn Bundler,
    /// Never prompt; confirmations are taken as accepted
    pub ci: bool,
}

impl Env<'_> {
    /// Widget project containing the working directory
    pub fn root(&self) -> Result<WidgetRoot> {
        WidgetRoot::discover(&self.cwd)
    }

    fn private_config(&self) -> PrivateConfig {
        self.root()
            .map(|root| PrivateConfig::load(root.path()))
            .unwrap_or_default()
    }

    /// API client from flags, stored credentials or prompts
    pub fn registry(&self, server: &ServerArgs) -> Result<Registry> {
        let (host, token) = prompt::credentials(
            self.prompter,
            server.host.clone(),
            server.token.clone(),
            &self.private_config(),
            self.ci,
        )?;
        Registry::new(&host, &token)
    }

    /// Package to act on: the argument, else the project's config, else a prompt
    pub fn package_id(&self, explicit: Option<String>, global: bool) -> Result<String> {
        if let Some(package_id) = explicit.filter(|id| !id.trim().is_empty()) {
            return Ok(package_id.trim().to_string());
        }

        let configured = self
            .root()
            .and_then(|root| root.widget_config())
            .ok()
            .and_then(|config| config.package_id_for(global).map(str::to_string));
        if let Some(package_id) = configured {
            return Ok(package_id);
        }

        self.require(None, "packageId", None)
            .context("can not find packageId in config")
    }

    /// A required value: given, else prompted (CI takes the default or fails)
    pub fn require(&self, value: Option<String>, prompt: &str, default: Option<&str>) -> Result<String> {
        if self.ci {
            return value
                .filter(|v| !v.trim().is_empty())
                .or_else(|| default.map(str::to_string))
                .map(|v| v.trim().to_string())
                .with_context(|| format!("{} is required", prompt));
        }
        prompt::required(self.prompter, value, prompt, default)
    }

    /// Ask for confirmation; CI mode always proceeds
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.ci {
            return Ok(true);
        }
        self.prompter.confirm(prompt, true)
    }
}
