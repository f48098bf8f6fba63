//! # Interactive Prompts
//!
//! Commands ask for missing parameters through [`Prompter`] so tests can
//! script answers instead of driving a terminal.

use crate::config::DEFAULT_HOST;
use crate::project::PrivateConfig;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password};

pub trait Prompter: Send + Sync {
    /// Free-text input; an empty answer takes `default`
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Masked input that must not be empty
    fn secret(&self, prompt: &str) -> Result<String>;

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Prompts on the controlling terminal
pub struct Terminal;

impl Prompter for Terminal {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        Ok(Password::new().with_prompt(prompt).interact()?)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

/// Ask for a value unless it was supplied; rejects empty answers
pub fn required(
    prompter: &dyn Prompter,
    value: Option<String>,
    prompt: &str,
    default: Option<&str>,
) -> Result<String> {
    let value = match value.filter(|v| !v.trim().is_empty()) {
        Some(value) => value,
        None => prompter.input(prompt, default)?,
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("{} is required", prompt);
    }

    Ok(value)
}

/// Resolve the server host, without a trailing slash
pub fn host(prompter: &dyn Prompter, host: Option<String>, default: Option<&str>) -> Result<String> {
    let host = required(
        prompter,
        host,
        "Host of the server",
        Some(default.unwrap_or(DEFAULT_HOST)),
    )?;

    Ok(host.trim_end_matches('/').to_string())
}

/// Resolve the API token; the stored token is offered as the default
pub fn token(prompter: &dyn Prompter, token: Option<String>, stored: Option<&str>) -> Result<String> {
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }

    if let Some(stored) = stored.filter(|t| !t.is_empty()) {
        return required(prompter, None, "Your API Token", Some(stored));
    }

    let token = prompter.secret("Your API Token")?;
    if token.trim().is_empty() {
        anyhow::bail!("Your API Token is required");
    }

    Ok(token.trim().to_string())
}

/// Host and token for an authenticated command.
///
/// Flags win, then the stored private config. Gaps are prompted for,
/// except in CI mode where they are an error.
pub fn credentials(
    prompter: &dyn Prompter,
    host: Option<String>,
    token: Option<String>,
    stored: &PrivateConfig,
    ci: bool,
) -> Result<(String, String)> {
    let non_empty = |value: &String| !value.trim().is_empty();
    let host = host.filter(non_empty).or_else(|| stored.host.clone().filter(non_empty));
    let token = token.filter(non_empty).or_else(|| stored.token.clone().filter(non_empty));

    if ci {
        let host = host.context("Host of the server is required, pass --host")?;
        let token = token.context("API token is required, pass --token")?;
        return Ok((host.trim().trim_end_matches('/').to_string(), token.trim().to_string()));
    }

    let host = match host {
        Some(host) => host.trim().trim_end_matches('/').to_string(),
        None => self::host(prompter, None, None)?,
    };
    let token = self::token(prompter, token, None)?;

    Ok((host, token))
}
