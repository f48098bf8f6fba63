//! # Init Command
//!
//! Create a widget project from a template archive and bind it to a
//! space and package.

use super::{Env, ServerArgs};
use crate::config::{DEFAULT_HOST, WIDGET_CONFIG_FILE};
use crate::display::{kebab_to_camel, spinner};
use crate::manifest::WidgetConfig;
use crate::project::{PrivateConfig, WidgetRoot};
use crate::prompt;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use zip::ZipArchive;

const DEFAULT_NAME: &str = "my-widget";

#[derive(Debug, Clone, Default, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Name your widget and project
    #[arg(short = 'c', long)]
    pub name: Option<String>,

    /// The template code zip from apitable or github (URL or local file)
    #[arg(short = 'u', long)]
    pub template: Option<String>,

    /// The widget package id
    #[arg(short = 'p', long = "packageId")]
    pub package_id: Option<String>,

    /// In which space to put the widget on
    #[arg(short = 's', long = "spaceId")]
    pub space_id: Option<String>,

    /// With official capacity
    #[arg(long, hide = true)]
    pub official: bool,

    /// Do not create a git repository
    #[arg(long)]
    pub skip_git: bool,
}

/// Execute the `widget-cli init` command
pub async fn execute(env: &Env<'_>, args: InitArgs) -> Result<()> {
    if args.official {
        println!("{}", "Your are creating a official widget project!".bright_yellow());
    }

    let (token, host) = if env.ci {
        let token = env.require(args.server.token, "Your API Token", None)?;
        let host = env.require(args.server.host, "Host of the server", Some(DEFAULT_HOST))?;
        (token, host.trim_end_matches('/').to_string())
    } else {
        let token = prompt::token(env.prompter, args.server.token, None)?;
        let host = prompt::host(env.prompter, args.server.host, None)?;
        (token, host)
    };

    let space_id = env.require(args.space_id, "Your target spaceId", None)?;
    let package_id = env.require(args.package_id, "Your target packageId", None)?;
    let template = env.require(args.template, "Your target template", None)?;
    let name = env.require(
        args.name,
        "Name your widget and project (no white space in name)",
        Some(DEFAULT_NAME),
    )?;
    validate_name(&name)?;

    let dest = env.cwd.join(&name);
    if dest.exists() {
        anyhow::bail!("{} already exists", dest.display());
    }

    let progress = spinner(&format!("fetching template from {}", template));
    let archive = fetch_template(&template).await;
    progress.finish_and_clear();
    extract_template(&archive?, &dest)?;
    tracing::info!(dest = %dest.display(), "extracted template");

    let camel = kebab_to_camel(&name);
    if !dest.join(WIDGET_CONFIG_FILE).exists() {
        std::fs::write(dest.join(WIDGET_CONFIG_FILE), "{}")
            .with_context(|| format!("Failed to create {}", WIDGET_CONFIG_FILE))?;
    }
    WidgetConfig::merge(
        &dest,
        json!({
            "authorEmail": null,
            "authorLink": null,
            "authorName": null,
            "globalPackageId": null,
            "packageId": package_id,
            "spaceId": space_id,
            "name": { "en-US": camel },
            "description": { "en-US": format!("{} description", camel) },
        }),
    )?;

    PrivateConfig::update(&dest, &host, &token)?;
    WidgetRoot::at(&dest).sync_package_json_version("0.0.0")?;

    if !args.skip_git {
        if let Err(err) = git_init(&dest).await {
            println!("{}", format!("Error initializing widget! {:#}", err).red());
        }
    }

    println!(
        "{}",
        format!(
            "your widget: {} is successfully created, cd ./{} go check!",
            name, name
        )
        .bright_green()
    );
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        anyhow::bail!("name should only contain alphabet/-/_");
    }
    Ok(())
}

/// Template bytes from a URL, or from a local file when `template` is a path
async fn fetch_template(template: &str) -> Result<Vec<u8>> {
    if !template.starts_with("http://") && !template.starts_with("https://") {
        return std::fs::read(template)
            .with_context(|| format!("Failed to read template {}", template));
    }

    let response = reqwest::get(template)
        .await
        .with_context(|| format!("Failed to download template {}", template))?
        .error_for_status()
        .with_context(|| format!("Failed to download template {}", template))?;
    let bytes = response
        .bytes()
        .await
        .context("Failed to read template body")?;

    Ok(bytes.to_vec())
}

/// Extract the archive's first directory into `dest`
fn extract_template(archive: &[u8], dest: &Path) -> Result<()> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).context("Template is not a zip archive")?;

    let mut prefix: Option<PathBuf> = None;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            prefix = entry.enclosed_name();
            break;
        }
    }
    let prefix = prefix.context("Template archive has no top-level directory")?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping unsafe template entry");
            continue;
        };
        let Ok(relative) = name.strip_prefix(&prefix) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = std::fs::File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        std::io::copy(&mut entry, &mut file)
            .with_context(|| format!("Failed to extract {}", target.display()))?;
    }

    Ok(())
}

async fn git_init(dir: &Path) -> Result<()> {
    let steps: [(&str, &[&str]); 3] = [
        ("git init", &["init"]),
        ("git add .", &["add", "."]),
        ("git commit", &["commit", "-m", "initial commit"]),
    ];

    for (label, git_args) in steps {
        println!("{}", label.bright_yellow());
        let output = Command::new("git")
            .args(git_args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", label))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} failed: {}",
                label,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }

    Ok(())
}
