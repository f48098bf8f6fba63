//! # Release Pipeline
//!
//! Shared flow behind `release` and `submit`: resolve the package and
//! version, make sure the remote package exists, upload images, compile,
//! optionally pack the source, upload artifacts and register the version.

use crate::bundler::{compile_once, BuildJob, BuildMode, Bundler};
use crate::config::SECRET_KEY_LENGTH;
use crate::display::{readable_file_size, spinner};
use crate::ids::{random_id, random_string};
use crate::manifest::WidgetConfig;
use crate::package::{pack_source, project_files, Encryption};
use crate::project::{PrivateConfig, WidgetRoot};
use crate::prompt::{self, Prompter};
use crate::registry::{CreatePackage, PackageManifest, PackageType, Registry, ReleaseType};
use crate::upload::{upload_images, upload_package_assets, upload_package_bundle};
use crate::version::{check_version, increase_version};
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// Publish a version to a space, or globally with `--global`
    Release,
    /// Request review of a global package version
    Submit,
}

impl ReleaseTarget {
    fn verb(self) -> &'static str {
        match self {
            ReleaseTarget::Release => "release",
            ReleaseTarget::Submit => "submit",
        }
    }
}

/// Flags shared by `release` and `submit`
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub target: ReleaseTarget,
    pub package_id: Option<String>,
    pub host: Option<String>,
    pub token: Option<String>,
    pub version: Option<String>,
    pub global: bool,
    pub space_id: Option<String>,
    /// Ship an encrypted copy of the source alongside the bundle
    pub open_source: bool,
    /// Never prompt; take defaults and create missing packages
    pub ci: bool,
}

impl ReleaseOptions {
    pub fn new(target: ReleaseTarget) -> Self {
        Self {
            target,
            package_id: None,
            host: None,
            token: None,
            version: None,
            global: false,
            space_id: None,
            open_source: false,
            ci: false,
        }
    }

    fn is_global(&self) -> bool {
        self.target == ReleaseTarget::Submit || self.global
    }
}

/// Identity of the published version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub target: ReleaseTarget,
    pub package_id: String,
    pub version: String,
}

impl Released {
    pub fn success_message(&self) -> String {
        format!("successful {} widget {}", self.target.verb(), self)
    }
}

impl std::fmt::Display for Released {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.package_id, self.version)
    }
}

/// Removes the local source archive when dropped
struct SourceArchive(PathBuf);

impl Drop for SourceArchive {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.0) {
            tracing::warn!(path = %self.0.display(), error = %err, "failed to remove source archive");
        }
    }
}

pub struct Pipeline<'a> {
    pub root: &'a WidgetRoot,
    pub prompter: &'a dyn Prompter,
    pub bundler: &'a dyn Bundler,
}

impl Pipeline<'_> {
    pub async fn run(&self, options: ReleaseOptions) -> Result<Released> {
        let verb = options.target.verb();
        let global = options.is_global();
        let config = self.root.widget_config()?;

        let package_id = self.resolve_package_id(&options, &config)?;

        let private = PrivateConfig::load(self.root.path());
        let (host, token) = prompt::credentials(
            self.prompter,
            options.host.clone(),
            options.token.clone(),
            &private,
            options.ci,
        )?;

        let version = self.resolve_version(&options)?;
        let config = match options.target {
            ReleaseTarget::Submit => self.complete_author_details(&options, &config)?,
            ReleaseTarget::Release => config,
        };
        tracing::info!(target_kind = verb, package_id = ?package_id, %version, global, "starting pipeline");

        let registry = Registry::new(&host, &token)?;
        let package_id = match package_id {
            Some(package_id) => self.ensure_package(&registry, &options, &config, package_id).await?,
            None => self.create_global_package(&registry, &options, &config).await?,
        };

        if options.target == ReleaseTarget::Submit {
            self.root
                .update_widget_config(json!({ "globalPackageId": package_id }))?;
        }

        self.root
            .update_widget_config(json!({ "version": version }))?;
        self.root.sync_package_json_version(&version)?;
        let config = self.root.widget_config()?;

        let files = project_files(self.root.path())?;
        let progress = spinner("uploading images");
        let assets_public = upload_images(&registry, self.root, &files, &package_id).await;
        progress.finish_and_clear();
        let assets_public = assets_public?;

        println!("{}", "=== Compiling Widget ===".bright_yellow());
        let job = BuildJob {
            root: self.root.path().to_path_buf(),
            mode: BuildMode::Prod,
            package_id: package_id.clone(),
            entry: config.entry.clone(),
            assets_public,
        };
        let progress = spinner("compiling");
        let bundle = compile_once(self.bundler, &job).await;
        progress.finish_and_clear();
        let bundle = bundle?;
        println!("Compile Succeed: {}", job.output_relative());

        if options.target == ReleaseTarget::Submit {
            print_submit_details(&config, &host, &package_id, &version, &bundle)?;
        }

        let released = Released {
            target: options.target,
            package_id: package_id.clone(),
            version: version.clone(),
        };

        let mut secret_key = None;
        let mut source_archive = None;
        if options.open_source {
            let encryption = Encryption::Aes256(random_string(SECRET_KEY_LENGTH));
            println!("{}", format!("📦  {}", released).bright_green());

            let progress = spinner("packing source code");
            let report = pack_source(self.root.path(), &released.to_string(), &version, encryption);
            progress.finish_and_clear();
            let report = report?;

            source_archive = Some(SourceArchive(report.output.clone()));
            report.print();
            secret_key = report.encryption.secret().map(str::to_string);
        }
        println!();

        let progress = spinner("uploading package assets");
        let asset_tokens =
            upload_package_assets(&registry, self.root, &config, &package_id, &version).await;
        progress.finish_and_clear();
        let asset_tokens = asset_tokens?;

        let progress = spinner("uploading bundle");
        let bundle_tokens = upload_package_bundle(
            &registry,
            &bundle,
            source_archive.as_ref().map(|archive| archive.0.as_path()),
            &package_id,
            &version,
        )
        .await;
        progress.finish_and_clear();
        let (release_code_bundle, source_code_bundle) = bundle_tokens?;

        let manifest = PackageManifest {
            space_id: match options.target {
                ReleaseTarget::Release => Some(
                    options
                        .space_id
                        .clone()
                        .unwrap_or_else(|| config.space_id.clone()),
                ),
                ReleaseTarget::Submit => None,
            },
            package_id: package_id.clone(),
            version: version.clone(),
            name: serde_json::to_value(&config.name)?,
            description: serde_json::to_value(&config.description)?,
            icon: asset_tokens.icon,
            cover: asset_tokens.cover,
            author_name: config.author_name.clone(),
            author_icon: asset_tokens.author_icon,
            author_link: config.author_link.clone(),
            author_email: config.author_email.clone(),
            release_code_bundle,
            source_code_bundle,
            secret_key,
            sandbox: config.sandbox,
            website: config.website.clone(),
            install_env: config.install_env.clone(),
            runtime_env: config.runtime_env.clone(),
        };

        let progress = spinner("uploading");
        let outcome = match options.target {
            ReleaseTarget::Release => registry.release(&manifest).await,
            ReleaseTarget::Submit => registry.submit(&manifest).await,
        };
        progress.finish_and_clear();
        drop(source_archive);
        outcome.with_context(|| format!("Failed to {} {}", verb, released))?;

        println!("{}", released.success_message().bright_green());
        Ok(released)
    }

    /// Explicit id, else the configured id; `None` asks for a new global package
    fn resolve_package_id(&self, options: &ReleaseOptions, config: &WidgetConfig) -> Result<Option<String>> {
        let global = options.is_global();
        let explicit = options
            .package_id
            .clone()
            .filter(|id| !id.trim().is_empty());

        if let Some(package_id) = explicit.or_else(|| config.package_id_for(global).map(str::to_string)) {
            return Ok(Some(package_id));
        }

        match options.target {
            ReleaseTarget::Release if global => Ok(None),
            ReleaseTarget::Submit if !options.ci => {
                prompt::required(self.prompter, None, "packageId", None).map(Some)
            }
            _ => anyhow::bail!("can not find packageId in config"),
        }
    }

    fn resolve_version(&self, options: &ReleaseOptions) -> Result<String> {
        let current = self.root.current_version()?;
        let version = match options.version.clone().filter(|v| !v.trim().is_empty()) {
            Some(version) => version,
            None => {
                let bumped = increase_version(&current)?;
                if options.ci {
                    bumped
                } else {
                    prompt::required(
                        self.prompter,
                        None,
                        &format!("{} version", options.target.verb()),
                        Some(&bumped),
                    )?
                }
            }
        };

        Ok(check_version(version.trim(), &current)?.to_string())
    }

    /// Fetch the remote package, creating it after confirmation when absent
    async fn ensure_package(
        &self,
        registry: &Registry,
        options: &ReleaseOptions,
        config: &WidgetConfig,
        package_id: String,
    ) -> Result<String> {
        if registry.get_package(&package_id).await?.is_some() {
            return Ok(package_id);
        }

        println!(
            "{}",
            format!("Widget package {} does not exist on the server", package_id).bright_yellow()
        );
        if !options.ci
            && !self
                .prompter
                .confirm(&format!("Create widget package {}?", package_id), true)?
        {
            anyhow::bail!("canceled");
        }

        let global = options.is_global();
        let created = self
            .create(registry, options, config, Some(package_id), PackageType::ThirdParty)
            .await?;

        let patch = if global {
            json!({ "globalPackageId": created })
        } else {
            json!({ "packageId": created })
        };
        self.root.update_widget_config(patch)?;

        Ok(created)
    }

    /// First global release: derive a new package from the space package
    async fn create_global_package(
        &self,
        registry: &Registry,
        options: &ReleaseOptions,
        config: &WidgetConfig,
    ) -> Result<String> {
        let package_type = match config.package_id_for(false) {
            Some(space_package_id) => registry
                .get_package(space_package_id)
                .await?
                .map(|package| package.package_type())
                .unwrap_or(PackageType::ThirdParty),
            None => PackageType::ThirdParty,
        };

        let kind = match package_type {
            PackageType::Official => {
                println!("{}", "Your project is a Official widget project".bright_yellow());
                "Official"
            }
            PackageType::ThirdParty => "Custom",
        };
        println!(
            "{}",
            format!("You are releasing a new [global] [{}] widget!", kind).bright_yellow()
        );

        let suggested = random_id("wpk", 10);
        let global_package_id = if options.ci {
            suggested
        } else {
            prompt::required(
                self.prompter,
                None,
                "Specify the globalPackageId, Start with \"wpk\" followed by 10 alphanumeric or numbers",
                Some(&suggested),
            )?
        };

        let created = self
            .create(registry, options, config, Some(global_package_id), package_type)
            .await?;
        self.root
            .update_widget_config(json!({ "globalPackageId": created }))?;

        Ok(created)
    }

    async fn create(
        &self,
        registry: &Registry,
        options: &ReleaseOptions,
        config: &WidgetConfig,
        package_id: Option<String>,
        package_type: PackageType,
    ) -> Result<String> {
        let request = CreatePackage {
            space_id: options
                .space_id
                .clone()
                .unwrap_or_else(|| config.space_id.clone()),
            package_id,
            package_type,
            release_type: if options.is_global() {
                ReleaseType::Global
            } else {
                ReleaseType::Space
            },
            author_name: config.author_name.clone(),
            author_link: config.author_link.clone(),
            author_email: config.author_email.clone(),
            name: serde_json::to_string(&config.name)?,
        };
        tracing::debug!(request = ?request, "creating widget package");

        let created = registry
            .create_package(&request)
            .await
            .context("Failed to create widget package")?;
        println!("Successful create widgetPackage from server");

        Ok(created.package_id)
    }

    /// Prompt for author details a submission needs, store them and
    /// return the updated config
    fn complete_author_details(
        &self,
        options: &ReleaseOptions,
        config: &WidgetConfig,
    ) -> Result<WidgetConfig> {
        let ask = |current: &Option<String>, prompt: &str| -> Result<Value> {
            if let Some(value) = current.as_ref().filter(|value| !value.is_empty()) {
                return Ok(Value::String(value.clone()));
            }
            if options.ci {
                return Ok(Value::Null);
            }
            Ok(Value::String(self.prompter.input(prompt, None)?.trim().to_string()))
        };

        let patch = json!({
            "authorName": ask(&config.author_name, "Author name")?,
            "authorLink": ask(&config.author_link, "Author website")?,
            "authorEmail": ask(&config.author_email, "Author Email")?,
            "website": ask(&config.website, "Website")?,
        });
        self.root.update_widget_config(patch)
    }
}

fn print_submit_details(
    config: &WidgetConfig,
    host: &str,
    package_id: &str,
    version: &str,
    bundle: &Path,
) -> Result<()> {
    let bundle_size = std::fs::metadata(bundle)
        .with_context(|| format!("Failed to stat {}", bundle.display()))?
        .len();
    let optional = |value: &Option<String>| value.clone().unwrap_or_default();

    println!();
    println!("{}", "=== Package Details ===".bright_yellow());
    println!("name:                {}", config.display_name());
    println!("host:                {}", host);
    println!("packageId:           {}", package_id);
    println!("version:             {}", version);
    println!("releaseBundleSize:   {}", readable_file_size(bundle_size));
    println!("description          {}", config.display_description());
    println!("icon                 {}", config.icon);
    println!("cover                {}", config.cover);
    println!("authorName           {}", optional(&config.author_name));
    println!("authorIcon           {}", config.author_icon);
    println!("authorEmail          {}", optional(&config.author_email));
    println!("authorLink           {}", optional(&config.author_link));
    println!("sandbox              {}", config.sandbox.unwrap_or(false));
    println!("website              {}", optional(&config.website));

    Ok(())
}
