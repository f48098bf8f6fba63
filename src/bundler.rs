//! # Bundler Adapter
//!
//! Runs the project's JavaScript bundler and publishes one [`BuildEvent`]
//! per completed build on a broadcast channel. Production builds report
//! once; development builds keep watching and report on every rebuild.

use crate::config::{RELEASE_CODE_NAME, RELEASE_CODE_PATH, RELEASE_CODE_PROD_NAME};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Watching build for `start`
    Dev,
    /// One-shot optimized build for release
    Prod,
}

impl BuildMode {
    fn webpack_mode(self) -> &'static str {
        match self {
            BuildMode::Dev => "development",
            BuildMode::Prod => "production",
        }
    }

    pub fn output_name(self) -> &'static str {
        match self {
            BuildMode::Dev => RELEASE_CODE_NAME,
            BuildMode::Prod => RELEASE_CODE_PROD_NAME,
        }
    }
}

/// Everything a bundler needs for one build
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub root: PathBuf,
    pub mode: BuildMode,
    /// Package id baked into the bundle for CSS/JS namespacing
    pub package_id: String,
    /// Entry relative to the root; empty leaves it to the project's config
    pub entry: String,
    /// Public URL prefix of uploaded images
    pub assets_public: Option<String>,
}

impl BuildJob {
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(RELEASE_CODE_PATH)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir().join(self.mode.output_name())
    }

    /// Bundle path relative to the project root
    pub fn output_relative(&self) -> String {
        format!("{}/{}", RELEASE_CODE_PATH, self.mode.output_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A build finished with zero errors
    Succeeded,
    /// A build finished with errors; no bundle should be used
    Failed { errors: Vec<String> },
}

pub type BuildEvents = broadcast::Sender<BuildEvent>;

/// Channel for build events; subscribe listeners before starting a build
pub fn build_channel() -> BuildEvents {
    broadcast::channel(32).0
}

pub trait Bundler: Send + Sync {
    /// Start a build publishing to `events`.
    ///
    /// The returned task ends when the bundler process exits; dropping
    /// `events` at that point closes the channel for listeners.
    fn run(&self, job: &BuildJob, events: BuildEvents) -> Result<JoinHandle<Result<()>>>;
}

/// Build once and wait for the result.
///
/// Resolves to the bundle path iff the build reported zero errors.
pub async fn compile_once(bundler: &dyn Bundler, job: &BuildJob) -> Result<PathBuf> {
    let events = build_channel();
    let mut results = events.subscribe();
    let task = bundler.run(job, events)?;

    let outcome = results.recv().await;
    match outcome {
        Ok(BuildEvent::Succeeded) => {
            task.await.context("Bundler task panicked")??;
            Ok(job.output_path())
        }
        Ok(BuildEvent::Failed { errors }) => {
            print_errors(&errors);
            anyhow::bail!("Compile failed with {} error(s)", errors.len().max(1))
        }
        Err(broadcast::error::RecvError::Closed) => {
            task.await.context("Bundler task panicked")??;
            anyhow::bail!("Bundler exited without reporting a build result")
        }
        Err(broadcast::error::RecvError::Lagged(_)) => {
            anyhow::bail!("Missed the build result")
        }
    }
}

/// Echo compiler errors to stderr
pub fn print_errors(errors: &[String]) {
    for error in errors {
        eprintln!("{}", error);
    }
}

/// Scans bundler output for build completion lines
#[derive(Debug, Default)]
struct BuildTracker {
    errors: Vec<String>,
    reported: bool,
}

impl BuildTracker {
    fn observe(&mut self, line: &str) -> Option<BuildEvent> {
        let line = line.trim();

        if line.starts_with("ERROR") {
            self.errors.push(line.to_string());
            return None;
        }

        let completed_with = line.contains(" compiled with ");
        if !line.contains("compiled successfully") && !completed_with {
            return None;
        }

        self.reported = true;
        let errors = std::mem::take(&mut self.errors);

        if completed_with && line.contains(" error") {
            let errors = if errors.is_empty() {
                vec![line.to_string()]
            } else {
                errors
            };
            Some(BuildEvent::Failed { errors })
        } else {
            Some(BuildEvent::Succeeded)
        }
    }
}

/// Bundler driven through an external command (webpack CLI compatible)
#[derive(Debug, Clone)]
pub struct WebpackBundler {
    program: String,
    args: Vec<String>,
}

impl WebpackBundler {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace separated command such as `npx webpack`
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .context("Bundler command can not be empty")?;
        Ok(Self::new(program, parts))
    }

    fn command(&self, job: &BuildJob) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--mode")
            .arg(job.mode.webpack_mode())
            .arg("--no-color");

        if !job.entry.is_empty() {
            command.arg("--entry").arg(job.root.join(&job.entry));
        }

        command
            .arg("--output-path")
            .arg(job.output_dir())
            .arg("--output-filename")
            .arg(job.mode.output_name())
            .arg("--env")
            .arg(format!("packageId={}", job.package_id))
            .env("WIDGET_PACKAGE_ID", &job.package_id);

        if let Some(assets_public) = &job.assets_public {
            command
                .arg("--env")
                .arg(format!("assetsPublic={}", assets_public))
                .env("WIDGET_ASSETS_PUBLIC", assets_public);
        }

        if job.mode == BuildMode::Dev {
            command.arg("--watch");
        }

        command.current_dir(&job.root);
        command
    }
}

impl Bundler for WebpackBundler {
    fn run(&self, job: &BuildJob, events: BuildEvents) -> Result<JoinHandle<Result<()>>> {
        let mut command = self.command(job);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        tracing::info!(program = %self.program, mode = ?job.mode, package_id = %job.package_id, "starting bundler");
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start bundler `{}`", self.program))?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to capture bundler output")?;

        Ok(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut tracker = BuildTracker::default();

            while let Some(line) = lines
                .next_line()
                .await
                .context("Failed to read bundler output")?
            {
                tracing::debug!(target: "bundler", "{}", line);
                if let Some(event) = tracker.observe(&line) {
                    tracing::info!(?event, "build finished");
                    // no listeners left is not an error for the bundler
                    let _ = events.send(event);
                }
            }

            let status = child.wait().await.context("Failed to wait for bundler")?;
            tracing::debug!(%status, "bundler exited");

            if !tracker.reported {
                let event = if status.success() && tracker.errors.is_empty() {
                    BuildEvent::Succeeded
                } else {
                    let mut errors = std::mem::take(&mut tracker.errors);
                    errors.push(format!("bundler exited with {}", status));
                    BuildEvent::Failed { errors }
                };
                let _ = events.send(event);
            }

            Ok(())
        }))
    }
}
