//! # Start Command
//!
//! Watch-compile the widget and serve the bundle to a widget container.

use super::Env;
use crate::bundler::{build_channel, print_errors, BuildEvent, BuildJob, BuildMode};
use crate::config::{DEFAULT_PORT, RELEASE_CODE_NAME};
use crate::server::{self, DevServerOptions, Protocol, TlsFiles, WidgetInfo};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

const BANNER: &str = "************************";

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    /// Port of the dev server; status probes use the next port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, value_enum, default_value = "http")]
    pub protocol: Protocol,

    /// PEM certificate for https
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,

    /// PEM private key for https
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,

    /// Develop against the global package id
    #[arg(short = 'g', long)]
    pub global: bool,
}

/// Turns build events into console lines
struct BuildReporter {
    package_id: String,
    url: String,
    compiled: bool,
}

impl BuildReporter {
    fn new(package_id: String, url: String) -> Self {
        Self {
            package_id,
            url,
            compiled: false,
        }
    }

    fn report(&mut self, event: &BuildEvent) -> Vec<String> {
        match event {
            BuildEvent::Failed { .. } => Vec::new(),
            BuildEvent::Succeeded if self.compiled => vec![
                "Code has been recompiled".green().to_string(),
                self.url.clone(),
            ],
            BuildEvent::Succeeded => {
                self.compiled = true;
                vec![
                    BANNER.cyan().to_string(),
                    format!("Current packageID: {}", self.package_id.bold()),
                    "Copy the following address and paste it into the developing widget container:"
                        .to_string(),
                    self.url.green().to_string(),
                    BANNER.cyan().to_string(),
                ]
            }
        }
    }
}

async fn report_builds(mut events: Receiver<BuildEvent>, mut reporter: BuildReporter) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let BuildEvent::Failed { errors } = &event {
                    print_errors(errors);
                }
                for line in reporter.report(&event) {
                    println!("{}", line);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "build reporter fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Execute the `widget-cli start` command
pub async fn execute(env: &Env<'_>, args: StartArgs) -> Result<()> {
    let root = env.root()?;
    let config = root.widget_config()?;
    let package_id = config.bundle_package_id(args.global).to_string();

    let tls = match (args.cert, args.key) {
        (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
        _ => None,
    };
    let options = DevServerOptions {
        root: root.path().to_path_buf(),
        port: args.port,
        protocol: args.protocol,
        tls,
        widget: WidgetInfo {
            sandbox: config.sandbox,
            package_id: package_id.clone(),
        },
    };
    let url = options.bundle_url(RELEASE_CODE_NAME);

    let events = build_channel();
    let reporter = tokio::spawn(report_builds(
        events.subscribe(),
        BuildReporter::new(package_id.clone(), url),
    ));

    let job = BuildJob {
        root: root.path().to_path_buf(),
        mode: BuildMode::Dev,
        package_id,
        entry: config.entry.clone(),
        assets_public: None,
    };
    let compiler = env.bundler.run(&job, events.clone())?;

    let outcome = tokio::select! {
        served = server::serve(options, events) => served,
        compiled = compiler => match compiled.context("Bundler task panicked")? {
            Ok(()) => Err(anyhow::anyhow!("Bundler exited")),
            Err(err) => Err(err),
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            println!();
            println!("Stopping dev server");
            Ok(())
        }
    };

    reporter.abort();
    outcome
}
