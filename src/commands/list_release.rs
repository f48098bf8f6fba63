//! # List Release Command
//!
//! Print a package's details and its release history.

use super::{Env, ServerArgs};
use crate::display::{plain, render_table, wrap_output, Dict};
use crate::registry::{ReleaseHistoryEntry, WidgetPackage};
use anyhow::Result;
use clap::Args;

const NO_DATA: &str = "No data";
const BUNDLE_COLUMN_WIDTH: usize = 34;
const HISTORY_HEADERS: [&str; 5] = [
    "Releasesha",
    "Version",
    "Releasecodebundle",
    "Sourcecodebundle",
    "Status",
];

#[derive(Debug, Clone, Default, Args)]
pub struct ListReleaseArgs {
    /// The widget package to list
    pub package_id: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,

    /// List the global package of this project
    #[arg(short = 'g', long)]
    pub global: bool,
}

/// Execute the `widget-cli list-release` command
pub async fn execute(env: &Env<'_>, args: ListReleaseArgs) -> Result<()> {
    let package_id = env.package_id(args.package_id, args.global)?;
    let registry = env.registry(&args.server)?;

    let Some(package) = registry.get_package(&package_id).await? else {
        println!("packageId: {} not exist", package_id);
        return Ok(());
    };
    let history = registry.release_history(&package_id).await?;

    println!("{}", package_details(&package));
    println!();
    println!("=== Package Release Details ===");
    println!("{}", release_table(&history));
    Ok(())
}

pub(super) fn package_details(package: &WidgetPackage) -> String {
    let mut lines = vec!["=== Package Details ===".to_string()];

    for (key, value) in package.fields().filter(|(_, value)| !value.is_null()) {
        let value = match Dict::for_key(key) {
            Some(dict) => dict.translate(value),
            None => plain(value),
        };
        lines.push(format!("{:<15}{}", format!("{}:", key), value));
    }

    lines.join("\n")
}

fn or_no_data(value: Option<&str>) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or(NO_DATA)
        .to_string()
}

fn release_table(history: &[ReleaseHistoryEntry]) -> String {
    let mut rows: Vec<Vec<String>> = history
        .iter()
        .map(|entry| {
            let bundle = |value: &Option<String>| {
                wrap_output(&or_no_data(value.as_deref()), BUNDLE_COLUMN_WIDTH)
            };
            vec![
                or_no_data(entry.release_sha.as_deref()),
                or_no_data(entry.version.as_deref()),
                bundle(&entry.release_code_bundle),
                bundle(&entry.source_code_bundle),
                entry
                    .status
                    .as_ref()
                    .filter(|status| !status.is_null())
                    .map(|status| Dict::ReleaseStatus.translate(status))
                    .unwrap_or_else(|| NO_DATA.to_string()),
            ]
        })
        .collect();

    if rows.is_empty() {
        rows.push(vec![NO_DATA.to_string(); HISTORY_HEADERS.len()]);
    }

    render_table(&HISTORY_HEADERS, &rows)
}
