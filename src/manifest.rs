//! # Widget Config
//!
//! Typed view over `widget.config.json`. Writes go through [`WidgetConfig::merge`]
//! so keys this crate does not know about survive a round trip.

use crate::config::{PLACEHOLDER_PACKAGE_ID, WIDGET_CONFIG_FILE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Localized text keyed by locale, e.g. `{"en-US": "Chart"}`
pub type Localized = BTreeMap<String, String>;

/// Widget project config (widget.config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Space package id, assigned at init
    #[serde(default)]
    pub package_id: String,
    /// Global package id, assigned on first global release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_package_id: Option<String>,
    /// Space the widget is bound to
    #[serde(default)]
    pub space_id: String,
    /// Last released version
    #[serde(default)]
    pub version: String,
    /// Bundler entry, relative to the project root
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub name: Localized,
    #[serde(default)]
    pub description: Localized,
    /// Icon path, 64x64 png
    #[serde(default)]
    pub icon: String,
    /// Cover path, 16:9 image
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub author_name: Option<String>,
    /// Author icon path, 64x64 png
    #[serde(default)]
    pub author_icon: String,
    #[serde(default)]
    pub author_link: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    /// Render inside an isolated iframe
    #[serde(default)]
    pub sandbox: Option<bool>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub install_env: Option<Vec<String>>,
    #[serde(default)]
    pub runtime_env: Option<Vec<String>>,
}

impl WidgetConfig {
    /// Load the widget config from a project root
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(WIDGET_CONFIG_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Merge `patch` into the stored document.
    ///
    /// Top-level keys in `patch` overwrite stored keys; a `null` value removes
    /// the key. Everything else in the file is left untouched.
    pub fn merge<P: AsRef<Path>>(root: P, patch: Value) -> Result<Self> {
        let path = root.as_ref().join(WIDGET_CONFIG_FILE);
        let mut document = read_object(&path)?;

        let Value::Object(patch) = patch else {
            anyhow::bail!("Widget config patch must be a JSON object");
        };

        for (key, value) in patch {
            if value.is_null() {
                document.remove(&key);
            } else {
                document.insert(key, value);
            }
        }

        let content = serde_json::to_string_pretty(&Value::Object(document))
            .context("Failed to serialize widget config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Self::load(root)
    }

    /// Package id a command should operate on
    pub fn package_id_for(&self, global: bool) -> Option<&str> {
        let id = if global {
            self.global_package_id.as_deref()
        } else {
            Some(self.package_id.as_str())
        };

        id.filter(|id| !id.is_empty())
    }

    /// Package id baked into a bundle, falling back to the placeholder
    pub fn bundle_package_id(&self, global: bool) -> &str {
        self.package_id_for(global).unwrap_or(PLACEHOLDER_PACKAGE_ID)
    }

    /// Display name, preferring Chinese then English
    pub fn display_name(&self) -> &str {
        localized(&self.name)
    }

    pub fn display_description(&self) -> &str {
        localized(&self.description)
    }
}

fn localized(text: &Localized) -> &str {
    text.get("zh-CN")
        .or_else(|| text.get("en-US"))
        .or_else(|| text.values().next())
        .map(String::as_str)
        .unwrap_or("")
}

/// Read a JSON file as an object; an empty file counts as `{}`
pub(crate) fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} is not a JSON object", path.display()),
    }
}
