//! # Widget Project
//!
//! Project root discovery, private credentials and `package.json` syncing.

use crate::config::{PACKAGE_JSON_FILE, PRIVATE_CONFIG_FILE, WIDGET_CONFIG_FILE};
use crate::manifest::{read_object, WidgetConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Root directory of a widget project (the directory holding widget.config.json)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRoot(PathBuf);

impl WidgetRoot {
    /// Walk upward from `start` until a widget config is found
    pub fn discover<P: AsRef<Path>>(start: P) -> Result<Self> {
        let start = start.as_ref();

        for dir in start.ancestors() {
            if dir.join(WIDGET_CONFIG_FILE).is_file() {
                tracing::debug!(root = %dir.display(), "found widget project root");
                return Ok(Self(dir.to_path_buf()));
            }
        }

        anyhow::bail!(
            "Not a widget project: can not find {} in {} or any parent directory",
            WIDGET_CONFIG_FILE,
            start.display()
        )
    }

    /// Use `path` as the root without searching
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolve a project-relative path such as `./icon.png`
    pub fn join<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        let relative = relative.as_ref();
        let relative = relative.strip_prefix("./").unwrap_or(relative);
        self.0.join(relative)
    }

    pub fn widget_config(&self) -> Result<WidgetConfig> {
        WidgetConfig::load(&self.0)
    }

    pub fn update_widget_config(&self, patch: Value) -> Result<WidgetConfig> {
        WidgetConfig::merge(&self.0, patch)
    }

    /// Version the project was last released at.
    ///
    /// package.json is authoritative; the widget config's `version` is
    /// used when package.json is absent or has none.
    pub fn current_version(&self) -> Result<String> {
        let path = self.0.join(PACKAGE_JSON_FILE);
        if path.exists() {
            let json = read_object(&path)?;
            if let Some(version) = json
                .get("version")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|version| !version.is_empty())
            {
                return Ok(version.to_string());
            }
        }

        Ok(self.widget_config()?.version.trim().to_string())
    }

    /// Set `version` in package.json when the project has one
    pub fn sync_package_json_version(&self, version: &str) -> Result<()> {
        let path = self.0.join(PACKAGE_JSON_FILE);
        if !path.exists() {
            return Ok(());
        }

        let mut json = read_object(&path)?;
        json.insert("version".to_string(), Value::String(version.to_string()));

        let content = serde_json::to_string_pretty(&Value::Object(json))
            .context("Failed to serialize package.json")?;
        std::fs::write(&path, content).context("Failed to write package.json")?;

        Ok(())
    }
}

/// Credentials stored next to the widget config (.widget.yaml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl PrivateConfig {
    /// Load credentials; a missing or unreadable file yields an empty config
    pub fn load(root: &Path) -> Self {
        let path = root.join(PRIVATE_CONFIG_FILE);

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };

        match serde_yaml::from_str::<Option<Self>>(&content) {
            Ok(config) => config.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed private config");
                Self::default()
            }
        }
    }

    /// Store host and token, keeping nothing else from the previous file
    pub fn update(root: &Path, host: &str, token: &str) -> Result<Self> {
        let mut config = Self::load(root);
        config.host = Some(host.to_string());
        config.token = Some(token.to_string());

        let content = serde_yaml::to_string(&config).context("Failed to serialize private config")?;
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create {}", root.display()))?;
        std::fs::write(root.join(PRIVATE_CONFIG_FILE), content)
            .context("Failed to write private config")?;

        Ok(config)
    }
}
