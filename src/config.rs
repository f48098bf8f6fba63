//! # CLI Constants
//!
//! File names, output locations and defaults shared across commands.

/// Widget project config file; its directory is the project root
pub const WIDGET_CONFIG_FILE: &str = "widget.config.json";

/// Private credentials file (host and API token)
pub const PRIVATE_CONFIG_FILE: &str = ".widget.yaml";

/// Node package manifest kept in sync with the widget version
pub const PACKAGE_JSON_FILE: &str = "package.json";

/// Ignore file honoured when packing source code
pub const IGNORE_FILE: &str = ".gitignore";

/// Directory the bundler writes compiled code to
pub const RELEASE_CODE_PATH: &str = "dist/release";

/// Development bundle file name
pub const RELEASE_CODE_NAME: &str = "widget_bundle.js";

/// Production bundle file name
pub const RELEASE_CODE_PROD_NAME: &str = "widget_bundle.prod.js";

/// Image token map consumed by the bundler
pub const ASSETS_MANIFEST_NAME: &str = "assets.json";

/// Package id baked into bundles before the widget is registered remotely
pub const PLACEHOLDER_PACKAGE_ID: &str = "wpkDeveloper";

/// Host offered when none is configured
pub const DEFAULT_HOST: &str = "https://apitable.com";

/// Default bundler invocation
pub const DEFAULT_BUNDLER: &str = "npx webpack";

/// Default dev server port
pub const DEFAULT_PORT: u16 = 9000;

/// Maximum number of files per signed-URL request
pub const MAX_UPLOAD_BATCH: usize = 20;

/// Length of the secret used to encrypt shared source archives
pub const SECRET_KEY_LENGTH: usize = 64;
