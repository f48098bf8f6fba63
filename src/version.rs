//! Release version validation.

use semver::Version;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version: {0}")]
    Invalid(String),
    #[error("version: {version} is less than current version {current}")]
    Older { version: String, current: String },
    #[error("package version can not found")]
    MissingCurrent,
}

/// Check that `version` is valid semver and not older than `current`.
///
/// An empty or unparsable `current` only enforces syntax.
pub fn check_version(version: &str, current: &str) -> Result<Version, VersionError> {
    let parsed = Version::parse(version.trim())
        .map_err(|_| VersionError::Invalid(version.to_string()))?;

    if let Ok(current_parsed) = Version::parse(current.trim()) {
        if parsed < current_parsed {
            return Err(VersionError::Older {
                version: version.to_string(),
                current: current.to_string(),
            });
        }
    }

    Ok(parsed)
}

/// Bump the patch component of `current`
pub fn increase_version(current: &str) -> Result<String, VersionError> {
    if current.trim().is_empty() {
        return Err(VersionError::MissingCurrent);
    }

    let current = Version::parse(current.trim())
        .map_err(|_| VersionError::Invalid(current.to_string()))?;

    // a pre-release bumps to its own release, matching npm semantics
    let patch = if current.pre.is_empty() {
        current.patch + 1
    } else {
        current.patch
    };

    Ok(Version::new(current.major, current.minor, patch).to_string())
}
