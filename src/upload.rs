//! # Asset Upload
//!
//! Files reach storage through server-signed URLs: request one URL per
//! file, send each file straight to its URL, then report the batch as
//! complete. Batches run one after another; files inside a batch upload
//! concurrently.

use crate::config::{ASSETS_MANIFEST_NAME, MAX_UPLOAD_BATCH, RELEASE_CODE_PATH};
use crate::manifest::WidgetConfig;
use crate::package::ProjectFile;
use crate::project::WidgetRoot;
use crate::registry::{ApiError, FileType, Registry, UploadAuth, UploadIntent};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("server issued {issued} upload urls for {requested} files")]
    AuthCount { requested: usize, issued: usize },
    #[error("unsupported upload method: {0}")]
    Method(String),
    #[error("upload of {file} failed: {source}")]
    Transfer {
        file: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upload of {file} rejected with HTTP {status}")]
    Rejected {
        file: String,
        status: reqwest::StatusCode,
    },
    #[error("upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A local file and the name announced to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
}

impl UploadFile {
    /// Announce the file under its file name
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }
}

/// Upload `files`, returning one token per file in input order
pub async fn upload_files(
    registry: &Registry,
    package_id: &str,
    file_type: FileType,
    version: Option<&str>,
    files: &[UploadFile],
) -> Result<Vec<String>, UploadError> {
    upload_in_batches(registry, package_id, file_type, version, files, MAX_UPLOAD_BATCH).await
}

async fn upload_in_batches(
    registry: &Registry,
    package_id: &str,
    file_type: FileType,
    version: Option<&str>,
    files: &[UploadFile],
    batch_size: usize,
) -> Result<Vec<String>, UploadError> {
    let mut tokens = Vec::with_capacity(files.len());
    if files.is_empty() {
        return Ok(tokens);
    }

    let client = registry.upload_client()?;

    for (round, batch) in files.chunks(batch_size.max(1)).enumerate() {
        tracing::debug!(round, files = batch.len(), ?file_type, "requesting upload urls");

        let intent = UploadIntent {
            count: batch.len(),
            file_type,
            version: version.map(str::to_string),
            filenames: batch.iter().map(|file| file.name.clone()).collect(),
        };
        let auths = registry.upload_pre_signed_urls(package_id, &intent).await?;
        if auths.len() != batch.len() {
            return Err(UploadError::AuthCount {
                requested: batch.len(),
                issued: auths.len(),
            });
        }

        let mut uploads = JoinSet::new();
        for (file, auth) in batch.iter().zip(&auths) {
            let body = tokio::fs::read(&file.path)
                .await
                .map_err(|source| UploadError::Io {
                    path: file.path.clone(),
                    source,
                })?;
            uploads.spawn(put(client.clone(), auth.clone(), file.name.clone(), body));
        }

        while let Some(joined) = uploads.join_next().await {
            if let Err(err) = joined? {
                uploads.abort_all();
                return Err(err);
            }
        }

        let batch_tokens: Vec<String> = auths.into_iter().map(|auth| auth.token).collect();
        registry.upload_callback(&batch_tokens).await?;
        tokens.extend(batch_tokens);
    }

    Ok(tokens)
}

async fn put(
    client: reqwest::Client,
    auth: UploadAuth,
    file: String,
    body: Vec<u8>,
) -> Result<(), UploadError> {
    let method = reqwest::Method::from_bytes(auth.upload_request_method.to_ascii_uppercase().as_bytes())
        .map_err(|_| UploadError::Method(auth.upload_request_method.clone()))?;

    tracing::debug!(%file, %method, url = %auth.upload_url, bytes = body.len(), "uploading");
    let response = client
        .request(method, &auth.upload_url)
        .body(body)
        .send()
        .await
        .map_err(|source| UploadError::Transfer {
            file: file.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(UploadError::Rejected { file, status });
    }

    Ok(())
}

/// Tokens for the package config images; `None` where nothing was sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageAssetTokens {
    pub icon: Option<String>,
    pub cover: Option<String>,
    pub author_icon: Option<String>,
}

/// Upload icon, cover and author icon. Unset or missing files are skipped.
pub async fn upload_package_assets(
    registry: &Registry,
    root: &WidgetRoot,
    config: &WidgetConfig,
    package_id: &str,
    version: &str,
) -> Result<PackageAssetTokens, UploadError> {
    let slots = [&config.icon, &config.cover, &config.author_icon];
    let mut positions = [None; 3];
    let mut files = Vec::new();

    for (slot, relative) in slots.iter().enumerate() {
        if relative.is_empty() {
            continue;
        }
        let path = root.join(relative.as_str());
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "package asset not found, skipping");
            continue;
        }
        positions[slot] = Some(files.len());
        files.push(UploadFile::new(path));
    }

    let tokens = upload_files(registry, package_id, FileType::PackageConfig, Some(version), &files).await?;
    let token_for = |slot: usize| positions[slot].and_then(|index| tokens.get(index).cloned());

    Ok(PackageAssetTokens {
        icon: token_for(0),
        cover: token_for(1),
        author_icon: token_for(2),
    })
}

/// Upload the release bundle and, when present, the source archive
pub async fn upload_package_bundle(
    registry: &Registry,
    release_bundle: &Path,
    source_bundle: Option<&Path>,
    package_id: &str,
    version: &str,
) -> Result<(String, Option<String>), UploadError> {
    let mut files = vec![UploadFile::new(release_bundle.to_path_buf())];
    if let Some(source_bundle) = source_bundle {
        files.push(UploadFile::new(source_bundle.to_path_buf()));
    }

    let mut tokens = upload_files(registry, package_id, FileType::Package, Some(version), &files)
        .await?
        .into_iter();

    let release = tokens.next().ok_or(UploadError::AuthCount {
        requested: files.len(),
        issued: 0,
    })?;
    Ok((release, tokens.next()))
}

/// Upload images referenced by widget code and write the asset manifest.
///
/// `dist/release/assets.json` maps each relative path to its public URL.
/// Returns the public URL prefix, or `None` when the project has no images.
pub async fn upload_images(
    registry: &Registry,
    root: &WidgetRoot,
    files: &[ProjectFile],
    package_id: &str,
) -> Result<Option<String>, UploadError> {
    let images: Vec<&ProjectFile> = files.iter().filter(|file| file.is_image()).collect();
    let manifest_dir = root.join(RELEASE_CODE_PATH);
    let manifest_path = manifest_dir.join(ASSETS_MANIFEST_NAME);
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| UploadError::Io { path, source }
    };

    std::fs::create_dir_all(&manifest_dir).map_err(io_error(&manifest_dir))?;

    if images.is_empty() {
        std::fs::write(&manifest_path, "{}").map_err(io_error(&manifest_path))?;
        return Ok(None);
    }

    let endpoint = registry.upload_meta().await?.endpoint;
    let endpoint = endpoint.trim_end_matches('/').to_string();

    let uploads: Vec<UploadFile> = images
        .iter()
        .map(|file| UploadFile {
            path: file.path.clone(),
            name: file.relative.clone(),
        })
        .collect();
    let tokens = upload_files(registry, package_id, FileType::Asset, None, &uploads).await?;

    let mut manifest = Map::new();
    for (image, token) in images.iter().zip(&tokens) {
        manifest.insert(
            image.relative.clone(),
            Value::String(format!("{}/{}", endpoint, token)),
        );
    }

    let content = serde_json::to_string_pretty(&Value::Object(manifest)).map_err(|err| {
        UploadError::Io {
            path: manifest_path.clone(),
            source: err.into(),
        }
    })?;
    std::fs::write(&manifest_path, content).map_err(io_error(&manifest_path))?;
    tracing::info!(images = tokens.len(), manifest = %manifest_path.display(), "uploaded images");

    Ok(Some(endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubServer;
    use serde_json::json;
    use tempfile::TempDir;

    const PRE_SIGNED: &str = "/asset/widgets/wpkDeveloper/uploadPreSignedUrl";
    const CALLBACK: &str = "/asset/upload/callback";

    fn files(dir: &Path, count: usize) -> Vec<UploadFile> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("file{}.js", i));
                std::fs::write(&path, format!("content {}", i)).unwrap();
                UploadFile::new(path)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batches_are_capped_and_tokens_positional() {
        let server = StubServer::start().await;
        let registry = Registry::new(&server.host(), "token").unwrap();
        let dir = TempDir::new().unwrap();
        let files = files(dir.path(), 5);

        let tokens = upload_in_batches(&registry, "wpkDeveloper", FileType::Package, Some("1.0.1"), &files, 2)
            .await
            .unwrap();

        assert_eq!(tokens.len(), 5);
        assert_eq!(server.count("POST", PRE_SIGNED), 3);
        assert_eq!(server.count("POST", CALLBACK), 3);

        let notified: usize = server
            .bodies(CALLBACK)
            .iter()
            .map(|body| body["resourceKeys"].as_array().unwrap().len())
            .sum();
        assert_eq!(notified, 5);

        for (i, token) in tokens.iter().enumerate() {
            assert_eq!(
                server.uploaded(token).unwrap(),
                format!("content {}", i).into_bytes()
            );
        }

        let first = &server.bodies(PRE_SIGNED)[0];
        assert_eq!(first["count"], 2);
        assert_eq!(first["fileType"], 1);
        assert_eq!(first["version"], "1.0.1");
        assert_eq!(first["filenames"], json!(["file0.js", "file1.js"]));
    }

    #[tokio::test]
    async fn test_failed_upload_skips_callback() {
        let server = StubServer::start().await;
        server.fail_uploads();
        let registry = Registry::new(&server.host(), "token").unwrap();
        let dir = TempDir::new().unwrap();

        let err = upload_files(&registry, "wpkDeveloper", FileType::Package, None, &files(dir.path(), 3))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Rejected { .. }));
        assert_eq!(server.count("POST", CALLBACK), 0);
    }

    #[tokio::test]
    async fn test_empty_upload_makes_no_requests() {
        let server = StubServer::start().await;
        let registry = Registry::new(&server.host(), "token").unwrap();

        let tokens = upload_files(&registry, "wpkDeveloper", FileType::Asset, None, &[])
            .await
            .unwrap();
        assert!(tokens.is_empty());
        assert!(server.hits().is_empty());
    }

    #[tokio::test]
    async fn test_package_assets_skip_missing_files() {
        let server = StubServer::start().await;
        let registry = Registry::new(&server.host(), "token").unwrap();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("icon.png"), b"icon").unwrap();

        let config = WidgetConfig {
            icon: "./icon.png".into(),
            cover: "cover.png".into(),
            ..WidgetConfig::default()
        };
        let tokens = upload_package_assets(
            &registry,
            &WidgetRoot::at(dir.path()),
            &config,
            "wpkDeveloper",
            "1.0.1",
        )
        .await
        .unwrap();

        assert!(tokens.icon.is_some());
        assert_eq!(tokens.cover, None);
        assert_eq!(tokens.author_icon, None);
        assert_eq!(server.bodies(PRE_SIGNED)[0]["fileType"], 2);
        assert_eq!(server.bodies(PRE_SIGNED)[0]["count"], 1);
    }

    #[tokio::test]
    async fn test_images_write_asset_manifest() {
        let server = StubServer::start().await;
        let registry = Registry::new(&server.host(), "token").unwrap();
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/logo.png"), b"png").unwrap();

        let files = vec![ProjectFile {
            relative: "static/logo.png".into(),
            path: dir.path().join("static/logo.png"),
            size: 3,
        }];
        let endpoint = upload_images(&registry, &WidgetRoot::at(dir.path()), &files, "wpkDeveloper")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint, format!("{}/assets", server.host()));

        let manifest: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("dist/release/assets.json")).unwrap(),
        )
        .unwrap();
        let url = manifest["static/logo.png"].as_str().unwrap();
        assert!(url.starts_with(&endpoint));
        assert_eq!(server.bodies(PRE_SIGNED)[0]["fileType"], 0);
    }

    #[tokio::test]
    async fn test_no_images_skips_upload() {
        let server = StubServer::start().await;
        let registry = Registry::new(&server.host(), "token").unwrap();
        let dir = TempDir::new().unwrap();

        let endpoint = upload_images(&registry, &WidgetRoot::at(dir.path()), &[], "wpkDeveloper")
            .await
            .unwrap();
        assert_eq!(endpoint, None);
        assert!(server.hits().is_empty());
        assert!(dir.path().join("dist/release/assets.json").is_file());
    }
}
