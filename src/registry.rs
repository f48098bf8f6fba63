//! # Widget API Client
//!
//! Typed client for the widget marketplace REST API (`{host}/api/v1`).
//! Every response is wrapped in a `{code, message, success, data}` envelope;
//! `success: false` becomes [`ApiError::Remote`].

use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the widget API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with `success: false`
    #[error("{message} (code: {code})")]
    Remote { message: String, code: i64 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Response envelope shared by every endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

/// Package type dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum PackageType {
    ThirdParty,
    Official,
}

impl From<PackageType> for u8 {
    fn from(value: PackageType) -> Self {
        match value {
            PackageType::ThirdParty => 0,
            PackageType::Official => 1,
        }
    }
}

/// Release scope dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum ReleaseType {
    Space,
    Global,
}

impl From<ReleaseType> for u8 {
    fn from(value: ReleaseType) -> Self {
        match value {
            ReleaseType::Space => 0,
            ReleaseType::Global => 1,
        }
    }
}

/// Upload domain; the server applies different storage rules per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum FileType {
    /// Images referenced from widget code
    Asset,
    /// Compiled bundle and source archive
    Package,
    /// Icon, cover and author icon
    PackageConfig,
}

impl From<FileType> for u8 {
    fn from(value: FileType) -> Self {
        match value {
            FileType::Asset => 0,
            FileType::Package => 1,
            FileType::PackageConfig => 2,
        }
    }
}

/// Remote package record, kept as the server sent it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct WidgetPackage(pub Map<String, Value>);

impl WidgetPackage {
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn name(&self) -> String {
        match self.0.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Object(localized)) => localized
                .get("zh-CN")
                .or_else(|| localized.get("en-US"))
                .or_else(|| localized.values().next())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }

    pub fn package_type(&self) -> PackageType {
        match self.0.get("packageType").and_then(Value::as_u64) {
            Some(1) => PackageType::Official,
            _ => PackageType::ThirdParty,
        }
    }
}

/// One row of the release history
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseHistoryEntry {
    #[serde(default)]
    pub release_sha: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release_code_bundle: Option<String>,
    #[serde(default)]
    pub source_code_bundle: Option<String>,
    #[serde(default)]
    pub status: Option<Value>,
}

/// Payload for `POST /widget/package/create`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackage {
    pub space_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    pub package_type: PackageType,
    pub release_type: ReleaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    /// Localized name, JSON-encoded as a string
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPackage {
    pub package_id: String,
}

/// Upload host information
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadMeta {
    #[serde(default)]
    pub endpoint: String,
}

/// Request for a batch of signed upload URLs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadIntent {
    pub count: usize,
    pub file_type: FileType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub filenames: Vec<String>,
}

/// Server-issued credential for one direct upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAuth {
    pub token: String,
    pub upload_url: String,
    pub upload_request_method: String,
}

/// Final payload of a release or submit call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    pub package_id: String,
    pub version: String,
    pub name: Value,
    pub description: Value,
    pub icon: Option<String>,
    pub cover: Option<String>,
    pub author_name: Option<String>,
    pub author_icon: Option<String>,
    pub author_link: Option<String>,
    pub author_email: Option<String>,
    pub release_code_bundle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code_bundle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_env: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_env: Option<Vec<String>>,
}

/// Widget API client
#[derive(Clone)]
pub struct Registry {
    host: String,
    client: reqwest::Client,
}

impl Registry {
    /// Create a client for `host` authenticated with `token`
    pub fn new(host: &str, token: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Internal-Request", HeaderValue::from_static("yes"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| anyhow::anyhow!("API token contains invalid characters"))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .user_agent(format!("widget-cli/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to create HTTP client: {}", err))?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.host, path)
    }

    /// Client without the API credentials, for signed upload URLs
    pub fn upload_client(&self) -> Result<reqwest::Client, ApiError> {
        reqwest::Client::builder()
            .user_agent(format!("widget-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|source| ApiError::Transport {
                url: self.host.clone(),
                source,
            })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: String,
    ) -> Result<Envelope<T>, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;
        tracing::debug!(%url, %status, body = %body, "widget api response");

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Status { url, status, body });
            }
            Err(source) => return Err(ApiError::Decode { url, source }),
        };

        if !envelope.success {
            return Err(ApiError::Remote {
                message: envelope.message,
                code: envelope.code,
            });
        }

        Ok(envelope)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        self.send(self.client.get(&url), url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        self.send(self.client.post(&url).json(body), url).await
    }

    /// Verify the token, optionally against a package
    pub async fn auth(&self, package_id: Option<&str>) -> Result<(), ApiError> {
        self.post::<Value, _>("/widget/package/auth", &json!({ "packageId": package_id }))
            .await?;
        Ok(())
    }

    /// Fetch a package; `None` when the server has no such package
    pub async fn get_package(&self, package_id: &str) -> Result<Option<WidgetPackage>, ApiError> {
        let envelope = self
            .get::<WidgetPackage>(&format!("/widget/package/{}", package_id))
            .await?;
        Ok(envelope.data.filter(|package| !package.0.is_empty()))
    }

    pub async fn create_package(&self, request: &CreatePackage) -> Result<CreatedPackage, ApiError> {
        let envelope = self
            .post::<CreatedPackage, _>("/widget/package/create", request)
            .await?;

        envelope.data.ok_or_else(|| ApiError::Remote {
            message: "server did not return a packageId".to_string(),
            code: envelope.code,
        })
    }

    /// Ban or unban a package, returning the server message
    pub async fn ban(&self, package_id: &str, unban: bool) -> Result<String, ApiError> {
        let envelope = self
            .post::<Value, _>(
                "/widget/package/ban",
                &json!({ "packageId": package_id, "unban": unban }),
            )
            .await?;
        Ok(envelope.message)
    }

    pub async fn unpublish(&self, package_id: &str) -> Result<String, ApiError> {
        let envelope = self
            .post::<Value, _>("/widget/package/unpublish", &json!({ "packageId": package_id }))
            .await?;
        Ok(envelope.message)
    }

    pub async fn rollback(&self, package_id: &str, version: &str) -> Result<String, ApiError> {
        let envelope = self
            .post::<Value, _>(
                "/widget/package/rollback",
                &json!({ "packageId": package_id, "version": version }),
            )
            .await?;
        Ok(envelope.message)
    }

    pub async fn release_history(
        &self,
        package_id: &str,
    ) -> Result<Vec<ReleaseHistoryEntry>, ApiError> {
        let envelope = self
            .get::<Vec<ReleaseHistoryEntry>>(&format!("/widget/package/release/history/{}", package_id))
            .await?;
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn upload_meta(&self) -> Result<UploadMeta, ApiError> {
        let envelope = self.get::<UploadMeta>("/asset/upload/meta").await?;
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn upload_pre_signed_urls(
        &self,
        package_id: &str,
        intent: &UploadIntent,
    ) -> Result<Vec<UploadAuth>, ApiError> {
        let envelope = self
            .post::<Vec<UploadAuth>, _>(
                &format!("/asset/widgets/{}/uploadPreSignedUrl", package_id),
                intent,
            )
            .await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// Tell the server a batch of uploads is complete
    pub async fn upload_callback(&self, resource_keys: &[String]) -> Result<(), ApiError> {
        self.post::<Value, _>(
            "/asset/upload/callback",
            &json!({ "resourceKeys": resource_keys }),
        )
        .await?;
        Ok(())
    }

    pub async fn release(&self, manifest: &PackageManifest) -> Result<(), ApiError> {
        self.post::<Value, _>("/widget/package/v2/release", manifest)
            .await?;
        Ok(())
    }

    pub async fn submit(&self, manifest: &PackageManifest) -> Result<(), ApiError> {
        self.post::<Value, _>("/widget/package/v2/submit", manifest)
            .await?;
        Ok(())
    }
}
