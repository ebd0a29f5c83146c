use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::domain::Attachment;
use super::storage::{AttachmentStore, InsertError, RecordStore, RegistrationRecord, UploadError};
use crate::config::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum RestClientError {
    #[error("storage base url must start with http:// or https:// (got `{0}`)")]
    InvalidBaseUrl(String),
    #[error("storage base url is not configured")]
    MissingBaseUrl,
    #[error("unable to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Hosted backend exposing object storage under `/storage/v1` and tables
/// under `/rest/v1`, authenticated with a single API key.
#[derive(Clone)]
pub struct RestBackend {
    http: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    table: String,
}

impl RestBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, RestClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RestClientError::InvalidBaseUrl(base_url));
        }

        Ok(Self {
            http: Client::builder().build()?,
            base_url,
            api_key: api_key.into(),
            bucket: bucket.into(),
            table: table.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, RestClientError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or(RestClientError::MissingBaseUrl)?;
        Self::new(base_url, &config.api_key, &config.bucket, &config.table)
    }

    pub fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AttachmentStore for RestBackend {
    async fn upload(&self, attachment: &Attachment, path: &str) -> Result<String, UploadError> {
        let response = self
            .authorized(self.http.post(self.object_url(path)))
            .header(CONTENT_TYPE, attachment.content_type.as_str())
            .header("x-upsert", "false")
            .body(attachment.bytes.clone())
            .send()
            .await
            .map_err(|err| UploadError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%path, "attachment stored");
        Ok(self.public_url(path))
    }
}

#[async_trait]
impl RecordStore for RestBackend {
    async fn insert(&self, record: &RegistrationRecord) -> Result<(), InsertError> {
        let response = self
            .authorized(self.http.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(&[record])
            .send()
            .await
            .map_err(|err| InsertError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(InsertError::Schema(message))
            }
            _ => Err(InsertError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }
}
