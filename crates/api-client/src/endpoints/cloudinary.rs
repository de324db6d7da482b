//! Photo hosting on Cloudinary

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use fixmyarea_sync::{ObjectStorage, RemoteError};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Cloudinary unsigned upload
///
/// The object key becomes `folder/public_id`, so re-uploading the same
/// report's photo lands on the same asset.
#[derive(Clone)]
pub struct CloudinaryStorage {
    client: ApiClient,
    upload_url: String,
    upload_preset: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryStorage {
    pub(crate) fn new(client: ApiClient) -> ApiResult<Self> {
        let config = client.config();
        let (cloud_name, preset) = config.cloudinary_credentials()?;
        let upload_url = format!(
            "{}/{cloud_name}/image/upload",
            config.cloudinary_url.trim_end_matches('/')
        );
        let upload_preset = preset.to_string();
        Ok(Self {
            client,
            upload_url,
            upload_preset,
        })
    }

    /// Endpoint uploads are posted to
    #[must_use]
    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Upload `bytes` under `key`, returning the HTTPS delivery URL
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_bytes(&self, bytes: Vec<u8>, key: &str, mime: &str) -> ApiResult<String> {
        let (folder, public_id) = split_key(key);

        let part = Part::bytes(bytes)
            .file_name(public_id.to_string())
            .mime_str(mime)?;
        let mut form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", public_id.to_string());
        if let Some(folder) = folder {
            form = form.text("folder", folder.to_string());
        }

        let request = self
            .client
            .request(Method::POST, &self.upload_url)
            .multipart(form);
        let response = ApiClient::check_status(self.client.send(request).await?).await?;
        let body: UploadResponse = response.json().await?;

        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| ApiError::UnexpectedResponse("upload response has no URL".into()))?;
        debug!(url = %url, "Photo hosted");
        Ok(url)
    }
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(&self, bytes: Vec<u8>, key: &str, mime: &str) -> Result<String, RemoteError> {
        self.upload_bytes(bytes, key, mime)
            .await
            .map_err(RemoteError::from)
    }
}

/// Split an object key on its last `/` into folder and public id
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once('/') {
        Some((folder, id)) if !folder.is_empty() => (Some(folder), id),
        Some((_, id)) => (None, id),
        None => (None, key),
    }
}
