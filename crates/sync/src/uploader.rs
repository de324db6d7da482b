//! Photo upload with local validation.

use crate::error::{Result, SyncError};
use crate::model::ReportId;
use crate::ports::{guarded, ObjectStorage};
use fixmyarea_core::config::UploadConfig;
use fixmyarea_telemetry::{metrics, names};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Detect a supported image type from its leading bytes
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..]
            if brand.len() >= 4
                && matches!(&brand[..4], b"heic" | b"heix" | b"hevc" | b"mif1" | b"msf1") =>
        {
            Some("image/heic")
        }
        _ => None,
    }
}

/// Uploads report photos under a key derived from the report id
pub struct AssetUploader {
    storage: Arc<dyn ObjectStorage>,
    folder: String,
    max_bytes: u64,
    timeout: Duration,
}

impl AssetUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &UploadConfig, timeout: Duration) -> Self {
        Self {
            storage,
            folder: config.folder.trim_matches('/').to_string(),
            max_bytes: config.max_asset_bytes,
            timeout,
        }
    }

    /// Remote object key for a report's photo
    pub fn object_key(&self, report_id: ReportId) -> String {
        format!("{}/{report_id}", self.folder)
    }

    /// Upload `local_file` for `report_id` and return its remote URL.
    ///
    /// Repeating the call for the same report targets the same object key.
    #[instrument(skip(self, cancel), fields(report_id = %report_id))]
    pub async fn upload(
        &self,
        local_file: &Path,
        report_id: ReportId,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let meta = tokio::fs::metadata(local_file).await.map_err(|e| {
            SyncError::Permanent(format!("photo {} unreadable: {e}", local_file.display()))
        })?;
        if !meta.is_file() {
            return Err(SyncError::Permanent(format!(
                "photo {} is not a file",
                local_file.display()
            )));
        }
        if meta.len() == 0 {
            return Err(SyncError::Permanent("photo is empty".to_string()));
        }
        if meta.len() > self.max_bytes {
            return Err(SyncError::Permanent(format!(
                "photo is {} bytes, limit is {}",
                meta.len(),
                self.max_bytes
            )));
        }

        let bytes = tokio::fs::read(local_file).await.map_err(|e| {
            SyncError::Permanent(format!("photo {} unreadable: {e}", local_file.display()))
        })?;
        let mime = sniff_mime(&bytes)
            .ok_or_else(|| SyncError::Permanent("unsupported image format".to_string()))?;

        let key = self.object_key(report_id);
        debug!(key, mime, size = bytes.len(), "Uploading photo");

        let url = guarded(
            "upload",
            self.timeout,
            cancel,
            self.storage.upload(bytes, &key, mime),
        )
        .await?;

        metrics().increment(names::ASSETS_UPLOADED);
        Ok(url)
    }
}
