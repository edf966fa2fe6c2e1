//! Per-item payloads handed to the remote gateway.

use crate::error::DispatchError;
use base64::Engine as _;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Encoded image plus the metadata the gateway needs to process it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPayload {
    pub filename: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ItemPayload {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Build a payload, guessing the MIME type from the file extension.
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let mime_type = guess_image_mime(Path::new(&filename)).to_string();
        Self::new(filename, mime_type, data)
    }

    /// `data:<mime>;base64,<payload>` form expected by the batch endpoint.
    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Where an item's bytes come from.
///
/// File sources are read when the batch is built, not at enqueue time, so a
/// file removed in between surfaces as [`DispatchError::DataUnavailable`].
#[derive(Debug, Clone)]
pub enum PayloadSource {
    Inline(ItemPayload),
    File(PathBuf),
}

impl PayloadSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        PayloadSource::File(path.into())
    }

    /// Human-readable label used in logs.
    pub fn label(&self) -> String {
        match self {
            PayloadSource::Inline(p) => p.filename.clone(),
            PayloadSource::File(path) => path.display().to_string(),
        }
    }

    pub async fn load(&self) -> Result<ItemPayload, DispatchError> {
        match self {
            PayloadSource::Inline(payload) => Ok(payload.clone()),
            PayloadSource::File(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    DispatchError::DataUnavailable(format!("{}: {}", path.display(), e))
                })?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Ok(ItemPayload::new(filename, guess_image_mime(path), data))
            }
        }
    }
}

impl From<ItemPayload> for PayloadSource {
    fn from(payload: ItemPayload) -> Self {
        PayloadSource::Inline(payload)
    }
}

/// Image MIME type by extension; anything unrecognized is sent as JPEG.
pub fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}
