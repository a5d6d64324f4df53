use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::FileFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Success,
    Error,
}

/// Append-only audit record for one upload attempt: exactly what was imported
/// and when. Created when the upload starts, updated once at completion,
/// never merged or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: u64,
    /// Set on success; stays `None` for failed imports.
    pub layer_id: Option<u64>,
    pub original_filename: String,
    pub file_size_bytes: u64,
    pub file_format: FileFormat,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub feature_count: Option<usize>,
    pub processing_seconds: Option<f64>,
    /// File-level snapshot: crs, bounds, geometry type names.
    pub file_metadata: Option<Value>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn started(id: u64, filename: &str, size: u64, format: FileFormat) -> Self {
        Self {
            id,
            layer_id: None,
            original_filename: filename.to_string(),
            file_size_bytes: size,
            file_format: format,
            status: UploadStatus::Processing,
            error_message: None,
            feature_count: None,
            processing_seconds: None,
            file_metadata: None,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }
}
