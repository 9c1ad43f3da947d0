//! Media entry, save request and output types

use super::uri_types::DocumentUri;
use serde::{Deserialize, Serialize};

/// An eligible media file found in a granted tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub uri: DocumentUri,
    pub display_name: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
}

/// Request to copy one document into the output collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub source: DocumentUri,
    pub mime_type: String,
    pub original_name: String,
}

impl SaveRequest {
    pub fn new(
        source: DocumentUri,
        mime_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            mime_type: mime_type.into(),
            original_name: original_name.into(),
        }
    }
}

/// Result of a completed save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    pub destination: DocumentUri,
    pub generated_name: String,
    pub bytes_written: u64,
    pub sha256: String,
}

/// One row of a child-documents query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDocument {
    pub document_id: String,
    pub display_name: String,
    pub size: i64,
    pub mime_type: Option<String>,
}

/// Values for a new entry in a caller-owned collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub display_name: String,
    pub mime_type: String,
    pub relative_path: String,
}
