//! Core type definitions for WhatsBuddy
//!
//! This module contains the shared types used across the pipeline:
//! typed content URIs, grants, media entries and application settings.

mod media_types;
mod uri_types;

pub use media_types::*;
pub use uri_types::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission requested from the picker and held on a tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn allows_write(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Union of two modes
    pub fn merge(self, other: AccessMode) -> AccessMode {
        if self.allows_write() || other.allows_write() {
            Self::ReadWrite
        } else {
            Self::Read
        }
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        Self::Read
    }
}

/// The one persisted permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub tree: TreeUri,
    pub read_granted: bool,
    pub write_granted: bool,
    pub granted_at: chrono::DateTime<chrono::Utc>,
}

impl PermissionGrant {
    pub fn new(tree: TreeUri, mode: AccessMode) -> Self {
        Self {
            tree,
            read_granted: true,
            write_granted: mode.allows_write(),
            granted_at: chrono::Utc::now(),
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        if self.write_granted {
            AccessMode::ReadWrite
        } else {
            AccessMode::Read
        }
    }
}

/// Correlates one picker response with the request that launched it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken(pub String);

impl RequestToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collection that saved copies go to unless configured otherwise
pub const DEFAULT_OUTPUT_RELATIVE_PATH: &str = "Download/WhatsBuddy";

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Collection folder that saved copies are inserted into
    pub output_relative_path: String,
    pub name_prefix: String,
    /// Disambiguation attempts before a save gives up
    pub max_name_attempts: u32,
    pub access_mode: AccessMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_relative_path: DEFAULT_OUTPUT_RELATIVE_PATH.to_string(),
            name_prefix: "whatsapp_status_".to_string(),
            max_name_attempts: 100,
            access_mode: AccessMode::Read,
        }
    }
}
