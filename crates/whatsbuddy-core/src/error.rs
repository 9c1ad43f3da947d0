//! Error types for WhatsBuddy Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for WhatsBuddy operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("No URI provided: {0}")]
    NoUri(String),

    #[error("Enumeration failed: {0}")]
    Enumeration(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Save failed: {0}")]
    Save(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Permission brokering errors
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Access denied: {0}")]
    Denied(String),

    #[error("A grant request is already pending")]
    RequestPending,

    #[error("Picker could not be launched: {0}")]
    PickerFailed(String),

    #[error("Failed to persist permission: {0}")]
    PersistFailed(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// Errors reported by a content resolver at the OS boundary
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed addressable identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("empty URI")]
    Empty,

    #[error("not a content URI: {0}")]
    NotContent(String),

    #[error("expected a tree URI: {0}")]
    NotTree(String),

    #[error("expected a document URI: {0}")]
    NotDocument(String),

    #[error("bad percent-encoding in: {0}")]
    BadEncoding(String),
}

/// Wire-level error tag returned across the call boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AccessDenied,
    RequestPending,
    NoUri,
    EnumerationError,
    ReadError,
    SaveError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::RequestPending => "REQUEST_PENDING",
            Self::NoUri => "NO_URI",
            Self::EnumerationError => "ENUMERATION_ERROR",
            Self::ReadError => "READ_ERROR",
            Self::SaveError => "SAVE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Error {
    /// Tag used when this error crosses the call boundary
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Access(AccessError::RequestPending) => ErrorCode::RequestPending,
            Error::Access(_) => ErrorCode::AccessDenied,
            Error::NoUri(_) => ErrorCode::NoUri,
            Error::Enumeration(_) => ErrorCode::EnumerationError,
            Error::Read(_) => ErrorCode::ReadError,
            Error::Save(_) => ErrorCode::SaveError,
            Error::Storage(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

impl From<UriError> for Error {
    fn from(err: UriError) -> Self {
        Error::NoUri(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(StorageError::Pool(err.to_string()))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for content resolver calls
pub type ResolverResult<T> = std::result::Result<T, ResolverError>;
