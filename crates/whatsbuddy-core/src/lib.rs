//! WhatsBuddy Core Library
//!
//! This crate provides the status media pipeline for WhatsBuddy, including:
//! - User-mediated access to the status folder tree
//! - Enumeration of eligible image and video files
//! - Whole-document reads
//! - Copying media into a caller-owned output collection
//! - SQLite-based persistence of the grant and settings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     whatsbuddy-core                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  channel/      - Named-method call surface                  │
//! │  access/       - Access broker, directory picker host       │
//! │  pipeline/     - Enumerator, content reader, save pipeline  │
//! │  media/        - Eligibility filter, output naming          │
//! │  resolver/     - Content resolver trait, local resolver     │
//! │  storage/      - SQLite database, queries                   │
//! │  types/        - Shared type definitions                    │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod channel;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod resolver;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorCode, Result};
pub use types::*;

// Re-export access components
pub use access::{
    AccessBroker, PickerHost, PickerOutcome, PickerRequest, PickerResponder, StaticPicker,
};

// Re-export the call surface
pub use channel::{Base64Bytes, MethodCall, MethodResult, ReplyValue, StatusChannel};

// Re-export pipeline components
pub use media::{is_eligible, NamingGenerator};
pub use pipeline::{ContentReader, MediaEnumerator, SavePipeline};
pub use resolver::{ContentResolver, LocalResolver};

// Re-export storage
pub use storage::Storage;
