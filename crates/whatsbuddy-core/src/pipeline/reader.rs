//! Whole-document reads

use crate::error::{Error, Result};
use crate::resolver::ContentResolver;
use crate::types::DocumentUri;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Reads a document fully into memory
pub struct ContentReader {
    resolver: Arc<dyn ContentResolver>,
}

impl ContentReader {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self { resolver }
    }

    /// All bytes of `uri`; empty when the resolver has no stream for it
    pub async fn read_bytes(&self, uri: &DocumentUri) -> Result<Vec<u8>> {
        let stream = self
            .resolver
            .open_input(uri)
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        let Some(mut stream) = stream else {
            debug!("No stream for {}, returning empty content", uri);
            return Ok(Vec::new());
        };

        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| Error::Read(e.to_string()))?;

        debug!("Read {} bytes from {}", bytes.len(), uri);
        Ok(bytes)
    }
}
