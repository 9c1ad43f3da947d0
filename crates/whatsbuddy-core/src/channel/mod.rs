//! Status channel: the named-method call surface
//!
//! Callers send a [`MethodCall`] (method name plus JSON arguments) and always
//! receive a [`MethodResult`]; no error escapes this boundary.

use crate::access::AccessBroker;
use crate::error::{Error, ErrorCode, Result};
use crate::pipeline::{ContentReader, MediaEnumerator, SavePipeline};
use crate::resolver::ContentResolver;
use crate::types::{
    AccessMode, AppSettings, DocumentUri, MediaEntry, OutputDescriptor, PermissionGrant,
    SaveRequest, TreeUri,
};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const REQUEST_ACCESS: &str = "requestStatusFolderAccess";
pub const GET_STATUS_FILES: &str = "getStatusFiles";
pub const GET_FILE_BYTES: &str = "getFileBytes";
pub const SAVE_FILE: &str = "saveFile";
pub const GET_CURRENT_GRANT: &str = "getCurrentGrant";

const DEFAULT_SAVE_MIME_TYPE: &str = "*/*";
const DEFAULT_SAVE_FILE_NAME: &str = "file";

/// An incoming named-method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_argument(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.arguments.is_object() {
            self.arguments = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.arguments {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Typed argument; `None` when absent, null or of the wrong type
    pub fn argument<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.arguments
            .get(key)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Raw bytes, base64-encoded on the JSON wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

/// Success payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyValue {
    Flag(bool),
    Uri(String),
    Uris(Vec<String>),
    Bytes(Base64Bytes),
    Null,
}

/// Reply to a [`MethodCall`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success { value: ReplyValue },
    Error { code: ErrorCode, message: String },
    NotImplemented,
}

impl MethodResult {
    pub fn success(value: ReplyValue) -> Self {
        Self::Success { value }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Routes method calls to the broker and pipeline components
pub struct StatusChannel {
    broker: Arc<AccessBroker>,
    enumerator: MediaEnumerator,
    reader: ContentReader,
    saver: SavePipeline,
}

impl StatusChannel {
    pub fn new(
        broker: Arc<AccessBroker>,
        resolver: Arc<dyn ContentResolver>,
        settings: &AppSettings,
    ) -> Self {
        Self {
            broker,
            enumerator: MediaEnumerator::new(Arc::clone(&resolver)),
            reader: ContentReader::new(Arc::clone(&resolver)),
            saver: SavePipeline::from_settings(resolver, settings),
        }
    }

    pub fn broker(&self) -> &AccessBroker {
        &self.broker
    }

    /// Handle one call, converting every failure into an error reply
    pub async fn handle(&self, call: &MethodCall) -> MethodResult {
        debug!("Handling method call: {}", call.method);

        let result = match call.method.as_str() {
            REQUEST_ACCESS => self
                .request_access()
                .await
                .map(|tree| ReplyValue::Uri(tree.to_string())),
            GET_STATUS_FILES => match required_uri(call) {
                Ok(uri) => self.status_files(&uri).await.map(|entries| {
                    ReplyValue::Uris(entries.into_iter().map(|e| e.uri.to_string()).collect())
                }),
                Err(e) => Err(e),
            },
            GET_FILE_BYTES => match required_uri(call) {
                Ok(uri) => self
                    .file_bytes(&uri)
                    .await
                    .map(|bytes| ReplyValue::Bytes(Base64Bytes(bytes))),
                Err(e) => Err(e),
            },
            SAVE_FILE => match required_uri(call) {
                Ok(uri) => {
                    let mime_type = call
                        .argument::<String>("mimeType")
                        .unwrap_or_else(|| DEFAULT_SAVE_MIME_TYPE.to_string());
                    let file_name = call
                        .argument::<String>("fileName")
                        .unwrap_or_else(|| DEFAULT_SAVE_FILE_NAME.to_string());
                    self.save_file(&uri, &mime_type, &file_name)
                        .await
                        .map(|_| ReplyValue::Flag(true))
                }
                Err(e) => Err(e),
            },
            GET_CURRENT_GRANT => Ok(match self.broker.current_grant().await {
                Some(grant) => ReplyValue::Uri(grant.tree.to_string()),
                None => ReplyValue::Null,
            }),
            other => {
                debug!("Method not implemented: {}", other);
                return MethodResult::NotImplemented;
            }
        };

        match result {
            Ok(value) => MethodResult::success(value),
            Err(e) => {
                warn!("{} failed: {}", call.method, e);
                MethodResult::from_error(&e)
            }
        }
    }

    /// Prompt for the status tree
    pub async fn request_access(&self) -> Result<TreeUri> {
        self.broker.request_grant().await.map(|grant| grant.tree)
    }

    /// Media in the tree named by `uri`.
    ///
    /// Uses the stored grant when `uri` is its tree; otherwise assumes a
    /// read-only grant and leaves the permission check to the resolver.
    pub async fn status_files(&self, uri: &str) -> Result<Vec<MediaEntry>> {
        let tree = TreeUri::parse(uri)?;
        let grant = match self.broker.current_grant().await {
            Some(grant) if grant.tree == tree => grant,
            _ => PermissionGrant::new(tree, AccessMode::Read),
        };
        self.enumerator.list_media(&grant).await
    }

    /// Media in the currently granted tree
    pub async fn list_current(&self) -> Result<Vec<MediaEntry>> {
        let grant = self
            .broker
            .current_grant()
            .await
            .ok_or_else(|| Error::NoUri("No directory has been granted".to_string()))?;
        self.enumerator.list_media(&grant).await
    }

    pub async fn file_bytes(&self, uri: &str) -> Result<Vec<u8>> {
        let uri = DocumentUri::parse(uri)?;
        self.reader.read_bytes(&uri).await
    }

    pub async fn save_file(
        &self,
        uri: &str,
        mime_type: &str,
        file_name: &str,
    ) -> Result<OutputDescriptor> {
        let source = DocumentUri::parse(uri)?;
        self.saver
            .save(&SaveRequest::new(source, mime_type, file_name))
            .await
    }
}

fn required_uri(call: &MethodCall) -> Result<String> {
    call.argument::<String>("uri")
        .ok_or_else(|| Error::NoUri("missing 'uri' argument".to_string()))
}
