//! Typed content URIs
//!
//! Trees and documents share the `content://` string form but are not
//! interchangeable: a tree grants access to a subtree, a document names a
//! single node that can be streamed.

use crate::error::UriError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Authority of the external storage documents provider
pub const EXTERNAL_STORAGE_AUTHORITY: &str = "com.android.externalstorage.documents";

/// Authority of the caller-owned media collections
pub const MEDIA_AUTHORITY: &str = "media";

/// Volume prefix used in document ids
pub const PRIMARY_VOLUME: &str = "primary";

/// Document id of the status folder inside the source application's media area
pub const STATUS_TREE_DOCUMENT_ID: &str =
    "primary:Android/media/com.whatsapp/WhatsApp/Media/.Statuses";

const SCHEME: &str = "content";

/// Everything but RFC 3986 unreserved characters is escaped inside an id
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A granted directory tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreeUri {
    authority: String,
    tree_id: String,
}

impl TreeUri {
    pub fn new(authority: impl Into<String>, tree_id: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            tree_id: tree_id.into(),
        }
    }

    /// Tree on the primary external storage volume
    pub fn primary(relative_path: &str) -> Self {
        Self::new(
            EXTERNAL_STORAGE_AUTHORITY,
            format!("{}:{}", PRIMARY_VOLUME, relative_path.trim_matches('/')),
        )
    }

    /// The well-known status folder tree
    pub fn status_folder() -> Self {
        Self::new(EXTERNAL_STORAGE_AUTHORITY, STATUS_TREE_DOCUMENT_ID)
    }

    pub fn parse(s: &str) -> Result<Self, UriError> {
        let (authority, segments) = split_content(s)?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["tree", tree_id] => Ok(Self {
                authority,
                tree_id: decode_component(tree_id)?,
            }),
            _ => Err(UriError::NotTree(s.to_string())),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn tree_id(&self) -> &str {
        &self.tree_id
    }

    /// Document URI for a node inside this tree
    pub fn document(&self, document_id: impl Into<String>) -> DocumentUri {
        DocumentUri {
            authority: self.authority.clone(),
            tree_id: Some(self.tree_id.clone()),
            document_id: document_id.into(),
        }
    }
}

impl fmt::Display for TreeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/tree/{}",
            SCHEME,
            self.authority,
            encode_component(&self.tree_id)
        )
    }
}

impl FromStr for TreeUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TreeUri {
    type Error = UriError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TreeUri> for String {
    fn from(uri: TreeUri) -> Self {
        uri.to_string()
    }
}

/// A single streamable node: either inside a granted tree or in a caller-owned collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentUri {
    authority: String,
    tree_id: Option<String>,
    document_id: String,
}

impl DocumentUri {
    /// Entry in a caller-owned media collection
    pub fn media(document_id: impl Into<String>) -> Self {
        Self {
            authority: MEDIA_AUTHORITY.to_string(),
            tree_id: None,
            document_id: document_id.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, UriError> {
        let (authority, segments) = split_content(s)?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["tree", tree_id, "document", document_id] => Ok(Self {
                authority,
                tree_id: Some(decode_component(tree_id)?),
                document_id: decode_component(document_id)?,
            }),
            ["document", document_id] => Ok(Self {
                authority,
                tree_id: None,
                document_id: decode_component(document_id)?,
            }),
            _ => Err(UriError::NotDocument(s.to_string())),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn tree_id(&self) -> Option<&str> {
        self.tree_id.as_deref()
    }

    /// The tree this document was reached through, if any
    pub fn tree(&self) -> Option<TreeUri> {
        self.tree_id
            .as_ref()
            .map(|tree_id| TreeUri::new(self.authority.clone(), tree_id.clone()))
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", SCHEME, self.authority)?;
        if let Some(tree_id) = &self.tree_id {
            write!(f, "/tree/{}", encode_component(tree_id))?;
        }
        write!(f, "/document/{}", encode_component(&self.document_id))
    }
}

impl FromStr for DocumentUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentUri {
    type Error = UriError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DocumentUri> for String {
    fn from(uri: DocumentUri) -> Self {
        uri.to_string()
    }
}

/// Split `content://authority/a/b` into the authority and its raw path segments
fn split_content(s: &str) -> Result<(String, Vec<String>), UriError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(UriError::Empty);
    }

    let url = Url::parse(s).map_err(|_| UriError::NotContent(s.to_string()))?;
    if url.scheme() != SCHEME {
        return Err(UriError::NotContent(s.to_string()));
    }

    let authority = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| UriError::NotContent(s.to_string()))?
        .to_string();

    let segments = url
        .path_segments()
        .map(|parts| {
            parts
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok((authority, segments))
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

fn decode_component(s: &str) -> Result<String, UriError> {
    // percent_decode passes malformed escapes through untouched; reject them instead
    let bytes = s.as_bytes();
    let well_formed = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .all(|(i, _)| {
            bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
        });
    if !well_formed {
        return Err(UriError::BadEncoding(s.to_string()));
    }

    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| UriError::BadEncoding(s.to_string()))
}
