//! Content resolver abstraction
//!
//! The resolver is the OS content-addressing service: it resolves typed URIs
//! to documents, holds persistable URI permissions, lists tree children,
//! opens byte streams and manages entries in caller-owned collections.

use crate::error::ResolverResult;
use crate::types::{AccessMode, ChildDocument, DocumentUri, NewEntry, TreeUri};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable byte stream handed out by a resolver
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream handed out by a resolver
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Whether the tree currently names an existing directory
    async fn tree_exists(&self, tree: &TreeUri) -> bool;

    /// Retain access to `tree` across process restarts
    async fn take_persistable_permission(
        &self,
        tree: &TreeUri,
        mode: AccessMode,
    ) -> ResolverResult<()>;

    /// Give up a persisted permission on `tree`; a no-op when none is held
    async fn release_persistable_permission(&self, tree: &TreeUri) -> ResolverResult<()>;

    /// Document id of the tree's root node
    async fn tree_document_id(&self, tree: &TreeUri) -> ResolverResult<String>;

    /// Direct children of `parent_document_id`, in listing order
    async fn query_children(
        &self,
        tree: &TreeUri,
        parent_document_id: &str,
    ) -> ResolverResult<Vec<ChildDocument>>;

    /// `Ok(None)` when the node exists but has no byte stream
    async fn open_input(&self, uri: &DocumentUri) -> ResolverResult<Option<ByteReader>>;

    async fn open_output(&self, uri: &DocumentUri) -> ResolverResult<Option<ByteWriter>>;

    /// Create an empty entry; fails with `AlreadyExists` instead of replacing one
    async fn insert(&self, entry: &NewEntry) -> ResolverResult<Option<DocumentUri>>;

    async fn delete(&self, uri: &DocumentUri) -> ResolverResult<()>;
}
