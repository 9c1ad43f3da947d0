//! Directory enumeration over a granted tree

use crate::error::{Error, Result};
use crate::media::is_eligible;
use crate::resolver::ContentResolver;
use crate::types::{MediaEntry, PermissionGrant};
use std::sync::Arc;
use tracing::debug;

/// Lists the eligible media directly inside a granted tree
pub struct MediaEnumerator {
    resolver: Arc<dyn ContentResolver>,
}

impl MediaEnumerator {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self { resolver }
    }

    /// Eligible, non-empty children of the grant's tree root, in listing order.
    ///
    /// Fails with [`Error::Enumeration`] when the tree can no longer be resolved
    /// or its permission was revoked.
    pub async fn list_media(&self, grant: &PermissionGrant) -> Result<Vec<MediaEntry>> {
        let tree = &grant.tree;

        let root_id = self
            .resolver
            .tree_document_id(tree)
            .await
            .map_err(|e| Error::Enumeration(e.to_string()))?;

        let children = self
            .resolver
            .query_children(tree, &root_id)
            .await
            .map_err(|e| Error::Enumeration(e.to_string()))?;

        let total = children.len();
        let entries: Vec<MediaEntry> = children
            .into_iter()
            .filter(|child| child.size > 0 && is_eligible(&child.display_name))
            .map(|child| {
                let mime_type = child.mime_type.or_else(|| {
                    mime_guess::from_path(&child.display_name)
                        .first()
                        .map(|m| m.to_string())
                });
                MediaEntry {
                    uri: tree.document(child.document_id),
                    display_name: child.display_name,
                    size_bytes: child.size,
                    mime_type,
                }
            })
            .collect();

        debug!(
            "Listed {} of {} children in {}",
            entries.len(),
            total,
            tree
        );

        Ok(entries)
    }
}
