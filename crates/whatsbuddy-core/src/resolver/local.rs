//! Filesystem-backed content resolver
//!
//! Maps `primary:<relative path>` document ids onto a volume root directory.
//! Tree-scoped documents are only reachable while a persisted permission on
//! their tree (or an ancestor tree) exists. Media documents need no grant but
//! must sit inside one of the caller's registered collections.

use super::traits::{ByteReader, ByteWriter, ContentResolver};
use crate::error::{ResolverError, ResolverResult};
use crate::types::{
    AccessMode, ChildDocument, DocumentUri, NewEntry, TreeUri, DEFAULT_OUTPUT_RELATIVE_PATH,
    EXTERNAL_STORAGE_AUTHORITY, MEDIA_AUTHORITY, PRIMARY_VOLUME,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const DIRECTORY_MIME_TYPE: &str = "vnd.android.document/directory";

/// Content resolver over a local directory standing in for a storage volume
pub struct LocalResolver {
    volume_root: PathBuf,
    /// Persisted permissions by tree id
    permissions: RwLock<BTreeMap<String, AccessMode>>,
    permission_store: Option<PathBuf>,
    /// Caller-owned collections, relative to the volume root
    media_collections: Vec<PathBuf>,
}

impl LocalResolver {
    /// Resolver whose permissions live only as long as the process
    pub fn new(volume_root: impl Into<PathBuf>) -> Self {
        Self {
            volume_root: volume_root.into(),
            permissions: RwLock::new(BTreeMap::new()),
            permission_store: None,
            media_collections: vec![PathBuf::from(DEFAULT_OUTPUT_RELATIVE_PATH)],
        }
    }

    /// Resolver whose permissions are kept in a JSON file across restarts
    pub fn with_permission_store(
        volume_root: impl Into<PathBuf>,
        store_path: impl Into<PathBuf>,
    ) -> ResolverResult<Self> {
        let store_path = store_path.into();
        let permissions = match std::fs::read_to_string(&store_path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded URI permissions from {:?}", store_path);

        Ok(Self {
            volume_root: volume_root.into(),
            permissions: RwLock::new(permissions),
            permission_store: Some(store_path),
            media_collections: vec![PathBuf::from(DEFAULT_OUTPUT_RELATIVE_PATH)],
        })
    }

    /// Register another caller-owned collection, e.g. `Pictures/Saved`
    pub fn with_media_collection(mut self, path: &str) -> ResolverResult<Self> {
        let collection = relative_path(&format!("{}:{}", PRIMARY_VOLUME, path.trim_matches('/')))?;
        if collection.as_os_str().is_empty() {
            return Err(ResolverError::UnsupportedUri(
                "a media collection cannot be the volume root".to_string(),
            ));
        }

        if !self.media_collections.contains(&collection) {
            self.media_collections.push(collection);
        }
        Ok(self)
    }

    /// Whether `tree` is covered by a persisted permission of at least `mode`
    pub fn has_permission(&self, tree: &TreeUri, mode: AccessMode) -> bool {
        match self.tree_access(tree.tree_id()) {
            Some(held) => !mode.allows_write() || held.allows_write(),
            None => false,
        }
    }

    /// Whether `path` lies inside (or is) a registered media collection
    fn in_media_collection(&self, path: &Path) -> bool {
        self.media_collections
            .iter()
            .any(|collection| path.starts_with(collection))
    }

    /// Filesystem path of a document id
    fn resolve_path(&self, document_id: &str) -> ResolverResult<PathBuf> {
        Ok(self.volume_root.join(relative_path(document_id)?))
    }

    /// Strongest permission held on `tree_id` or any tree containing it
    fn tree_access(&self, tree_id: &str) -> Option<AccessMode> {
        let target = relative_path(tree_id).ok()?;
        let permissions = self.permissions.read();

        permissions
            .iter()
            .filter_map(|(granted, mode)| {
                let granted = relative_path(granted).ok()?;
                target.starts_with(&granted).then_some(*mode)
            })
            .reduce(AccessMode::merge)
    }

    /// Path of `uri` after checking the caller may access it
    fn authorize(&self, uri: &DocumentUri, write: bool) -> ResolverResult<PathBuf> {
        match uri.authority() {
            MEDIA_AUTHORITY => {
                let document = relative_path(uri.document_id())?;
                if self.in_media_collection(&document) {
                    Ok(self.volume_root.join(document))
                } else {
                    Err(ResolverError::PermissionDenied(format!(
                        "{} is not in a media collection",
                        uri
                    )))
                }
            }
            EXTERNAL_STORAGE_AUTHORITY => {
                let tree_id = uri.tree_id().ok_or_else(|| {
                    ResolverError::PermissionDenied(format!(
                        "{} was not reached through a granted tree",
                        uri
                    ))
                })?;

                let tree = relative_path(tree_id)?;
                let document = relative_path(uri.document_id())?;
                if !document.starts_with(&tree) {
                    return Err(ResolverError::PermissionDenied(format!(
                        "{} lies outside its tree",
                        uri
                    )));
                }

                match self.tree_access(tree_id) {
                    Some(mode) if !write || mode.allows_write() => {
                        Ok(self.volume_root.join(document))
                    }
                    Some(_) => Err(ResolverError::PermissionDenied(format!(
                        "no write permission for {}",
                        uri
                    ))),
                    None => Err(ResolverError::PermissionDenied(format!(
                        "no persisted permission for {}",
                        uri
                    ))),
                }
            }
            other => Err(ResolverError::UnsupportedUri(format!(
                "unknown authority '{}'",
                other
            ))),
        }
    }

    fn check_tree(&self, tree: &TreeUri) -> ResolverResult<PathBuf> {
        if tree.authority() != EXTERNAL_STORAGE_AUTHORITY {
            return Err(ResolverError::UnsupportedUri(format!(
                "unknown authority '{}'",
                tree.authority()
            )));
        }
        if self.tree_access(tree.tree_id()).is_none() {
            return Err(ResolverError::PermissionDenied(format!(
                "no persisted permission for {}",
                tree
            )));
        }
        self.resolve_path(tree.tree_id())
    }

    fn save_permissions(&self) -> ResolverResult<()> {
        let Some(store_path) = &self.permission_store else {
            return Ok(());
        };

        let json = {
            let permissions = self.permissions.read();
            serde_json::to_string_pretty(&*permissions)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?
        };

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(store_path, json)?;
        Ok(())
    }
}

#[async_trait]
impl ContentResolver for LocalResolver {
    async fn tree_exists(&self, tree: &TreeUri) -> bool {
        if tree.authority() != EXTERNAL_STORAGE_AUTHORITY {
            return false;
        }
        match self.resolve_path(tree.tree_id()) {
            Ok(path) => fs::metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn take_persistable_permission(
        &self,
        tree: &TreeUri,
        mode: AccessMode,
    ) -> ResolverResult<()> {
        if tree.authority() != EXTERNAL_STORAGE_AUTHORITY {
            return Err(ResolverError::UnsupportedUri(tree.to_string()));
        }

        let path = self.resolve_path(tree.tree_id())?;
        let metadata = fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
        if !metadata.is_dir() {
            return Err(ResolverError::NotFound(format!("{:?} is not a directory", path)));
        }

        {
            let mut permissions = self.permissions.write();
            let merged = permissions
                .get(tree.tree_id())
                .map_or(mode, |held| held.merge(mode));
            permissions.insert(tree.tree_id().to_string(), merged);
        }

        info!("Persisted {:?} permission on {}", mode, tree);
        self.save_permissions()
    }

    async fn release_persistable_permission(&self, tree: &TreeUri) -> ResolverResult<()> {
        let released = self.permissions.write().remove(tree.tree_id()).is_some();
        if released {
            info!("Released permission on {}", tree);
            self.save_permissions()?;
        }
        Ok(())
    }

    async fn tree_document_id(&self, tree: &TreeUri) -> ResolverResult<String> {
        let path = self.check_tree(tree)?;
        let metadata = fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
        if !metadata.is_dir() {
            return Err(ResolverError::NotFound(format!("{:?} is not a directory", path)));
        }
        Ok(tree.tree_id().to_string())
    }

    async fn query_children(
        &self,
        tree: &TreeUri,
        parent_document_id: &str,
    ) -> ResolverResult<Vec<ChildDocument>> {
        let parent = self.authorize(&tree.document(parent_document_id), false)?;

        debug!("Querying children of {:?}", parent);

        let mut children = Vec::new();
        let mut read_dir = fs::read_dir(&parent)
            .await
            .map_err(|e| io_error(&parent, e))?;

        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping unreadable entry {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();

            let (size, mime_type) = if metadata.is_dir() {
                (0, Some(DIRECTORY_MIME_TYPE.to_string()))
            } else {
                (
                    i64::try_from(metadata.len()).unwrap_or(i64::MAX),
                    mime_guess::from_path(entry.path())
                        .first()
                        .map(|m| m.to_string()),
                )
            };

            children.push(ChildDocument {
                document_id: child_document_id(parent_document_id, &name),
                display_name: name,
                size,
                mime_type,
            });
        }

        Ok(children)
    }

    async fn open_input(&self, uri: &DocumentUri) -> ResolverResult<Option<ByteReader>> {
        let path = self.authorize(uri, false)?;
        let metadata = fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
        if metadata.is_dir() {
            return Ok(None);
        }

        let file = fs::File::open(&path).await.map_err(|e| io_error(&path, e))?;
        Ok(Some(Box::new(file)))
    }

    async fn open_output(&self, uri: &DocumentUri) -> ResolverResult<Option<ByteWriter>> {
        let path = self.authorize(uri, true)?;
        let metadata = fs::metadata(&path).await.map_err(|e| io_error(&path, e))?;
        if metadata.is_dir() {
            return Ok(None);
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(Some(Box::new(file)))
    }

    async fn insert(&self, entry: &NewEntry) -> ResolverResult<Option<DocumentUri>> {
        let name = entry.display_name.as_str();
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ResolverError::UnsupportedUri(format!(
                "invalid display name '{}'",
                name
            )));
        }

        let folder_id = format!(
            "{}:{}",
            PRIMARY_VOLUME,
            entry.relative_path.trim_matches('/')
        );
        if !self.in_media_collection(&relative_path(&folder_id)?) {
            return Err(ResolverError::PermissionDenied(format!(
                "'{}' is not a media collection",
                entry.relative_path
            )));
        }

        let document_id = child_document_id(&folder_id, name);
        let folder = self.resolve_path(&folder_id)?;
        let path = self.resolve_path(&document_id)?;

        fs::create_dir_all(&folder)
            .await
            .map_err(|e| io_error(&folder, e))?;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ResolverError::AlreadyExists(name.to_string()));
            }
            Err(e) => return Err(io_error(&path, e)),
        }

        debug!("Inserted {} ({}) at {:?}", name, entry.mime_type, path);
        Ok(Some(DocumentUri::media(document_id)))
    }

    async fn delete(&self, uri: &DocumentUri) -> ResolverResult<()> {
        let path = self.authorize(uri, true)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        debug!("Deleted {:?}", path);
        Ok(())
    }
}

/// Relative path named by a `primary:` document id, rejecting traversal
fn relative_path(document_id: &str) -> ResolverResult<PathBuf> {
    let rest = document_id
        .strip_prefix(PRIMARY_VOLUME)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| {
            ResolverError::UnsupportedUri(format!("unknown volume in '{}'", document_id))
        })?;

    let mut path = PathBuf::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ResolverError::UnsupportedUri(format!(
                    "path traversal in '{}'",
                    document_id
                )))
            }
        }
    }
    Ok(path)
}

fn child_document_id(parent: &str, name: &str) -> String {
    if parent.ends_with(':') || parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ResolverError {
    match err.kind() {
        ErrorKind::NotFound => ResolverError::NotFound(format!("{:?}", path)),
        ErrorKind::PermissionDenied => ResolverError::PermissionDenied(format!("{:?}", path)),
        _ => ResolverError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn volume() -> (tempfile::TempDir, LocalResolver) {
        let dir = tempdir().unwrap();
        let statuses = dir.path().join("Statuses");
        std::fs::create_dir_all(&statuses).unwrap();
        std::fs::write(statuses.join("a.jpg"), b"jpeg bytes").unwrap();
        std::fs::write(statuses.join(".nomedia"), b"").unwrap();
        std::fs::create_dir(statuses.join("sub")).unwrap();
        let resolver = LocalResolver::new(dir.path());
        (dir, resolver)
    }

    #[test]
    fn test_relative_path_rejects_traversal() {
        assert_eq!(
            relative_path("primary:A/B").unwrap(),
            PathBuf::from("A").join("B")
        );
        assert_eq!(relative_path("primary:").unwrap(), PathBuf::new());
        assert!(relative_path("primary:A/../../etc").is_err());
        assert!(relative_path("primary:/etc").is_err());
        assert!(relative_path("secondary:A").is_err());
    }

    #[test]
    fn test_child_document_id() {
        assert_eq!(child_document_id("primary:", "x"), "primary:x");
        assert_eq!(child_document_id("primary:A", "x"), "primary:A/x");
    }

    #[tokio::test]
    async fn test_tree_requires_permission() {
        let (_dir, resolver) = volume();
        let tree = TreeUri::primary("Statuses");

        assert!(resolver.tree_exists(&tree).await);
        assert!(matches!(
            resolver.tree_document_id(&tree).await,
            Err(ResolverError::PermissionDenied(_))
        ));

        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();
        assert_eq!(
            resolver.tree_document_id(&tree).await.unwrap(),
            "primary:Statuses"
        );
    }

    #[tokio::test]
    async fn test_missing_tree_cannot_be_granted() {
        let (_dir, resolver) = volume();
        let result = resolver
            .take_persistable_permission(&TreeUri::primary("Nope"), AccessMode::Read)
            .await;
        assert!(matches!(result, Err(ResolverError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_children() {
        let (_dir, resolver) = volume();
        let tree = TreeUri::primary("Statuses");
        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();

        let mut children = resolver
            .query_children(&tree, "primary:Statuses")
            .await
            .unwrap();
        children.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        assert_eq!(children.len(), 3);
        assert_eq!(children[0].display_name, ".nomedia");
        assert_eq!(children[0].size, 0);
        assert_eq!(children[1].document_id, "primary:Statuses/a.jpg");
        assert_eq!(children[1].size, 10);
        assert_eq!(children[1].mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(children[2].mime_type.as_deref(), Some(DIRECTORY_MIME_TYPE));
    }

    #[tokio::test]
    async fn test_open_input() {
        let (_dir, resolver) = volume();
        let tree = TreeUri::primary("Statuses");
        let doc = tree.document("primary:Statuses/a.jpg");

        assert!(matches!(
            resolver.open_input(&doc).await,
            Err(ResolverError::PermissionDenied(_))
        ));

        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();

        let mut reader = resolver.open_input(&doc).await.unwrap().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"jpeg bytes");

        let dir_doc = tree.document("primary:Statuses/sub");
        assert!(resolver.open_input(&dir_doc).await.unwrap().is_none());

        let outside = tree.document("primary:Other/a.jpg");
        assert!(matches!(
            resolver.open_input(&outside).await,
            Err(ResolverError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_read_grant_does_not_allow_writes() {
        let (_dir, resolver) = volume();
        let tree = TreeUri::primary("Statuses");
        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();

        let doc = tree.document("primary:Statuses/a.jpg");
        assert!(matches!(
            resolver.open_output(&doc).await,
            Err(ResolverError::PermissionDenied(_))
        ));
        assert!(matches!(
            resolver.delete(&doc).await,
            Err(ResolverError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_write_delete() {
        let (dir, resolver) = volume();
        let entry = NewEntry {
            display_name: "out.jpg".into(),
            mime_type: "image/jpeg".into(),
            relative_path: "Download/WhatsBuddy".into(),
        };

        let uri = resolver.insert(&entry).await.unwrap().unwrap();
        assert_eq!(uri.document_id(), "primary:Download/WhatsBuddy/out.jpg");

        assert!(matches!(
            resolver.insert(&entry).await,
            Err(ResolverError::AlreadyExists(_))
        ));

        let mut writer = resolver.open_output(&uri).await.unwrap().unwrap();
        writer.write_all(b"copy").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let path = dir.path().join("Download/WhatsBuddy/out.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"copy");

        resolver.delete(&uri).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_media_documents_limited_to_collections() {
        let (dir, resolver) = volume();

        // A media URI is not a way around the tree grant
        let status = DocumentUri::media("primary:Statuses/a.jpg");
        assert!(matches!(
            resolver.open_input(&status).await,
            Err(ResolverError::PermissionDenied(_))
        ));
        assert!(matches!(
            resolver.delete(&status).await,
            Err(ResolverError::PermissionDenied(_))
        ));
        assert!(matches!(
            resolver
                .open_input(&DocumentUri::media("primary:Download/WhatsBuddy/../../Statuses/a.jpg"))
                .await,
            Err(ResolverError::UnsupportedUri(_))
        ));

        let entry = NewEntry {
            display_name: "x.jpg".into(),
            mime_type: "image/jpeg".into(),
            relative_path: "Statuses".into(),
        };
        assert!(matches!(
            resolver.insert(&entry).await,
            Err(ResolverError::PermissionDenied(_))
        ));
        assert!(!dir.path().join("Statuses/x.jpg").exists());

        let resolver = resolver.with_media_collection("/Pictures/Saved/").unwrap();
        let entry = NewEntry {
            relative_path: "Pictures/Saved".into(),
            ..entry
        };
        let uri = resolver.insert(&entry).await.unwrap().unwrap();
        assert!(resolver.open_input(&uri).await.unwrap().is_some());

        assert!(LocalResolver::new(dir.path()).with_media_collection("/").is_err());
        assert!(LocalResolver::new(dir.path()).with_media_collection("A/../..").is_err());
    }

    #[tokio::test]
    async fn test_release_permission() {
        let (_dir, resolver) = volume();
        let tree = TreeUri::primary("Statuses");
        resolver
            .take_persistable_permission(&tree, AccessMode::Read)
            .await
            .unwrap();

        resolver.release_persistable_permission(&tree).await.unwrap();
        assert!(!resolver.has_permission(&tree, AccessMode::Read));
        assert!(matches!(
            resolver.tree_document_id(&tree).await,
            Err(ResolverError::PermissionDenied(_))
        ));

        // Releasing again is harmless
        resolver.release_persistable_permission(&tree).await.unwrap();
    }

    #[tokio::test]
    async fn test_permissions_survive_restart() {
        let (dir, _) = volume();
        let store = dir.path().join("state/permissions.json");
        let tree = TreeUri::primary("Statuses");

        {
            let resolver = LocalResolver::with_permission_store(dir.path(), &store).unwrap();
            resolver
                .take_persistable_permission(&tree, AccessMode::ReadWrite)
                .await
                .unwrap();
        }

        let resolver = LocalResolver::with_permission_store(dir.path(), &store).unwrap();
        assert!(resolver.has_permission(&tree, AccessMode::ReadWrite));
        // Child trees are covered by the ancestor grant
        assert!(resolver.has_permission(&TreeUri::primary("Statuses/sub"), AccessMode::Read));

        resolver.release_persistable_permission(&tree).await.unwrap();
        let resolver = LocalResolver::with_permission_store(dir.path(), &store).unwrap();
        assert!(!resolver.has_permission(&tree, AccessMode::Read));
    }
}
