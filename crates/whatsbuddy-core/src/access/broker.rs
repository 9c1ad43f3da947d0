//! Access broker: owns the single persisted tree grant

use super::picker::{PendingTable, PickerHost, PickerOutcome, PickerRequest, PickerResponder};
use crate::error::{AccessError, Result};
use crate::resolver::ContentResolver;
use crate::storage::{get_grant, upsert_grant, Storage, STATUS_GRANT_KEY};
use crate::types::{AccessMode, PermissionGrant, RequestToken, TreeUri};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

/// Brokers the user-mediated grant for the status tree.
///
/// At most one picker request is in flight; a second `request_grant` while one
/// is pending fails with [`AccessError::RequestPending`] and leaves the first
/// untouched.
pub struct AccessBroker {
    picker: Arc<dyn PickerHost>,
    resolver: Arc<dyn ContentResolver>,
    storage: Arc<Storage>,
    access_mode: AccessMode,
    in_flight: AtomicBool,
    pending: PendingTable,
    current: RwLock<Option<PermissionGrant>>,
}

/// Releases the in-flight slot and any unanswered pending entry
struct InFlightGuard<'a> {
    broker: &'a AccessBroker,
    token: RequestToken,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.broker.pending.lock().remove(&self.token);
        self.broker.in_flight.store(false, Ordering::Release);
    }
}

impl AccessBroker {
    /// Create a broker, restoring the grant persisted by a previous process
    pub fn new(
        picker: Arc<dyn PickerHost>,
        resolver: Arc<dyn ContentResolver>,
        storage: Arc<Storage>,
    ) -> Result<Self> {
        let persisted = {
            let conn = storage.connection()?;
            match get_grant(&conn, STATUS_GRANT_KEY) {
                Ok(grant) => grant,
                Err(e) => {
                    warn!("Discarding unreadable persisted grant: {}", e);
                    None
                }
            }
        };

        if let Some(grant) = &persisted {
            info!("Restored grant for {}", grant.tree);
        }

        Ok(Self {
            picker,
            resolver,
            storage,
            access_mode: AccessMode::Read,
            in_flight: AtomicBool::new(false),
            pending: Arc::new(Mutex::new(HashMap::new())),
            current: RwLock::new(persisted),
        })
    }

    /// Set the permission requested by future grants
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Whether a picker request is currently outstanding
    pub fn has_pending_request(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The last successful grant, without prompting
    pub async fn current_grant(&self) -> Option<PermissionGrant> {
        self.current.read().await.clone()
    }

    /// The well-known status folder, if it exists on the volume
    pub async fn status_folder_hint(&self) -> Option<TreeUri> {
        let tree = TreeUri::status_folder();
        if self.resolver.tree_exists(&tree).await {
            Some(tree)
        } else {
            None
        }
    }

    /// Ask the user for a tree and persist the result.
    ///
    /// On denial the previous grant is left unchanged.
    pub async fn request_grant(&self) -> Result<PermissionGrant> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejecting grant request: another request is pending");
            return Err(AccessError::RequestPending.into());
        }

        let token = RequestToken::generate();
        let guard = InFlightGuard {
            broker: self,
            token: token.clone(),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(token.clone(), tx);

        let request = PickerRequest {
            token: token.clone(),
            initial_location: self.status_folder_hint().await,
            access: self.access_mode,
        };
        let responder = PickerResponder::new(token.clone(), Arc::clone(&self.pending));

        info!("Launching directory picker (request {})", token);
        self.picker
            .launch(request, responder)
            .await
            .map_err(|e| AccessError::PickerFailed(e.to_string()))?;

        let outcome = rx.await.unwrap_or(PickerOutcome::Cancelled);
        let result = match outcome {
            PickerOutcome::Granted(tree) => self.persist(tree).await,
            PickerOutcome::Cancelled => {
                info!("User denied access (request {})", token);
                Err(AccessError::Denied("User denied access".to_string()).into())
            }
        };

        drop(guard);
        result
    }

    async fn persist(&self, tree: TreeUri) -> Result<PermissionGrant> {
        debug!("Taking persistable permission on {}", tree);
        self.resolver
            .take_persistable_permission(&tree, self.access_mode)
            .await
            .map_err(|e| AccessError::PersistFailed(e.to_string()))?;

        let grant = PermissionGrant::new(tree, self.access_mode);
        {
            let conn = self.storage.connection()?;
            upsert_grant(&conn, STATUS_GRANT_KEY, &grant)?;
        }

        let previous = self.current.write().await.replace(grant.clone());
        info!("Granted access to {}", grant.tree);

        // Only one tree is held at a time
        if let Some(previous) = previous.filter(|p| p.tree != grant.tree) {
            if let Err(e) = self
                .resolver
                .release_persistable_permission(&previous.tree)
                .await
            {
                warn!("Failed to release permission on {}: {}", previous.tree, e);
            } else {
                debug!("Released replaced grant on {}", previous.tree);
            }
        }

        Ok(grant)
    }
}
