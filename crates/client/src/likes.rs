//! Liked products, kept in a single persisted list.

use std::sync::Arc;

use tokio::sync::watch;

use nutritracker_core::ProductId;

use crate::cache::SnapshotStore;
use crate::error::PersistError;

/// The set of liked product ids, in the order they were liked.
///
/// The backing store is the only source of truth: a toggle is written before
/// it becomes visible, so memory and storage never disagree.
pub struct LikeStore {
    store: Arc<dyn SnapshotStore>,
    liked: watch::Sender<Vec<ProductId>>,
}

impl std::fmt::Debug for LikeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeStore")
            .field("liked", &*self.liked.borrow())
            .finish_non_exhaustive()
    }
}

impl LikeStore {
    /// Load the saved list. A missing or unreadable list starts empty.
    #[must_use]
    pub fn open(store: Arc<dyn SnapshotStore>) -> Self {
        let liked = match store.load() {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring unreadable liked products");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load liked products");
                Vec::new()
            }
        };

        Self {
            store,
            liked: watch::Sender::new(liked),
        }
    }

    /// Like `id`, or unlike it if already liked. Returns whether it is now
    /// liked.
    ///
    /// # Errors
    ///
    /// Returns an error if the new list cannot be saved; nothing changes.
    pub fn toggle(&self, id: &ProductId) -> Result<bool, PersistError> {
        let mut outcome = Ok(false);
        // The channel's write lock is held from read to publish
        self.liked.send_if_modified(|liked| {
            let mut next = liked.clone();
            let now_liked = if let Some(pos) = next.iter().position(|p| p == id) {
                next.remove(pos);
                false
            } else {
                next.push(id.clone());
                true
            };

            outcome = serde_json::to_string(&next)
                .map_err(PersistError::from)
                .and_then(|raw| self.store.save(&raw))
                .map(|()| now_liked);
            if outcome.is_ok() {
                *liked = next;
            }
            outcome.is_ok()
        });

        let now_liked = outcome?;
        tracing::debug!(product_id = %id, liked = now_liked, "Like toggled");
        Ok(now_liked)
    }

    #[must_use]
    pub fn is_liked(&self, id: &ProductId) -> bool {
        self.liked.borrow().contains(id)
    }

    #[must_use]
    pub fn liked(&self) -> Vec<ProductId> {
        self.liked.borrow().clone()
    }

    /// Watch the list; receivers see every successful toggle.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<ProductId>> {
        self.liked.subscribe()
    }
}
