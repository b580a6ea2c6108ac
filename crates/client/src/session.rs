//! The logged-in session: bearer token and user profile.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::cache::SnapshotStore;
use crate::error::PersistError;
use crate::models::UserProfile;

#[derive(Serialize, Deserialize)]
struct StoredSession {
    token: String,
    user: UserProfile,
}

#[derive(Clone)]
struct Session {
    token: SecretString,
    user: UserProfile,
}

/// Session persisted in a [`SnapshotStore`] so it survives restarts.
pub struct SessionStore {
    store: Arc<dyn SnapshotStore>,
    current: RwLock<Option<Session>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("user", &self.user().map(|u| u.username))
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Open the store, restoring a saved session. An unreadable session is
    /// discarded.
    #[must_use]
    pub fn open(store: Arc<dyn SnapshotStore>) -> Self {
        let current = match store.load() {
            Ok(Some(raw)) => match serde_json::from_str::<StoredSession>(&raw) {
                Ok(saved) => Some(Session {
                    token: SecretString::from(saved.token),
                    user: saved.user,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load session");
                None
            }
        };

        Self {
            store,
            current: RwLock::new(current),
        }
    }

    /// Replace the session and write it to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written; the in-memory
    /// session is left unchanged.
    pub fn save(&self, token: String, user: UserProfile) -> Result<(), PersistError> {
        let raw = serde_json::to_string(&StoredSession {
            token: token.clone(),
            user: user.clone(),
        })?;
        self.store.save(&raw)?;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Session {
            token: SecretString::from(token),
            user,
        });
        Ok(())
    }

    /// Forget the session in memory and in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    pub fn clear(&self) -> Result<(), PersistError> {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.remove()
    }

    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read()
            .as_ref()
            .is_some_and(|s| !s.token.expose_secret().is_empty())
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.read()
            .as_ref()
            .is_some_and(|s| s.user.role.is_admin())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}
