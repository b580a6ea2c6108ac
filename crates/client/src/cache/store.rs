//! Durable backing stores for cache snapshots.
//!
//! A snapshot is an opaque string (JSON produced by the cache). Stores may
//! enforce a byte quota, reported as [`PersistError::QuotaExceeded`] so the
//! cache can retry with fewer entries.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::PersistError;

/// Somewhere a cache snapshot can be kept between runs.
pub trait SnapshotStore: Send + Sync {
    /// Read the current snapshot, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self) -> Result<Option<String>, PersistError>;

    /// Replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::QuotaExceeded`] when the snapshot is too large,
    /// or an I/O error.
    fn save(&self, snapshot: &str) -> Result<(), PersistError>;

    /// Delete the snapshot. Deleting a missing snapshot is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be modified.
    fn remove(&self) -> Result<(), PersistError>;
}

fn check_quota(quota: Option<usize>, snapshot: &str) -> Result<(), PersistError> {
    match quota {
        Some(quota) if snapshot.len() > quota => Err(PersistError::QuotaExceeded {
            size: snapshot.len(),
            quota,
        }),
        _ => Ok(()),
    }
}

/// Snapshot kept in a single file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    quota: Option<usize>,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
        }
    }

    /// Limit snapshots to `bytes`.
    #[must_use]
    pub const fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistError> {
        check_quota(self.quota, snapshot)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, snapshot)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-process snapshot store, used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot.into())),
            quota: None,
        }
    }

    /// Limit snapshots to `bytes`.
    #[must_use]
    pub const fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// The stored snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<String>, PersistError> {
        Ok(self.snapshot())
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistError> {
        check_quota(self.quota, snapshot)?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.to_owned());
        Ok(())
    }

    fn remove(&self) -> Result<(), PersistError> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Memory store whose first save parks until the test releases it.
#[cfg(test)]
pub(crate) struct GatedStore {
    inner: MemorySnapshotStore,
    gate: Mutex<Option<(std::sync::mpsc::Sender<()>, std::sync::mpsc::Receiver<()>)>>,
}

#[cfg(test)]
impl GatedStore {
    /// The store, a receiver signalled when the first save starts, and the
    /// sender that lets it finish.
    pub(crate) fn new() -> (Self, std::sync::mpsc::Receiver<()>, std::sync::mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Self {
            inner: MemorySnapshotStore::new(),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        };
        (store, entered_rx, release_tx)
    }

    pub(crate) fn snapshot(&self) -> Option<String> {
        self.inner.snapshot()
    }
}

#[cfg(test)]
impl SnapshotStore for GatedStore {
    fn load(&self) -> Result<Option<String>, PersistError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistError> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.inner.save(snapshot)
    }

    fn remove(&self) -> Result<(), PersistError> {
        self.inner.remove()
    }
}
