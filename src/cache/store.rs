//! Rendered image cache with time-to-live eviction.
//!
//! Hits never extend an entry's lifetime. Files replaced by a newer render of
//! the same key are not deleted on the spot; they age out through the same
//! sweep so callers still showing the old path keep a valid file for a while.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use crate::core::PixelSize;
use crate::utils::{file_exists, remove_file_quiet};
use super::key::CacheKey;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub file_path: PathBuf,
    pub pixel_size: Option<PixelSize>,
    pub created_at: Instant,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CachedArtifact),
    Miss,
    /// The entry existed but its file is gone; it has been dropped
    MissingFile(PathBuf),
}

#[derive(Debug)]
pub struct ImageCache {
    entries: HashMap<CacheKey, CachedArtifact>,
    orphans: Vec<(PathBuf, Instant)>,
    timeout: Duration,
}

impl ImageCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            orphans: Vec::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        debug!("Image cache timeout set to {:?}", timeout);
        self.timeout = timeout;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks `key` up, verifying that the backing file still exists.
    pub fn lookup(&mut self, key: &CacheKey) -> Lookup {
        let Some(artifact) = self.entries.get(key) else {
            return Lookup::Miss;
        };
        if file_exists(&artifact.file_path) {
            return Lookup::Hit(artifact.clone());
        }
        let path = artifact.file_path.clone();
        debug!("Cached file {} vanished, dropping {}", path.display(), key);
        self.entries.remove(key);
        Lookup::MissingFile(path)
    }

    pub fn insert(&mut self, artifact: CachedArtifact) {
        let created_at = artifact.created_at;
        if let Some(previous) = self.entries.insert(artifact.key.clone(), artifact) {
            let replaced_by_same_file = self
                .entries
                .get(&previous.key)
                .is_some_and(|current| current.file_path == previous.file_path);
            if !replaced_by_same_file {
                self.orphans.push((previous.file_path, created_at));
            }
        }
    }

    /// Removes and deletes everything at least `timeout` old at `now`.
    /// Returns the number of entries evicted.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let expired = |created: Instant| now.saturating_duration_since(created) >= timeout;

        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, artifact)| expired(artifact.created_at))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(artifact) = self.entries.remove(key) {
                debug!("Evicting {} ({})", key, artifact.file_path.display());
                remove_file_quiet(&artifact.file_path);
            }
        }

        self.orphans.retain(|(path, since)| {
            if expired(*since) {
                remove_file_quiet(path);
                false
            } else {
                true
            }
        });

        stale.len()
    }

    /// Tracks a file for deletion after the timeout without ever serving it.
    pub fn adopt_orphan(&mut self, path: PathBuf, now: Instant) {
        self.orphans.push((path, now));
    }

    /// Stops serving every entry; the files age out through the sweep.
    pub fn retire_all(&mut self, now: Instant) {
        debug!("Retiring {} cached images", self.entries.len());
        self.orphans
            .extend(self.entries.drain().map(|(_, artifact)| (artifact.file_path, now)));
    }

    /// Drops and deletes every artifact of `type_name`.
    pub fn drop_type(&mut self, type_name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, artifact| {
            if key.type_name() == type_name {
                remove_file_quiet(&artifact.file_path);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// Drops and deletes every artifact, including replaced ones.
    pub fn drop_all(&mut self) {
        debug!("Dropping {} cached images", self.entries.len());
        for (_, artifact) in self.entries.drain() {
            remove_file_quiet(&artifact.file_path);
        }
        for (path, _) in self.orphans.drain(..) {
            remove_file_quiet(&path);
        }
    }
}
