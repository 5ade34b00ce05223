//! The capture cache.

use bytesize::ByteSize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::entry::{CacheEntry, CacheStats, CaptureOutcome, Location, Reference};
use super::key::CaptureKey;
use super::storage::{Backend, DiskStore, StoragePolicy};
use crate::encoder::{EncodeError, FrameEncoder, JpegFrameEncoder, RawFrame};

/// Errors that can occur while capturing or clearing.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// The frame could not be encoded ("bad frame").
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] EncodeError),

    /// The image could not be written or removed ("storage unavailable").
    #[error("Storage error at {path}: {source}")]
    Persistence {
        /// File or directory involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The cache was cleared while this capture was in flight; its result
    /// was discarded.
    #[error("Cache was cleared while the capture was in flight")]
    Cleared,
}

impl CaptureError {
    #[must_use]
    pub fn is_encode(&self) -> bool {
        matches!(self, Self::Encode(_))
    }

    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

/// Result type for capture cache operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

enum Slot {
    /// Reserved by a capture that is still encoding or writing.
    Pending,
    Ready(CacheEntry),
}

struct Table {
    /// Bumped by every clear; captures reserved under an older generation
    /// are not allowed to register.
    generation: u64,
    slots: HashMap<CaptureKey, Slot>,
}

#[derive(Default)]
struct Counters {
    stored: AtomicU64,
    already_captured: AtomicU64,
    failures: AtomicU64,
    clears: AtomicU64,
}

/// Deduplicating store of captured barcode images for one scanning session.
///
/// Share it between the frame-producing path and the host's query path with
/// an `Arc`. All methods take `&self`.
///
/// Locking: a single mutex guards the lookup table, the clear generation and
/// directory-level operations (creating the directory, creating a staging
/// file, renaming into place, removing the directory). Encoding and writing
/// image bytes happen outside the lock, so captures for distinct keys do not
/// wait on each other's encode.
pub struct CaptureCache {
    table: Mutex<Table>,
    backend: Backend,
    policy: StoragePolicy,
    encoder: Arc<dyn FrameEncoder>,
    counters: Counters,
}

impl std::fmt::Debug for CaptureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCache")
            .field("policy", &self.policy)
            .field("entries", &self.len())
            .finish()
    }
}

impl CaptureCache {
    /// Create a cache that encodes frames as JPEG.
    #[must_use]
    pub fn new(policy: StoragePolicy) -> Self {
        Self::with_encoder(policy, Arc::new(JpegFrameEncoder))
    }

    /// Create a cache with a custom frame encoder.
    #[must_use]
    pub fn with_encoder(policy: StoragePolicy, encoder: Arc<dyn FrameEncoder>) -> Self {
        log::debug!("Creating capture cache with {} storage", policy);
        Self {
            table: Mutex::new(Table {
                generation: 0,
                slots: HashMap::new(),
            }),
            backend: Backend::new(&policy, encoder.extension()),
            policy,
            encoder,
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &StoragePolicy {
        &self.policy
    }

    /// Capture the image for `key`, unless one was already captured.
    ///
    /// Returns [`CaptureOutcome::AlreadyCaptured`] without encoding or doing
    /// any I/O when the key is present or another capture for it is in
    /// flight. Otherwise encodes the frame, persists the bytes and registers
    /// the entry, in that order; the entry only becomes visible to
    /// [`retrieve`](Self::retrieve) once the bytes are fully stored.
    ///
    /// A failed capture leaves no entry behind, so a later frame for the same
    /// key may try again.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Encode`] if the frame geometry is inconsistent or the
    ///   encoder fails. Nothing is written.
    /// - [`CaptureError::Persistence`] if the image file cannot be written
    ///   (disk policy).
    /// - [`CaptureError::Cleared`] if [`clear`](Self::clear) ran while this
    ///   capture was encoding or writing. Its bytes are discarded.
    ///
    /// # Example
    ///
    /// ```
    /// use scanshot::cache::{CaptureCache, CaptureKey, StoragePolicy};
    /// use scanshot::encoder::{PixelFormat, RawFrame};
    ///
    /// let cache = CaptureCache::new(StoragePolicy::memory(8 * 1024 * 1024));
    /// let pixels = vec![128u8; 16 * 16];
    /// let frame = RawFrame::packed(PixelFormat::Gray8, 16, 16, &pixels).unwrap();
    /// let key = CaptureKey::new("4006381333931");
    ///
    /// assert!(cache.try_capture(&key, &frame).unwrap().is_stored());
    /// assert!(!cache.try_capture(&key, &frame).unwrap().is_stored());
    /// ```
    pub fn try_capture(
        &self,
        key: &CaptureKey,
        frame: &RawFrame<'_>,
    ) -> CaptureResult<CaptureOutcome> {
        let Some(generation) = self.reserve(key) else {
            self.counters.already_captured.fetch_add(1, Ordering::Relaxed);
            log::trace!("{} already captured, skipping frame", key);
            return Ok(CaptureOutcome::AlreadyCaptured);
        };

        match self.encode_and_store(key, frame, generation) {
            Ok(reference) => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
                log::info!("Captured image for {}: {}", key, reference.describe());
                Ok(CaptureOutcome::Stored(reference))
            }
            Err(e) => {
                self.release(key, generation);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Capture for {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    /// Look up the stored image for `key`.
    ///
    /// Returns `None` if the key was never captured, its capture is still in
    /// flight, or (memory policy) its bytes were evicted.
    #[must_use]
    pub fn retrieve(&self, key: &CaptureKey) -> Option<Reference> {
        let table = self.lock();
        let Some(Slot::Ready(entry)) = table.slots.get(key) else {
            return None;
        };
        match (&entry.location, &self.backend) {
            (Location::Disk(path), _) => Some(Reference::Path(path.clone())),
            (Location::Memory, Backend::Memory(store)) => {
                let bytes = store.get(key);
                if bytes.is_none() {
                    log::debug!("Image for {} was evicted from memory", key);
                }
                bytes.map(Reference::Bytes)
            }
            (Location::Memory, Backend::Disk(_)) => None,
        }
    }

    /// Remove every captured image and entry.
    ///
    /// Captures in flight when this is called will not register. The lookup
    /// table is emptied even when removing the directory fails; the error is
    /// still returned.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Persistence`] if the image directory exists
    /// but cannot be removed (disk policy). A missing directory is not an
    /// error. The memory policy never fails.
    pub fn clear(&self) -> CaptureResult<()> {
        let mut table = self.lock();
        table.generation += 1;
        let dropped = table.slots.len();
        table.slots.clear();
        self.counters.clears.fetch_add(1, Ordering::Relaxed);

        let result = match &self.backend {
            Backend::Memory(store) => {
                store.clear();
                Ok(())
            }
            Backend::Disk(store) => store
                .remove_all()
                .map_err(|source| CaptureError::Persistence {
                    path: store.directory().to_path_buf(),
                    source,
                }),
        };
        drop(table);

        match &result {
            Ok(()) => log::debug!("Cleared capture cache ({} entries)", dropped),
            Err(e) => log::warn!("Capture cache cleared with errors: {}", e),
        }
        result
    }

    /// Whether an image is stored for `key` (in-flight captures excluded).
    #[must_use]
    pub fn contains(&self, key: &CaptureKey) -> bool {
        matches!(self.lock().slots.get(key), Some(Slot::Ready(_)))
    }

    /// Metadata of the stored entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &CaptureKey) -> Option<CacheEntry> {
        match self.lock().slots.get(key) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let table = self.lock();
        let mut stats = CacheStats {
            stored: self.counters.stored.load(Ordering::Relaxed),
            already_captured: self.counters.already_captured.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            clears: self.counters.clears.load(Ordering::Relaxed),
            ..Default::default()
        };
        let mut disk_bytes = 0;
        for slot in table.slots.values() {
            match slot {
                Slot::Pending => stats.pending += 1,
                Slot::Ready(entry) => {
                    stats.entries += 1;
                    disk_bytes += entry.len;
                }
            }
        }
        stats.resident_bytes = match &self.backend {
            Backend::Memory(store) => store.resident_bytes(),
            Backend::Disk(_) => disk_bytes,
        };
        stats
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // The table holds no invariant a panicking holder could break halfway
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically check for `key` and reserve it. Returns the generation the
    /// reservation belongs to, or `None` if the key is taken.
    fn reserve(&self, key: &CaptureKey) -> Option<u64> {
        let mut table = self.lock();
        let generation = table.generation;
        match table.slots.entry(*key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Slot::Pending);
                Some(generation)
            }
        }
    }

    /// Drop a reservation after a failed capture.
    fn release(&self, key: &CaptureKey, generation: u64) {
        let mut table = self.lock();
        if table.generation == generation {
            if let Entry::Occupied(slot) = table.slots.entry(*key) {
                if matches!(slot.get(), Slot::Pending) {
                    slot.remove();
                }
            }
        }
    }

    /// Publish a finished entry if no clear happened since the reservation.
    fn register(table: &mut Table, generation: u64, entry: CacheEntry) -> CaptureResult<()> {
        if table.generation != generation {
            return Err(CaptureError::Cleared);
        }
        table.slots.insert(entry.key, Slot::Ready(entry));
        Ok(())
    }

    fn encode_and_store(
        &self,
        key: &CaptureKey,
        frame: &RawFrame<'_>,
        generation: u64,
    ) -> CaptureResult<Reference> {
        let bytes = self.encoder.encode(frame)?;
        let len = bytes.len() as u64;
        log::debug!("Encoded frame for {} ({})", key, ByteSize(len));

        match &self.backend {
            Backend::Memory(store) => {
                let bytes: Arc<[u8]> = Arc::from(bytes);
                let mut table = self.lock();
                Self::register(
                    &mut table,
                    generation,
                    CacheEntry::new(*key, Location::Memory, len),
                )?;
                store.insert(*key, Arc::clone(&bytes));
                Ok(Reference::Bytes(bytes))
            }
            Backend::Disk(store) => {
                let persistence = |source| CaptureError::Persistence {
                    path: store.path_for(key),
                    source,
                };

                let mut staged = {
                    let table = self.lock();
                    if table.generation != generation {
                        return Err(CaptureError::Cleared);
                    }
                    store.stage().map_err(|source| CaptureError::Persistence {
                        path: store.directory().to_path_buf(),
                        source,
                    })?
                };

                DiskStore::write(&mut staged, &bytes).map_err(persistence)?;

                let mut table = self.lock();
                if table.generation != generation {
                    // The staging file went away with the directory; dropping
                    // the handle unlinks whatever is left of it.
                    return Err(CaptureError::Cleared);
                }
                let path = store.commit(staged, key).map_err(persistence)?;
                Self::register(
                    &mut table,
                    generation,
                    CacheEntry::new(*key, Location::Disk(path.clone()), len),
                )?;
                Ok(Reference::Path(path))
            }
        }
    }
}
