//! Storage policies and their backing stores.
//!
//! * Memory: a byte-weighted bounded cache. When full, older entries are
//!   evicted silently.
//! * Disk: one file per key inside a dedicated directory. The directory is
//!   created on first use and removed as a whole on clear.

use bytesize::ByteSize;
use directories::ProjectDirs;
use quick_cache::sync::Cache;
use quick_cache::Weighter;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::key::CaptureKey;

/// Name of the image directory under the cache root.
pub const IMAGE_DIR_NAME: &str = "barcode_images";

/// The memory budget defaults to available memory divided by this.
pub const DEFAULT_MEMORY_DIVISOR: u64 = 8;

/// Floor for memory budgets derived from the system.
pub const MIN_MEMORY_BUDGET: u64 = 4 * 1024 * 1024;

/// Typical encoded frame size, used to pre-size the memory store.
const TYPICAL_IMAGE_BYTES: u64 = 256 * 1024;

/// How captured images are held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoragePolicy {
    /// Keep encoded bytes in memory, bounded to `budget` bytes.
    Memory { budget: u64 },
    /// Persist each image as a file in `directory`.
    Disk { directory: PathBuf },
}

impl StoragePolicy {
    #[must_use]
    pub fn memory(budget: u64) -> Self {
        Self::Memory { budget }
    }

    /// Memory policy sized from the currently available system memory.
    #[must_use]
    pub fn memory_from_system(divisor: u64) -> Self {
        Self::Memory {
            budget: system_memory_budget(divisor),
        }
    }

    #[must_use]
    pub fn disk(directory: impl Into<PathBuf>) -> Self {
        Self::Disk {
            directory: directory.into(),
        }
    }

    /// Short policy name (`memory` or `disk`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::Disk { .. } => "disk",
        }
    }
}

impl fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory { budget } => write!(f, "memory ({})", ByteSize(*budget)),
            Self::Disk { directory } => write!(f, "disk ({})", directory.display()),
        }
    }
}

/// Default location of the image directory: the platform cache directory,
/// or the system temp directory when no home directory can be found.
#[must_use]
pub fn default_image_dir() -> PathBuf {
    match ProjectDirs::from("dev", "scanshot", "scanshot") {
        Some(dirs) => dirs.cache_dir().join(IMAGE_DIR_NAME),
        None => std::env::temp_dir().join("scanshot").join(IMAGE_DIR_NAME),
    }
}

/// Available memory divided by `divisor`, never below [`MIN_MEMORY_BUDGET`].
#[must_use]
pub fn system_memory_budget(divisor: u64) -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let available = system.available_memory();
    let budget = (available / divisor.max(1)).max(MIN_MEMORY_BUDGET);
    log::debug!(
        "Memory budget: {} of {} available",
        ByteSize(budget),
        ByteSize(available)
    );
    budget
}

#[derive(Clone)]
struct ImageWeighter;

impl Weighter<CaptureKey, Arc<[u8]>> for ImageWeighter {
    fn weight(&self, _: &CaptureKey, image: &Arc<[u8]>) -> u64 {
        image.len() as u64
    }
}

/// In-memory image store.
pub(crate) struct MemoryStore {
    data: Cache<CaptureKey, Arc<[u8]>, ImageWeighter>,
    budget: u64,
}

impl MemoryStore {
    pub(crate) fn new(budget: u64) -> Self {
        let estimated_items = (budget / TYPICAL_IMAGE_BYTES).clamp(16, 65_536) as usize;
        Self {
            data: Cache::with_weighter(estimated_items, budget, ImageWeighter),
            budget,
        }
    }

    pub(crate) fn insert(&self, key: CaptureKey, image: Arc<[u8]>) {
        if image.len() as u64 > self.budget {
            log::warn!(
                "Image for {} ({}) exceeds the memory budget ({}) and will not be retained",
                key,
                ByteSize(image.len() as u64),
                ByteSize(self.budget)
            );
        }
        self.data.insert(key, image);
    }

    pub(crate) fn get(&self, key: &CaptureKey) -> Option<Arc<[u8]>> {
        self.data.get(key)
    }

    pub(crate) fn clear(&self) {
        self.data.clear();
    }

    pub(crate) fn resident_bytes(&self) -> u64 {
        self.data.weight()
    }
}

/// File-per-key image store.
///
/// Writes are staged: a temp file is created inside the directory, filled,
/// synced and only then renamed to its final name. Readers therefore never
/// see a partially written image.
pub(crate) struct DiskStore {
    directory: PathBuf,
    extension: &'static str,
}

impl DiskStore {
    pub(crate) fn new(directory: PathBuf, extension: &'static str) -> Self {
        Self {
            directory,
            extension,
        }
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.directory
    }

    pub(crate) fn path_for(&self, key: &CaptureKey) -> PathBuf {
        self.directory.join(key.file_name(self.extension))
    }

    /// Create the directory if needed and open an empty staging file in it.
    pub(crate) fn stage(&self) -> io::Result<NamedTempFile> {
        std::fs::create_dir_all(&self.directory)?;
        tempfile::Builder::new()
            .prefix(".pending-")
            .suffix(&format!(".{}", self.extension))
            .tempfile_in(&self.directory)
    }

    /// Fill a staging file and flush it to stable storage.
    pub(crate) fn write(staged: &mut NamedTempFile, bytes: &[u8]) -> io::Result<()> {
        staged.write_all(bytes)?;
        staged.as_file().sync_all()
    }

    /// Move a staging file to the key's final path.
    pub(crate) fn commit(&self, staged: NamedTempFile, key: &CaptureKey) -> io::Result<PathBuf> {
        let path = self.path_for(key);
        staged.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Remove the directory and everything in it. A missing directory is fine.
    pub(crate) fn remove_all(&self) -> io::Result<()> {
        match std::fs::remove_dir_all(&self.directory) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// The store selected by a [`StoragePolicy`].
pub(crate) enum Backend {
    Memory(MemoryStore),
    Disk(DiskStore),
}

impl Backend {
    pub(crate) fn new(policy: &StoragePolicy, extension: &'static str) -> Self {
        match policy {
            StoragePolicy::Memory { budget } => Self::Memory(MemoryStore::new(*budget)),
            StoragePolicy::Disk { directory } => {
                Self::Disk(DiskStore::new(directory.clone(), extension))
            }
        }
    }
}
