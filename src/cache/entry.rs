//! Cache entry and reference types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::key::CaptureKey;

/// Where a captured image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Held by the in-memory store (and subject to eviction).
    Memory,
    /// Persisted to this file.
    Disk(PathBuf),
}

/// Metadata for one captured image.
///
/// Created once per key when the image is first stored and never modified
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CaptureKey,
    pub location: Location,
    /// Encoded size in bytes.
    pub len: u64,
    pub captured_at: DateTime<Utc>,
}

impl CacheEntry {
    pub(crate) fn new(key: CaptureKey, location: Location, len: u64) -> Self {
        Self {
            key,
            location,
            len,
            captured_at: Utc::now(),
        }
    }
}

/// Handle to a stored image, as returned to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// The encoded bytes themselves (memory policy).
    Bytes(Arc<[u8]>),
    /// Path to the persisted file (disk policy).
    Path(PathBuf),
}

impl Reference {
    /// Dereference to the encoded bytes, reading the file for path references.
    pub fn read_bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Path(path) => std::fs::read(path).map(Cow::Owned),
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Bytes(_) => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Path(_) => None,
        }
    }

    /// Short human-readable description, used in reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes(bytes) => format!("{} bytes in memory", bytes.len()),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// Result of a capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// An image for this key already exists (or is being stored); nothing was done.
    AlreadyCaptured,
    /// The frame was encoded and stored.
    Stored(Reference),
}

impl CaptureOutcome {
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }

    #[must_use]
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Self::Stored(reference) => Some(reference),
            Self::AlreadyCaptured => None,
        }
    }
}

/// Counters describing a cache's activity since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Keys with a stored image.
    pub entries: usize,
    /// Keys whose capture is still in flight.
    pub pending: usize,
    /// Successful captures.
    pub stored: u64,
    /// Capture attempts skipped because the key was already present.
    pub already_captured: u64,
    /// Captures that failed to encode or persist.
    pub failures: u64,
    /// Number of `clear` calls.
    pub clears: u64,
    /// Bytes currently held (resident in memory, or on disk for this session).
    pub resident_bytes: u64,
}
