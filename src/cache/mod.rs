//! Captured-image cache.
//!
//! When a barcode is recognized, the frame that produced it can be kept so
//! the host application can later show the user what was scanned. This
//! module stores at most one image per decoded value for the life of a
//! scanning session.
//!
//! # Architecture
//!
//! * [`key`]: derives path-safe [`CaptureKey`]s from decoded values.
//! * [`entry`]: entry metadata, references handed to the host, capture outcomes.
//! * [`storage`]: the memory and disk storage policies.
//! * [`store`]: [`CaptureCache`], the deduplicating front end.
//!
//! # Deduplication
//!
//! A barcode that stays in view is detected on every frame. Only the first
//! detection is encoded and stored; later ones return
//! [`CaptureOutcome::AlreadyCaptured`] without touching the encoder or the
//! storage. The stored image is never replaced until [`CaptureCache::clear`].
//!
//! # Example
//!
//! ```no_run
//! use scanshot::cache::{CaptureCache, CaptureKey, StoragePolicy};
//! use scanshot::encoder::{PixelFormat, RawFrame};
//!
//! let cache = CaptureCache::new(StoragePolicy::disk("/tmp/barcode_images"));
//! let pixels = vec![0u8; PixelFormat::Nv21.packed_len(640, 480).unwrap()];
//! let frame = RawFrame::packed(PixelFormat::Nv21, 640, 480, &pixels).unwrap();
//!
//! let key = CaptureKey::new("4006381333931");
//! cache.try_capture(&key, &frame).unwrap();
//! if let Some(reference) = cache.retrieve(&key) {
//!     println!("{}", reference.describe());
//! }
//! cache.clear().unwrap();
//! ```

pub mod entry;
pub mod key;
pub mod storage;
pub mod store;

pub use entry::{CacheEntry, CacheStats, CaptureOutcome, Location, Reference};
pub use key::CaptureKey;
pub use storage::{default_image_dir, StoragePolicy, IMAGE_DIR_NAME};
pub use store::{CaptureCache, CaptureError, CaptureResult};
