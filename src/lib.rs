//! scanshot - capture cache for barcode scanning sessions
//!
//! While a camera stream is being scanned, the recognizer reports the same
//! barcode on many consecutive frames. scanshot keeps exactly one JPEG per
//! decoded value: the first frame that produced it is encoded and stored,
//! later detections of the same value are skipped without touching the
//! encoder, and everything is dropped when the session ends.
//!
//! * [`encoder`]: raw camera frames (YUV 4:2:0, grayscale, RGB) to JPEG.
//! * [`cache`]: keys, storage policies and the concurrent [`cache::CaptureCache`].
//! * [`session`]: scanning sessions and scripted replays.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod session;

pub use app::run_app;
