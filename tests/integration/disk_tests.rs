use super::frames::{gradient, CountingEncoder};
use image::GenericImageView;
use scanshot::cache::{CaptureCache, CaptureKey, CaptureOutcome, Reference, StoragePolicy, IMAGE_DIR_NAME};
use scanshot::encoder::{PixelFormat, RawFrame, Rotation};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_scan_session_scenario() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let encoder = Arc::new(CountingEncoder::new());
    let cache = CaptureCache::with_encoder(StoragePolicy::disk(&images), encoder.clone());

    let key = CaptureKey::new("4006381333931");
    let pixels = gradient(PixelFormat::Nv21, 640, 480);
    let frame = RawFrame::packed(PixelFormat::Nv21, 640, 480, &pixels)
        .unwrap()
        .with_rotation(Rotation::Cw90);

    let outcome = cache.try_capture(&key, &frame).unwrap();
    let Some(Reference::Path(path)) = outcome.reference().cloned() else {
        panic!("expected a file reference, got {outcome:?}");
    };
    assert_eq!(path, images.join(key.file_name("jpeg")));
    assert_eq!(file_names(&images), vec![key.file_name("jpeg")]);

    let decoded = image::open(&path).unwrap();
    assert_eq!(decoded.dimensions(), (480, 640));

    // Same barcode on the next frame
    assert_eq!(
        cache.try_capture(&key, &frame).unwrap(),
        CaptureOutcome::AlreadyCaptured
    );
    assert_eq!(encoder.calls(), 1);
    assert_eq!(cache.retrieve(&key), Some(Reference::Path(path.clone())));

    let entry = cache.entry(&key).unwrap();
    assert_eq!(entry.len, fs::metadata(&path).unwrap().len());

    cache.clear().unwrap();
    assert_eq!(cache.retrieve(&key), None);
    assert!(!images.exists());
}

#[test]
fn test_hostile_values_stay_inside_directory() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let cache = CaptureCache::new(StoragePolicy::disk(&images));
    let pixels = gradient(PixelFormat::Gray8, 8, 8);
    let frame = RawFrame::packed(PixelFormat::Gray8, 8, 8, &pixels).unwrap();

    for value in ["../../etc/passwd", "a\0b", "/abs/path", "C:\\Windows", "", "..", "\u{202e}gpj.exe"] {
        let outcome = cache.try_capture(&CaptureKey::new(value), &frame).unwrap();
        let path = outcome.reference().unwrap().as_path().unwrap().to_path_buf();
        assert_eq!(path.parent(), Some(images.as_path()), "value {value:?}");
    }

    let names = file_names(&images);
    assert_eq!(names.len(), 7);
    for name in names {
        let stem = name.strip_suffix(".jpeg").unwrap();
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_eq!(file_names(root.path()), vec![IMAGE_DIR_NAME.to_string()]);
}

#[test]
fn test_directory_created_lazily() {
    let root = tempdir().unwrap();
    let images = root.path().join("nested").join(IMAGE_DIR_NAME);
    let cache = CaptureCache::new(StoragePolicy::disk(&images));
    assert!(!images.exists());

    // Clearing a cache that never stored anything is a no-op
    cache.clear().unwrap();
    assert!(!images.exists());

    let pixels = gradient(PixelFormat::Gray8, 4, 4);
    let frame = RawFrame::packed(PixelFormat::Gray8, 4, 4, &pixels).unwrap();
    cache.try_capture(&CaptureKey::new("x"), &frame).unwrap();
    assert!(images.is_dir());
}

#[test]
fn test_clear_removes_foreign_files_too() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let cache = CaptureCache::new(StoragePolicy::disk(&images));
    let pixels = gradient(PixelFormat::Gray8, 4, 4);
    let frame = RawFrame::packed(PixelFormat::Gray8, 4, 4, &pixels).unwrap();
    cache.try_capture(&CaptureKey::new("x"), &frame).unwrap();
    fs::write(images.join("leftover.jpeg"), b"stale").unwrap();

    cache.clear().unwrap();
    assert!(!images.exists());
    assert!(cache.is_empty());
}

#[test]
fn test_unwritable_directory_is_a_persistence_error() {
    let root = tempdir().unwrap();
    // A regular file where the image directory should be
    let blocker = root.path().join(IMAGE_DIR_NAME);
    fs::write(&blocker, b"not a directory").unwrap();

    let cache = CaptureCache::new(StoragePolicy::disk(&blocker));
    let pixels = gradient(PixelFormat::Gray8, 4, 4);
    let frame = RawFrame::packed(PixelFormat::Gray8, 4, 4, &pixels).unwrap();
    let key = CaptureKey::new("x");

    let err = cache.try_capture(&key, &frame).unwrap_err();
    assert!(err.is_persistence());
    assert!(!cache.contains(&key));
    assert_eq!(cache.stats().failures, 1);
}

#[test]
fn test_disk_stats_track_file_sizes() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let cache = CaptureCache::new(StoragePolicy::disk(&images));
    let pixels = gradient(PixelFormat::I420, 32, 32);
    let frame = RawFrame::packed(PixelFormat::I420, 32, 32, &pixels).unwrap();

    cache.try_capture(&CaptureKey::new("a"), &frame).unwrap();
    cache.try_capture(&CaptureKey::new("b"), &frame).unwrap();

    let on_disk: u64 = fs::read_dir(&images)
        .unwrap()
        .map(|e| e.unwrap().metadata().unwrap().len())
        .sum();
    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.resident_bytes, on_disk);
}
