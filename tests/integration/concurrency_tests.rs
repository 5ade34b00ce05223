use super::frames::{gradient, CountingEncoder};
use rayon::prelude::*;
use scanshot::cache::{CaptureCache, CaptureError, CaptureKey, CaptureOutcome, StoragePolicy, IMAGE_DIR_NAME};
use scanshot::encoder::{PixelFormat, RawFrame};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const THREADS: usize = 16;

#[test]
fn test_concurrent_same_key_stores_once() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let encoder = Arc::new(CountingEncoder::slow(Duration::from_millis(50)));
    let cache = CaptureCache::with_encoder(StoragePolicy::disk(&images), encoder.clone());
    let key = CaptureKey::new("4006381333931");
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<CaptureOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = &cache;
                let barrier = &barrier;
                s.spawn(move || {
                    let pixels = vec![(i * 10) as u8; 32 * 32];
                    let frame = RawFrame::packed(PixelFormat::Gray8, 32, 32, &pixels).unwrap();
                    barrier.wait();
                    cache.try_capture(&key, &frame).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = outcomes.iter().filter(|o| o.is_stored()).count();
    let skipped = outcomes
        .iter()
        .filter(|o| **o == CaptureOutcome::AlreadyCaptured)
        .count();
    assert_eq!(stored, 1);
    assert_eq!(skipped, THREADS - 1);
    assert_eq!(encoder.calls(), 1);
    assert_eq!(std::fs::read_dir(&images).unwrap().count(), 1);
}

#[test]
fn test_distinct_keys_capture_in_parallel() {
    let cache = CaptureCache::new(StoragePolicy::memory(64 * 1024 * 1024));
    let pixels = gradient(PixelFormat::I420, 64, 48);

    let stored = (0..64)
        .into_par_iter()
        .filter(|i| {
            let frame = RawFrame::packed(PixelFormat::I420, 64, 48, &pixels).unwrap();
            cache
                .try_capture(&CaptureKey::new(&format!("code-{i}")), &frame)
                .unwrap()
                .is_stored()
        })
        .count();

    assert_eq!(stored, 64);
    assert_eq!(cache.len(), 64);
}

#[test]
fn test_encodes_do_not_serialize_across_keys() {
    let delay = Duration::from_millis(200);
    let encoder = Arc::new(CountingEncoder::slow(delay));
    let cache = CaptureCache::with_encoder(StoragePolicy::memory(8 * 1024 * 1024), encoder);
    let pixels = gradient(PixelFormat::Gray8, 8, 8);
    let barrier = Barrier::new(4);

    let started = Instant::now();
    thread::scope(|s| {
        for i in 0..4 {
            let (cache, pixels, barrier) = (&cache, &pixels, &barrier);
            s.spawn(move || {
                let frame = RawFrame::packed(PixelFormat::Gray8, 8, 8, pixels).unwrap();
                barrier.wait();
                cache.try_capture(&CaptureKey::new(&i.to_string()), &frame).unwrap();
            });
        }
    });

    // Four serialized encodes would take at least 800ms
    assert!(started.elapsed() < delay * 3);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_clear_discards_in_flight_capture() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let encoder = Arc::new(CountingEncoder::slow(Duration::from_millis(300)));
    let cache = CaptureCache::with_encoder(StoragePolicy::disk(&images), encoder);
    let key = CaptureKey::new("in-flight");
    let pixels = gradient(PixelFormat::Gray8, 16, 16);

    let result = thread::scope(|s| {
        let handle = s.spawn(|| {
            let frame = RawFrame::packed(PixelFormat::Gray8, 16, 16, &pixels).unwrap();
            cache.try_capture(&key, &frame)
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.stats().pending == 0 {
            assert!(Instant::now() < deadline, "capture never started");
            thread::sleep(Duration::from_millis(5));
        }
        cache.clear().unwrap();
        handle.join().unwrap()
    });

    assert!(matches!(result, Err(CaptureError::Cleared)));
    assert!(!cache.contains(&key));
    assert!(!images.exists());

    // The key can be captured again in the new generation
    let frame = RawFrame::packed(PixelFormat::Gray8, 16, 16, &pixels).unwrap();
    assert!(cache.try_capture(&key, &frame).unwrap().is_stored());
}

#[test]
fn test_clear_concurrent_with_captures_leaves_consistent_state() {
    let root = tempdir().unwrap();
    let images = root.path().join(IMAGE_DIR_NAME);
    let cache = CaptureCache::new(StoragePolicy::disk(&images));
    let pixels = gradient(PixelFormat::Gray8, 16, 16);

    thread::scope(|s| {
        for t in 0..4 {
            let (cache, pixels) = (&cache, &pixels);
            s.spawn(move || {
                for i in 0..25 {
                    let frame = RawFrame::packed(PixelFormat::Gray8, 16, 16, pixels).unwrap();
                    match cache.try_capture(&CaptureKey::new(&format!("{t}-{i}")), &frame) {
                        Ok(_) | Err(CaptureError::Cleared) => {}
                        Err(e) => panic!("unexpected capture error: {e}"),
                    }
                }
            });
        }
        s.spawn(|| {
            for _ in 0..10 {
                cache.clear().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });
    });

    // Every registered entry points at a file that exists
    let mut registered = 0;
    for t in 0..4 {
        for i in 0..25 {
            if let Some(reference) = cache.retrieve(&CaptureKey::new(&format!("{t}-{i}"))) {
                assert!(reference.as_path().unwrap().is_file());
                registered += 1;
            }
        }
    }
    assert_eq!(registered, cache.len());

    cache.clear().unwrap();
    assert!(cache.is_empty());
    assert!(!images.exists());
}
