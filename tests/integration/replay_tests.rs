use super::frames::gradient;
use clap::Parser;
use scanshot::cache::{StoragePolicy, IMAGE_DIR_NAME};
use scanshot::cli::Cli;
use scanshot::encoder::PixelFormat;
use scanshot::error::ExitCode;
use scanshot::session::{replay, ScanSession, Script, StepOutcome};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SESSION: &str = r#"{
    "version": 1,
    "steps": [
        { "capture": { "value": "4006381333931",
                       "frame": { "path": "frames/first.nv21", "format": "nv21",
                                  "width": 640, "height": 480, "rotation": 90 } } },
        { "capture": { "value": "4006381333931",
                       "frame": { "path": "frames/second.nv21", "format": "nv21",
                                  "width": 640, "height": 480, "rotation": 90 } } },
        { "capture": { "value": "https://example.com/item/42", "symbology": "qr",
                       "frame": { "path": "frames/second.nv21", "format": "nv21",
                                  "width": 640, "height": 480 } } },
        { "retrieve": { "value": "4006381333931" } },
        { "retrieve": { "value": "https://example.com/item/42" } },
        "clear",
        { "retrieve": { "value": "4006381333931" } }
    ]
}"#;

fn write_session(dir: &Path) -> std::path::PathBuf {
    fs::create_dir_all(dir.join("frames")).unwrap();
    let pixels = gradient(PixelFormat::Nv21, 640, 480);
    fs::write(dir.join("frames/first.nv21"), &pixels).unwrap();
    fs::write(dir.join("frames/second.nv21"), &pixels).unwrap();
    let script = dir.join("session.json");
    fs::write(&script, SESSION).unwrap();
    script
}

#[test]
fn test_replay_session_against_disk_cache() {
    let dir = tempdir().unwrap();
    let script_path = write_session(dir.path());
    let images = dir.path().join(IMAGE_DIR_NAME);

    let script = Script::load(&script_path).unwrap();
    let session = ScanSession::start(StoragePolicy::disk(&images));
    let report = replay(&session, &script, dir.path());

    let outcomes: Vec<_> = report.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Stored,
            StepOutcome::AlreadyCaptured,
            StepOutcome::Stored,
            StepOutcome::Found,
            // The retrieve carries no symbology, so it names a different key
            StepOutcome::Missing,
            StepOutcome::Cleared,
            StepOutcome::Missing,
        ]
    );
    assert_eq!(report.stats.stored, 2);
    assert_eq!(report.stats.already_captured, 1);
    assert_eq!(report.stats.clears, 1);
    assert!(report.policy.starts_with("disk"));
    assert!(!images.exists());

    let found = report.steps[3].detail.as_deref().unwrap();
    assert!(found.ends_with(".jpeg"));
    assert_eq!(report.steps[0].key, report.steps[3].key);

    session.end().unwrap();
}

#[test]
fn test_replay_report_serializes() {
    let dir = tempdir().unwrap();
    let script_path = write_session(dir.path());
    let script = Script::load(&script_path).unwrap();
    let session = ScanSession::start(StoragePolicy::memory(16 * 1024 * 1024));
    let report = replay(&session, &script, dir.path());

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["session_id"], session.id());
    assert_eq!(json["steps"][1]["outcome"], "already_captured");
    assert_eq!(json["steps"][5]["action"], "clear");
    assert_eq!(json["stats"]["stored"], 2);
}

#[test]
fn test_load_rejects_malformed_script() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"steps\": [ { \"teleport\": {} } ] }").unwrap();

    let err = Script::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));
    assert!(Script::load(&dir.path().join("absent.json")).is_err());
}

#[test]
fn test_run_app_replay_end_to_end() {
    let dir = tempdir().unwrap();
    let script_path = write_session(dir.path());
    let config_path = dir.path().join("no-config.toml");

    let cli = Cli::try_parse_from([
        "scanshot",
        "-q",
        "--config",
        config_path.to_str().unwrap(),
        "replay",
        script_path.to_str().unwrap(),
        "--policy",
        "memory",
        "--memory-budget",
        "16MiB",
        "--output",
        "json",
    ])
    .unwrap();

    assert_eq!(scanshot::run_app(cli).unwrap(), ExitCode::Success);
}

#[test]
fn test_run_app_encode_writes_jpeg() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("frame.i420");
    let out = dir.path().join("frame.jpeg");
    fs::write(&raw, gradient(PixelFormat::I420, 64, 48)).unwrap();

    let cli = Cli::try_parse_from([
        "scanshot",
        "-q",
        "--config",
        dir.path().join("no-config.toml").to_str().unwrap(),
        "encode",
        raw.to_str().unwrap(),
        "--format",
        "i420",
        "--width",
        "64",
        "--height",
        "48",
        "--rotation",
        "180",
        "-o",
        out.to_str().unwrap(),
    ])
    .unwrap();

    assert_eq!(scanshot::run_app(cli).unwrap(), ExitCode::Success);
    let bytes = fs::read(&out).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_run_app_encode_short_buffer_maps_to_encode_failure() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("frame.nv12");
    fs::write(&raw, [0u8; 100]).unwrap();

    let cli = Cli::try_parse_from([
        "scanshot",
        "-q",
        "--config",
        dir.path().join("no-config.toml").to_str().unwrap(),
        "encode",
        raw.to_str().unwrap(),
        "--format",
        "nv12",
        "--width",
        "64",
        "--height",
        "48",
        "-o",
        dir.path().join("out.jpeg").to_str().unwrap(),
    ])
    .unwrap();

    let err = scanshot::run_app(cli).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::EncodeFailed);
}
