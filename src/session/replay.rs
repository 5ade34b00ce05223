//! Replaying a script against a scanning session.

use std::path::Path;

use super::script::{CaptureStep, ReplayReport, Script, Step, StepOutcome, StepReport};
use super::ScanSession;
use crate::cache::{CaptureCache, CaptureError, CaptureOutcome};
use crate::encoder::RawFrame;

/// Run every step of `script` against `session`'s cache.
///
/// Step failures are recorded in the report rather than aborting the replay,
/// the same way a recognition pipeline keeps running when a capture fails.
/// Relative frame paths are resolved against `base_dir`.
#[must_use]
pub fn replay(session: &ScanSession, script: &Script, base_dir: &Path) -> ReplayReport {
    let cache = session.cache();
    log::info!(
        "Replaying {} steps in session {}",
        script.steps.len(),
        session.id()
    );

    let steps = script
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let report = run_step(&cache, index, step, base_dir);
            log::debug!("Step {} ({}): {:?}", index, report.action, report.outcome);
            report
        })
        .collect();

    ReplayReport {
        session_id: session.id(),
        started_at: session.started_at(),
        policy: cache.policy().to_string(),
        steps,
        stats: cache.stats(),
    }
}

fn run_step(cache: &CaptureCache, index: usize, step: &Step, base_dir: &Path) -> StepReport {
    let mut report = StepReport {
        index,
        action: step.action(),
        value: None,
        key: None,
        outcome: StepOutcome::Cleared,
        detail: None,
    };

    match step {
        Step::Capture(capture) => {
            report.value = Some(capture.barcode.value.clone());
            report.key = Some(capture.barcode.key().to_hex());
            let (outcome, detail) = run_capture(cache, capture, base_dir);
            report.outcome = outcome;
            report.detail = detail;
        }
        Step::Retrieve(barcode) => {
            let key = barcode.key();
            report.value = Some(barcode.value.clone());
            report.key = Some(key.to_hex());
            match cache.retrieve(&key) {
                Some(reference) => {
                    report.outcome = StepOutcome::Found;
                    report.detail = Some(reference.describe());
                }
                None => report.outcome = StepOutcome::Missing,
            }
        }
        Step::Clear => {
            if let Err(e) = cache.clear() {
                report.outcome = StepOutcome::StorageFailed;
                report.detail = Some(e.to_string());
            }
        }
    }
    report
}

fn run_capture(
    cache: &CaptureCache,
    capture: &CaptureStep,
    base_dir: &Path,
) -> (StepOutcome, Option<String>) {
    let spec = &capture.frame;
    let path = base_dir.join(&spec.path);
    let pixels = match std::fs::read(&path) {
        Ok(pixels) => pixels,
        Err(e) => {
            return (
                StepOutcome::FrameUnreadable,
                Some(format!("{}: {}", path.display(), e)),
            )
        }
    };

    let frame = match RawFrame::packed(spec.format, spec.width, spec.height, &pixels) {
        Ok(frame) => frame.with_rotation(spec.rotation),
        Err(e) => return (StepOutcome::EncodeFailed, Some(e.to_string())),
    };

    match cache.try_capture(&capture.barcode.key(), &frame) {
        Ok(CaptureOutcome::Stored(reference)) => (StepOutcome::Stored, Some(reference.describe())),
        Ok(CaptureOutcome::AlreadyCaptured) => (StepOutcome::AlreadyCaptured, None),
        Err(e) => {
            let outcome = match e {
                CaptureError::Encode(_) => StepOutcome::EncodeFailed,
                CaptureError::Persistence { .. } => StepOutcome::StorageFailed,
                CaptureError::Cleared => StepOutcome::Discarded,
            };
            (outcome, Some(e.to_string()))
        }
    }
}
