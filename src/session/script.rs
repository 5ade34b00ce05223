//! Replay scripts and replay reports.
//!
//! A script is a JSON document describing what the recognition pipeline and
//! the host would do during one session:
//!
//! ```json
//! {
//!   "version": 1,
//!   "steps": [
//!     { "capture": { "value": "4006381333931",
//!                    "frame": { "path": "frame.nv21", "format": "nv21",
//!                               "width": 640, "height": 480, "rotation": 90 } } },
//!     { "retrieve": { "value": "4006381333931" } },
//!     "clear"
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::{CacheStats, CaptureKey};
use crate::encoder::{PixelFormat, Rotation};

/// Current version of the script format.
pub const SCRIPT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SCRIPT_VERSION
}

/// A sequence of session steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default = "default_version")]
    pub version: u32,
    pub steps: Vec<Step>,
}

/// A decoded barcode as reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbology: Option<String>,
}

impl Barcode {
    #[must_use]
    pub fn key(&self) -> CaptureKey {
        match &self.symbology {
            Some(symbology) => CaptureKey::with_symbology(&self.value, symbology),
            None => CaptureKey::new(&self.value),
        }
    }
}

/// A raw frame file on disk, tightly packed in `format`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    /// Relative paths are resolved against the script's directory.
    pub path: PathBuf,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub rotation: Rotation,
}

/// Capture request: a barcode and the frame it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStep {
    #[serde(flatten)]
    pub barcode: Barcode,
    pub frame: FrameSpec,
}

/// One scripted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Capture(CaptureStep),
    Retrieve(Barcode),
    Clear,
}

impl Step {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Capture(_) => "capture",
            Self::Retrieve(_) => "retrieve",
            Self::Clear => "clear",
        }
    }
}

impl Script {
    /// Load and validate a script file.
    ///
    /// # Errors
    ///
    /// Returns an error naming `path` if the file cannot be read or fails
    /// [`from_json`](Self::from_json).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid replay script: {}", path.display()))
    }

    /// Parse and validate a script from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, an unknown step, or an
    /// unsupported `version`.
    pub fn from_json(content: &str) -> Result<Self> {
        let script: Self =
            serde_json::from_str(content).context("Failed to parse replay script")?;
        if script.version != SCRIPT_VERSION {
            anyhow::bail!(
                "Unsupported script version: {}. Current version is {}.",
                script.version,
                SCRIPT_VERSION
            );
        }
        Ok(script)
    }
}

/// What happened at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Stored,
    AlreadyCaptured,
    Found,
    Missing,
    Cleared,
    /// The frame file could not be read.
    FrameUnreadable,
    /// The frame could not be encoded.
    EncodeFailed,
    /// Writing or removing images failed.
    StorageFailed,
    /// A clear overtook the capture.
    Discarded,
}

impl StepOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::AlreadyCaptured => "already_captured",
            Self::Found => "found",
            Self::Missing => "missing",
            Self::Cleared => "cleared",
            Self::FrameUnreadable => "frame_unreadable",
            Self::EncodeFailed => "encode_failed",
            Self::StorageFailed => "storage_failed",
            Self::Discarded => "discarded",
        }
    }

    /// Whether this outcome counts as a failed step.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FrameUnreadable | Self::EncodeFailed | Self::StorageFailed | Self::Discarded
        )
    }
}

/// Report line for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of replaying a whole script.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub session_id: u64,
    pub started_at: DateTime<Utc>,
    pub policy: String,
    pub steps: Vec<StepReport>,
    pub stats: CacheStats,
}

impl ReplayReport {
    /// Number of steps that failed.
    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_failure()).count()
    }
}
