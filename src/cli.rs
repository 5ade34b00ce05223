//! Command-line interface definitions for scanshot.
//!
//! All arguments and subcommands use the clap derive API. Global options
//! (verbosity, config file, error format) apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Show the cache key and file name for a decoded value
//! scanshot key 4006381333931 --symbology ean13
//!
//! # Encode a raw NV21 camera frame, rotated for a portrait sensor
//! scanshot encode frame.nv21 --format nv21 --width 640 --height 480 --rotation 90 -o out.jpeg
//!
//! # Replay a scanning session against an in-memory cache
//! scanshot replay session.json --policy memory --memory-budget 64MiB --output json
//!
//! # Remove images left behind by an earlier run
//! scanshot -v purge
//!
//! # Write the effective configuration to the config file
//! scanshot config --write
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::encoder::{PixelFormat, Rotation};

/// Capture cache for barcode scanning sessions.
///
/// scanshot keeps one JPEG per decoded barcode value, encoding each raw
/// camera frame at most once per session.
#[derive(Debug, Parser)]
#[command(name = "scanshot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH", global = true, env = "SCANSHOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the cache key and image file name for a barcode value
    Key(KeyArgs),
    /// Encode a packed raw frame file to JPEG
    Encode(EncodeArgs),
    /// Run a scripted scanning session against one cache
    Replay(ReplayArgs),
    /// Remove a disk image directory left by an earlier run
    Purge(PurgeArgs),
    /// Show the effective configuration, or write it to the config file
    Config(ConfigArgs),
}

/// Arguments for the key subcommand.
#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Decoded barcode value
    #[arg(value_name = "VALUE", required_unless_present = "payload_file")]
    pub value: Option<String>,

    /// Barcode symbology (e.g. ean13, qr). Different symbologies get different keys.
    #[arg(long, value_name = "NAME", conflicts_with = "payload_file")]
    pub symbology: Option<String>,

    /// Read a raw binary payload from a file instead of VALUE
    #[arg(long, value_name = "PATH", conflicts_with = "value")]
    pub payload_file: Option<PathBuf>,
}

/// Arguments for the encode subcommand.
#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Raw frame file, tightly packed
    #[arg(value_name = "RAW")]
    pub input: PathBuf,

    /// Pixel format (i420, yv12, nv12, nv21, gray8, rgb8, rgba8)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: PixelFormat,

    /// Frame width in pixels
    #[arg(long, value_name = "PIXELS")]
    pub width: u32,

    /// Frame height in pixels
    #[arg(long, value_name = "PIXELS")]
    pub height: u32,

    /// Clockwise rotation in degrees (0, 90, 180, 270)
    #[arg(short, long, value_name = "DEGREES", default_value = "0", value_parser = parse_rotation)]
    pub rotation: Rotation,

    /// Output JPEG path
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,
}

/// Arguments for the replay subcommand.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Replay script (JSON)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Storage policy, overriding the configuration
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Image directory for the disk policy
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Memory budget for the memory policy (e.g. 64MiB, 100MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub memory_budget: Option<u64>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Leave captured images in place instead of clearing them at the end
    #[arg(long)]
    pub keep: bool,
}

/// Arguments for the purge subcommand.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Image directory to remove (defaults to the configured directory)
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Remove only the image stored under this key (64 hex characters)
    #[arg(long, value_name = "HEX")]
    pub key: Option<String>,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to the config file
    #[arg(long)]
    pub write: bool,

    /// Overwrite an existing config file
    #[arg(long, requires = "write")]
    pub force: bool,
}

/// Storage policy selector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PolicyArg {
    /// Bounded in-memory cache
    Memory,
    /// One file per key in an image directory
    #[default]
    Disk,
}

impl std::fmt::Display for PolicyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyArg::Memory => write!(f, "memory"),
            PolicyArg::Disk => write!(f, "disk"),
        }
    }
}

/// Report format for replay results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Accepts plain byte counts and SI or binary suffixes, case-insensitive.
///
/// # Examples
///
/// ```
/// use scanshot::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("64 MiB").unwrap(), 64 * 1024 * 1024);
/// ```
///
/// # Errors
///
/// Returns an error for empty input, zero, or an unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    let size: bytesize::ByteSize = s.parse().map_err(|e| format!("Invalid size '{s}': {e}"))?;
    if size.as_u64() == 0 {
        return Err("Size must be greater than zero".to_string());
    }
    Ok(size.as_u64())
}

/// Parse a rotation in degrees.
///
/// # Errors
///
/// Returns an error unless the value is 0, 90, 180 or 270.
pub fn parse_rotation(s: &str) -> Result<Rotation, String> {
    let degrees: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid rotation: '{s}'"))?;
    Rotation::try_from(degrees).map_err(|e| e.to_string())
}
