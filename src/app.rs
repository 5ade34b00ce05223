//! Subcommand dispatch for the `scanshot` binary.

use anyhow::{Context, Result};
use bytesize::ByteSize;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::cache::{CaptureError, CaptureKey};
use crate::cli::{
    Cli, Commands, ConfigArgs, EncodeArgs, KeyArgs, OutputFormat, PurgeArgs, ReplayArgs,
};
use crate::config::Config;
use crate::encoder::{encode_jpeg, RawFrame, JPEG_EXTENSION};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::session::{replay, ReplayReport, ScanSession, Script};

/// Run the application for parsed arguments.
///
/// # Errors
///
/// Returns an error if the configuration file is invalid or the subcommand
/// fails. [`ExitCode::for_error`] maps the error to a process exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };
    log::debug!("Effective configuration: {:?}", config);

    match cli.command {
        Commands::Key(args) => run_key(&args),
        Commands::Encode(args) => run_encode(&args),
        Commands::Replay(args) => run_replay(config, &args),
        Commands::Purge(args) => run_purge(&config, &args),
        Commands::Config(args) => run_config(&config, cli.config.as_deref(), &args),
    }
}

fn run_key(args: &KeyArgs) -> Result<ExitCode> {
    let key = match (&args.payload_file, &args.value, &args.symbology) {
        (Some(path), _, _) => {
            let payload = std::fs::read(path)
                .with_context(|| format!("Failed to read payload: {}", path.display()))?;
            CaptureKey::from_payload(&payload)
        }
        (None, Some(value), Some(symbology)) => CaptureKey::with_symbology(value, symbology),
        (None, Some(value), None) => CaptureKey::new(value),
        (None, None, _) => anyhow::bail!("A barcode value or --payload-file is required"),
    };
    println!("{}", key.to_hex());
    println!("{}", key.file_name(JPEG_EXTENSION));
    Ok(ExitCode::Success)
}

fn run_encode(args: &EncodeArgs) -> Result<ExitCode> {
    let pixels = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read frame: {}", args.input.display()))?;
    let frame = RawFrame::packed(args.format, args.width, args.height, &pixels)
        .with_context(|| format!("Invalid frame: {}", args.input.display()))?
        .with_rotation(args.rotation);
    let jpeg = encode_jpeg(&frame).context("Failed to encode frame")?;

    std::fs::write(&args.output, &jpeg)
        .with_context(|| format!("Failed to write image: {}", args.output.display()))?;
    log::info!(
        "Encoded {}x{} {} frame to {} ({})",
        args.width,
        args.height,
        args.format,
        args.output.display(),
        ByteSize(jpeg.len() as u64)
    );
    Ok(ExitCode::Success)
}

fn run_replay(mut config: Config, args: &ReplayArgs) -> Result<ExitCode> {
    let script = Script::load(&args.script)?;

    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(dir) = &args.dir {
        config.directory = Some(dir.clone());
    }
    if let Some(budget) = args.memory_budget {
        config.memory_budget = Some(budget);
    }

    let base_dir = args
        .script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let session = ScanSession::start(config.storage_policy());
    let report = replay(&session, &script, base_dir);

    if args.keep {
        let cache = session.detach();
        log::info!("Kept {} captured images ({})", cache.len(), cache.policy());
    } else {
        session
            .end()
            .context("Failed to clear captured images at end of session")?;
    }

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{}", format_report(&report)),
    }

    if report.failed_steps() > 0 {
        log::warn!("{} of {} steps failed", report.failed_steps(), report.steps.len());
        Ok(ExitCode::PartialSuccess)
    } else {
        Ok(ExitCode::Success)
    }
}

fn run_purge(config: &Config, args: &PurgeArgs) -> Result<ExitCode> {
    let dir = args.dir.clone().unwrap_or_else(|| config.image_dir());

    // A single image is addressed by its parsed key, never by a raw name.
    let target = match &args.key {
        Some(hex) => {
            let key = CaptureKey::from_hex(hex)
                .ok_or_else(|| anyhow::anyhow!("Not a capture key: '{hex}'"))?;
            dir.join(key.file_name(JPEG_EXTENSION))
        }
        None => dir,
    };

    let result = if args.key.is_some() {
        std::fs::remove_file(&target)
    } else {
        std::fs::remove_dir_all(&target)
    };
    match result {
        Ok(()) => log::info!("Removed {}", target.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("Nothing to purge at {}", target.display());
        }
        Err(source) => {
            return Err(CaptureError::Persistence {
                path: target,
                source,
            }
            .into());
        }
    }
    Ok(ExitCode::Success)
}

fn run_config(config: &Config, path: Option<&Path>, args: &ConfigArgs) -> Result<ExitCode> {
    if !args.write {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    }

    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    if path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    config.save_to(&path)?;
    log::info!("Wrote configuration to {}", path.display());
    Ok(ExitCode::Success)
}

/// Human-readable replay report.
#[must_use]
pub fn format_report(report: &ReplayReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Session {} ({}), started {}",
        report.session_id,
        report.policy,
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for step in &report.steps {
        let _ = write!(
            out,
            "{:>4}  {:<8}  {:<16}",
            step.index,
            step.action,
            step.outcome.as_str()
        );
        if let Some(value) = &step.value {
            let _ = write!(out, "  {value}");
        }
        if let Some(detail) = &step.detail {
            let _ = write!(out, "  ({detail})");
        }
        out.push('\n');
    }
    let stats = &report.stats;
    let _ = writeln!(
        out,
        "{} stored, {} already captured, {} failed, {} cleared, {} resident",
        stats.stored,
        stats.already_captured,
        report.failed_steps(),
        stats.clears,
        ByteSize(stats.resident_bytes)
    );
    out
}
