//! Dump command implementation.

use anyhow::{Context, Result};
use blockdump::{
    BlockTransfer, NativePort, SerialConfig, TransferConfig, TransferEvent, detect_ports,
    format_port_list,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, EXIT_INTERRUPTED, get_baud, get_port, use_fancy_output};

/// Output file used when none is configured.
pub(crate) const DEFAULT_OUTPUT: &str = "output/output.txt";

/// Dump options given on the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct DumpOptions {
    pub(crate) blocks: Option<u32>,
    pub(crate) output: Option<PathBuf>,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) max_failures: Option<u32>,
}

/// Combine command-line options, configuration and defaults.
pub(crate) fn transfer_config(options: &DumpOptions, config: &Config) -> TransferConfig {
    let mut transfer = TransferConfig::default();
    if let Some(blocks) = options
        .blocks
        .or(config
            .transfer
            .blocks)
    {
        transfer = transfer.with_total_blocks(blocks);
    }
    if let Some(ms) = options
        .timeout_ms
        .or(config
            .transfer
            .attempt_timeout_ms)
    {
        transfer = transfer.with_attempt_timeout(Duration::from_millis(ms));
    }
    if let Some(max) = options
        .max_failures
        .or(config
            .transfer
            .max_failures)
    {
        transfer = transfer.with_max_consecutive_failures(max);
    }
    transfer
}

/// Output path from the command line, the configuration, or the default.
pub(crate) fn output_path(options: &DumpOptions, config: &Config) -> PathBuf {
    options
        .output
        .clone()
        .or_else(|| {
            config
                .transfer
                .output
                .clone()
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
}

/// Reject an output path that can never be a file.
fn check_output_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(CliError::Usage(format!(
            "output path {} is a directory",
            path.display()
        ))
        .into());
    }
    Ok(())
}

/// Create (truncate) the output file, creating its parent directory if needed.
fn open_output(path: &Path) -> Result<File> {
    check_output_path(path)?;
    if let Some(parent) = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

fn progress_bar(cli: &Cli, total: u32) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(u64::from(total));
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Dump command implementation.
pub(crate) fn cmd_dump(cli: &Cli, config: &Config, options: &DumpOptions) -> Result<()> {
    let transfer_config = transfer_config(options, config);
    transfer_config.validate()?;
    let output = output_path(options, config);
    let port = get_port(cli, config);
    let baud = get_baud(cli, config);

    if !cli.quiet {
        eprintln!("{} Using port {} at {} baud", style("🔌").cyan(), port, baud);
        let detected = detect_ports();
        if detected.is_empty() {
            eprintln!("  {}", style("No serial ports found").dim());
        }
        for line in format_port_list(&detected) {
            eprintln!("  {} {}", style("•").dim(), line);
        }
    }

    check_output_path(&output)?;
    let link = NativePort::open(&SerialConfig::new(&port, baud))
        .with_context(|| format!("failed to open serial port {port}"))?;

    // Truncate only once the link is up, so a bad port keeps the last dump.
    let sink = open_output(&output)?;
    debug!("Writing blocks to {}", output.display());

    // Completed blocks go straight to the file, so exiting here loses nothing.
    let reached = Arc::new(AtomicU32::new(0));
    let handler_reached = Arc::clone(&reached);
    ctrlc::set_handler(move || {
        eprintln!(
            "\n{} Interrupted after {} blocks",
            style("⚠").yellow(),
            handler_reached.load(Ordering::Relaxed)
        );
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    })
    .context("failed to install Ctrl-C handler")?;

    let total = transfer_config.total_blocks;
    let pb = progress_bar(cli, total);
    let mut transfer = BlockTransfer::new(link, sink, transfer_config);

    let result = transfer.run_with(|event| match *event {
        TransferEvent::Requesting { block, attempt } if attempt > 1 => {
            pb.set_message(format!("block {block}, attempt {attempt}"));
        },
        TransferEvent::Requesting { .. } => {},
        TransferEvent::Completed { block, .. } => {
            reached.store(block + 1, Ordering::Relaxed);
            pb.set_message("");
            pb.inc(1);
        },
        TransferEvent::Incomplete {
            block, failures, ..
        } => {
            pb.set_message(format!("block {block} incomplete ({failures})"));
        },
    });

    let (mut link, _) = transfer.into_parts();
    link.close();

    match result {
        Ok(summary) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!(
                    "\n{} {} blocks ({} bytes) written to {} in {:.1?}, {} retries",
                    style("✓").green().bold(),
                    summary.blocks,
                    summary.bytes_written,
                    output.display(),
                    summary.elapsed,
                    summary.retries
                );
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            Err(err).with_context(|| format!("partial output kept in {}", output.display()))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_config_defaults() {
        let config = transfer_config(&DumpOptions::default(), &Config::default());
        assert_eq!(config, TransferConfig::default());
    }

    #[test]
    fn test_transfer_config_cli_overrides_file() {
        let mut config = Config::default();
        config.transfer.blocks = Some(100);
        config.transfer.attempt_timeout_ms = Some(1000);
        config.transfer.max_failures = Some(9);

        let options = DumpOptions {
            blocks: Some(3),
            timeout_ms: None,
            max_failures: Some(2),
            output: None,
        };
        let transfer = transfer_config(&options, &config);
        assert_eq!(transfer.total_blocks, 3);
        assert_eq!(transfer.attempt_timeout, Duration::from_millis(1000));
        assert_eq!(transfer.max_consecutive_failures, 2);
        assert_eq!(transfer.newline_threshold, 256);
    }

    #[test]
    fn test_output_path_precedence() {
        let mut config = Config::default();
        assert_eq!(
            output_path(&DumpOptions::default(), &config),
            PathBuf::from(DEFAULT_OUTPUT)
        );

        config.transfer.output = Some(PathBuf::from("from_config.bin"));
        assert_eq!(
            output_path(&DumpOptions::default(), &config),
            PathBuf::from("from_config.bin")
        );

        let options = DumpOptions {
            output: Some(PathBuf::from("from_cli.bin")),
            ..Default::default()
        };
        assert_eq!(output_path(&options, &config), PathBuf::from("from_cli.bin"));
    }

    #[test]
    fn test_open_output_creates_parent_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("output.txt");

        drop(open_output(&path).unwrap());
        assert!(path.exists());

        fs::write(&path, b"stale").unwrap();
        drop(open_output(&path).unwrap());
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_open_output_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_output(dir.path()).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
        assert!(check_output_path(dir.path()).is_err());
    }

    #[test]
    fn test_check_output_path_leaves_existing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        fs::write(&path, b"previous dump").unwrap();

        check_output_path(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"previous dump");
    }
}
