//! blockdump CLI - Command-line tool for dumping data blocks over a serial link.
//!
//! ## Features
//!
//! - Retrieve every block from the device into a single output file
//! - Bounded per-block retry with a progress bar
//! - List available serial ports (text or JSON)
//! - Shell completion generation
//! - Configuration file and environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use config::Config;

/// blockdump - Retrieve data blocks from a device over a serial link.
///
/// Environment variables:
///   BLOCKDUMP_PORT   - Default serial port
///   BLOCKDUMP_BAUD   - Default baud rate (default: 9600)
#[derive(Parser)]
#[command(name = "blockdump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  blockdump -p /dev/ttyUSB0 dump\n  blockdump -p COM36 dump --output output/output.txt\n  blockdump list-ports --json")]
pub(crate) struct Cli {
    /// Serial port to use (falls back to config, then a platform default).
    #[arg(short, long, global = true, env = "BLOCKDUMP_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate of the serial link.
    #[arg(short, long, global = true, env = "BLOCKDUMP_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Retrieve all blocks from the device into an output file.
    Dump {
        /// Number of blocks to retrieve (default: 15625).
        #[arg(long)]
        blocks: Option<u32>,

        /// Output file (default: output/output.txt).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Per-attempt deadline in milliseconds (default: 2000).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Consecutive timeouts before aborting (default: 5).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_failures: Option<u32>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// CLI-level failures that are not library errors.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Invalid invocation or setup.
    #[error("{0}")]
    Usage(String),
}

/// Exit code for a successful run.
pub(crate) const EXIT_OK: u8 = 0;
/// Exit code for unexpected errors.
pub(crate) const EXIT_FAILURE: u8 = 1;
/// Exit code for usage errors (matches clap).
pub(crate) const EXIT_USAGE: u8 = 2;
/// Exit code when the transfer aborted after exhausting its retries.
pub(crate) const EXIT_ABORTED: u8 = 3;
/// Exit code for serial link or device failures.
pub(crate) const EXIT_LINK: u8 = 4;
/// Exit code after Ctrl-C.
pub(crate) const EXIT_INTERRUPTED: u8 = 130;

/// Map an error to the process exit code.
pub(crate) fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(CliError::Usage(_)) = cause.downcast_ref::<CliError>() {
            return EXIT_USAGE;
        }
        if let Some(lib_err) = cause.downcast_ref::<blockdump::Error>() {
            if matches!(lib_err, blockdump::Error::TransferAborted { .. }) {
                return EXIT_ABORTED;
            }
            if lib_err.is_link_failure() {
                return EXIT_LINK;
            }
            if matches!(lib_err, blockdump::Error::Config(_)) {
                return EXIT_USAGE;
            }
        }
    }
    EXIT_FAILURE
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "blockdump v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Dump {
            blocks,
            output,
            timeout_ms,
            max_failures,
        } => {
            let options = commands::dump::DumpOptions {
                blocks: *blocks,
                output: output.clone(),
                timeout_ms: *timeout_ms,
                max_failures: *max_failures,
            };
            commands::dump::cmd_dump(cli, &config, &options)
        },
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Serial port from the CLI, the configuration, or the platform default.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> String {
    cli.port
        .clone()
        .or_else(|| {
            config
                .connection
                .serial
                .clone()
        })
        .unwrap_or_else(|| blockdump::DEFAULT_PORT.to_string())
}

/// Baud rate from the CLI, the configuration, or the default.
pub(crate) fn get_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config
            .connection
            .baud)
        .unwrap_or(blockdump::DEFAULT_BAUD)
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_dump() {
        let cli = Cli::try_parse_from([
            "blockdump",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "dump",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(115200));
        assert!(matches!(cli.command, Commands::Dump { .. }));
    }

    #[test]
    fn test_cli_parse_dump_with_all_options() {
        let cli = Cli::try_parse_from([
            "blockdump",
            "dump",
            "--blocks",
            "3",
            "--output",
            "out.bin",
            "--timeout-ms",
            "500",
            "--max-failures",
            "2",
        ])
        .unwrap();
        if let Commands::Dump {
            blocks,
            output,
            timeout_ms,
            max_failures,
        } = cli.command
        {
            assert_eq!(blocks, Some(3));
            assert_eq!(output, Some(PathBuf::from("out.bin")));
            assert_eq!(timeout_ms, Some(500));
            assert_eq!(max_failures, Some(2));
        } else {
            panic!("expected dump command");
        }
    }

    #[test]
    fn test_cli_rejects_zero_max_failures() {
        let result = Cli::try_parse_from(["blockdump", "dump", "--max-failures", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["blockdump", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["blockdump", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["blockdump"]).is_err());
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli =
            Cli::try_parse_from(["blockdump", "dump", "-p", "COM7", "-vv", "-q"]).unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM7"));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
    }

    // ---- settings resolution ----

    #[test]
    fn test_port_precedence() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyACM0".to_string());

        let cli = Cli::try_parse_from(["blockdump", "-p", "COM3", "dump"]).unwrap();
        assert_eq!(get_port(&cli, &config), "COM3");

        let cli = Cli::try_parse_from(["blockdump", "dump"]).unwrap();
        if cli.port.is_none() {
            assert_eq!(get_port(&cli, &config), "/dev/ttyACM0");
            assert_eq!(get_port(&cli, &Config::default()), blockdump::DEFAULT_PORT);
        }
    }

    #[test]
    fn test_baud_precedence() {
        let mut config = Config::default();
        config.connection.baud = Some(57600);

        let cli = Cli::try_parse_from(["blockdump", "-b", "115200", "dump"]).unwrap();
        assert_eq!(get_baud(&cli, &config), 115200);

        let cli = Cli::try_parse_from(["blockdump", "dump"]).unwrap();
        if cli.baud.is_none() {
            assert_eq!(get_baud(&cli, &config), 57600);
            assert_eq!(get_baud(&cli, &Config::default()), 9600);
        }
    }

    // ---- exit codes ----

    #[test]
    fn test_exit_code_for_abort() {
        let err = anyhow::Error::from(blockdump::Error::TransferAborted {
            block: 3,
            completed: 3,
            attempts: 5,
        });
        assert_eq!(exit_code_for(&err), EXIT_ABORTED);
    }

    #[test]
    fn test_exit_code_for_link_failure_with_context() {
        let link = blockdump::LinkError::ReadFailed(std::io::Error::other("unplugged"));
        let err = anyhow::Error::from(blockdump::Error::from(link)).context("reading block 7");
        assert_eq!(exit_code_for(&err), EXIT_LINK);
    }

    #[test]
    fn test_exit_code_for_usage_error() {
        let usage = anyhow::Error::from(CliError::Usage("bad".into()));
        assert_eq!(exit_code_for(&usage), EXIT_USAGE);

        let config = anyhow::Error::from(blockdump::Error::Config("zero budget".into()));
        assert_eq!(exit_code_for(&config), EXIT_USAGE);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), EXIT_FAILURE);

        let sink = anyhow::Error::from(blockdump::Error::Sink(std::io::Error::other("disk")));
        assert_eq!(exit_code_for(&sink), EXIT_FAILURE);
    }
}
