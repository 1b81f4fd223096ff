//! Command-line surface and its merge with the optional config file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};

use pipesplit_core::config::{self, NamingKind};
use pipesplit_core::{RunConfig, SourceSpec, WriteErrorPolicy};
use pipesplit_daemon::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "pipesplit",
    version,
    about = "Copy a byte stream from stdin or a named pipe into rotating output files",
    long_about = None,
)]
pub struct Cli {
    /// YAML config file; flags given here override its values.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Named pipe to read from, or `-` for standard input (the default).
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<String>,

    /// Create the named pipe if it does not exist.
    #[arg(long)]
    pub create_fifo: bool,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub rotation: RotationArgs,

    #[command(flatten)]
    pub daemon: DaemonArgs,

    /// Print run counters as JSON on stdout when the run ends.
    #[arg(long)]
    pub summary: bool,

    /// Print the effective configuration as YAML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Directory receiving the output files.
    #[arg(short, long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// File name prefix: files are named `<prefix>.<key><suffix>`.
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Suffix appended after the key, e.g. `.log`.
    #[arg(long)]
    pub suffix: Option<String>,

    /// Key files by sequence number or by open timestamp.
    #[arg(long, value_enum)]
    pub naming: Option<NamingArg>,

    /// Zero-padded width of sequence keys.
    #[arg(long)]
    pub width: Option<usize>,

    /// Write the open file as `<name><suffix>` and rename it when complete.
    #[arg(long, value_name = "SUFFIX")]
    pub pending_suffix: Option<String>,

    /// Keep only the newest N finalized files.
    #[arg(long, value_name = "N")]
    pub max_files: Option<usize>,

    /// Skip the fsync of each file before it is closed.
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct RotationArgs {
    /// Rotate before a chunk would push the file past this size (e.g. 10M, 512KiB).
    #[arg(short = 's', long, value_parser = parse_size, value_name = "SIZE")]
    pub max_bytes: Option<u64>,

    /// Rotate when the file is at least this old on the next chunk (e.g. 1h, 90s).
    #[arg(short = 't', long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub max_age: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Long-lived mode: retry an unavailable source instead of exiting.
    #[arg(short, long)]
    pub daemon: bool,

    /// With --daemon, reattach to the pipe after its writer exits.
    #[arg(long)]
    pub continue_read: bool,

    /// First reattach delay after a rapid failure.
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub backoff_initial: Option<Duration>,

    /// Upper bound for the reattach delay.
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub backoff_max: Option<Duration>,

    /// Give up after N consecutive rapid failures.
    #[arg(long, value_name = "N")]
    pub max_restarts: Option<u32>,

    /// Attachments shorter than this count as rapid failures.
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub min_attach: Option<Duration>,

    /// Write the process id here for the lifetime of the run.
    #[arg(long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// With --daemon, keep draining the source when the output fails.
    #[arg(long)]
    pub discard_on_write_error: bool,

    /// How long blocked reads may hold up exit after shutdown.
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub shutdown_grace: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamingArg {
    Sequence,
    Timestamp,
}

impl From<NamingArg> for NamingKind {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::Sequence => NamingKind::Sequence,
            NamingArg::Timestamp => NamingKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Parse `100`, `10M`, `512KiB` and the like into bytes.
fn parse_size(s: &str) -> Result<u64, String> {
    let byte = byte_unit::Byte::from_str(s).map_err(|e| format!("invalid size '{s}': {e}"))?;
    u64::try_from(byte.get_bytes()).map_err(|_| format!("size '{s}' is too large"))
}

impl Cli {
    /// Defaults, then the config file, then flags; validated.
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = RunConfig::default();
        if let Some(path) = &self.config {
            config = config::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?
                .apply(config);
        }
        self.apply_flags(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_flags(&self, config: &mut RunConfig) {
        if let Some(input) = &self.input {
            config.source = config::source_from_input(input, self.create_fifo);
        } else if let SourceSpec::Fifo { create, .. } = &mut config.source {
            *create |= self.create_fifo;
        }

        let out = &self.output;
        let output = &mut config.output;
        if let Some(dir) = &out.output_dir {
            output.directory = dir.clone();
        }
        if let Some(prefix) = &out.prefix {
            output.prefix = prefix.clone();
        }
        if out.suffix.is_some() {
            output.suffix = out.suffix.clone();
        }
        output.naming =
            config::resolve_naming(out.naming.map(Into::into), out.width, output.naming);
        if out.pending_suffix.is_some() {
            output.pending_suffix = out.pending_suffix.clone();
        }
        if out.max_files.is_some() {
            output.max_files = out.max_files;
        }
        if out.no_sync {
            output.sync_on_rotate = false;
        }

        if self.rotation.max_bytes.is_some() {
            config.trigger.max_bytes = self.rotation.max_bytes;
        }
        if self.rotation.max_age.is_some() {
            config.trigger.max_age = self.rotation.max_age;
        }

        let d = &self.daemon;
        let daemon = &mut config.daemon;
        daemon.enabled |= d.daemon;
        daemon.continue_read |= d.continue_read;
        if let Some(initial) = d.backoff_initial {
            daemon.backoff.initial = initial;
        }
        if let Some(max) = d.backoff_max {
            daemon.backoff.max = max;
        }
        if d.max_restarts.is_some() {
            daemon.max_restarts = d.max_restarts;
        }
        if let Some(min_attach) = d.min_attach {
            daemon.min_attach = min_attach;
        }
        if d.pid_file.is_some() {
            daemon.pid_file = d.pid_file.clone();
        }
        if d.discard_on_write_error {
            config.write_error = WriteErrorPolicy::Discard;
        }
        if let Some(grace) = d.shutdown_grace {
            config.shutdown_grace = grace;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesplit_core::NamingScheme;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pipesplit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn sizes_accept_units() {
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("64KiB").unwrap(), 65_536);
        assert_eq!(parse_size("10M").unwrap(), 10_000_000);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn flags_build_fifo_daemon_config() {
        let cli = parse(&[
            "--input",
            "/tmp/in.fifo",
            "--create-fifo",
            "-o",
            "/tmp/out",
            "-p",
            "app",
            "--naming",
            "timestamp",
            "--max-bytes",
            "1KiB",
            "--max-age",
            "90s",
            "--daemon",
            "--continue-read",
            "--max-restarts",
            "3",
        ]);
        let config = cli.resolve().unwrap();
        assert_eq!(
            config.source,
            SourceSpec::Fifo {
                path: PathBuf::from("/tmp/in.fifo"),
                create: true
            }
        );
        assert_eq!(config.output.directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.output.prefix, "app");
        assert_eq!(config.output.naming, NamingScheme::Timestamp);
        assert_eq!(config.trigger.max_bytes, Some(1024));
        assert_eq!(config.trigger.max_age, Some(Duration::from_secs(90)));
        assert!(config.daemon.enabled && config.daemon.continue_read);
        assert_eq!(config.daemon.max_restarts, Some(3));
    }

    #[test]
    fn no_flags_means_stdin_with_defaults() {
        let config = parse(&[]).resolve().unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn files_are_synced_unless_disabled() {
        assert!(parse(&[]).resolve().unwrap().output.sync_on_rotate);
        assert!(!parse(&["--no-sync"]).resolve().unwrap().output.sync_on_rotate);
    }

    #[test]
    fn invalid_combination_is_rejected() {
        let err = parse(&["--continue-read"]).resolve().unwrap_err();
        assert!(format!("{err:#}").contains("daemon"), "got: {err:#}");
    }
}
