use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::{
    config::{Config, PortConfig},
    diagnose::DEFAULT_LISTEN,
    error::Error,
    line::LineName,
};

/// The command line interface.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Stdout trace level
    #[arg(long, global = true, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also write traces to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub trace_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Capture incoming bytes to a timestamped file.
    Capture(CaptureArgs),

    /// Log every change of CTS, DSR, RI and CD as CSV.
    Watch(WatchArgs),

    /// Test a cable: TX->RX loopback and drive->sense line continuity.
    CableTest(CableTestArgs),

    /// Show port setup and line states, then count incoming bytes for a while.
    Diagnose(DiagnoseArgs),

    /// Send every received byte back.
    Echo(PortArgs),

    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}

/// Port selection, overriding the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial device, e.g. /dev/ttyUSB0 or COM3
    pub device: Option<String>,

    /// Baud rate
    pub baud: Option<u32>,

    /// Enable RTS/CTS hardware flow control
    #[arg(long)]
    pub rtscts: bool,

    /// Read timeout in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,
}

impl PortArgs {
    /// Overlay these arguments on the configured port.
    pub fn apply(&self, port: &mut PortConfig) {
        if let Some(device) = &self.device {
            port.path = device.clone();
        }
        if let Some(baud) = self.baud {
            port.baud = baud;
        }
        if self.rtscts {
            port.hardware_flow_control = true;
        }
        if let Some(timeout) = self.read_timeout_ms {
            port.read_timeout_ms = timeout;
        }
    }
}

/// What to do with the assert line before capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LineMode {
    /// Drive it high.
    On,
    /// Drive it low.
    Off,
    /// Invert its current level.
    Toggle,
}

/// Arguments for `capture`.
#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// The port to use.
    #[command(flatten)]
    pub port: PortArgs,

    /// Write a hex/ASCII log alongside the binary capture
    #[arg(long)]
    pub log: bool,

    /// Host output line to drive before capturing
    #[arg(long, value_parser = output_line)]
    pub assert_line: Option<LineName>,

    /// Level for the assert line
    #[arg(long, value_enum, default_value_t = LineMode::On)]
    pub line_mode: LineMode,

    /// Pulse the assert line for N milliseconds once capturing
    #[arg(long)]
    pub pulse_ms: Option<u64>,

    /// Remote driven line to wait for and annotate
    #[arg(long, value_parser = input_line)]
    pub monitor_line: Option<LineName>,

    /// Do not wait for the monitored line to be asserted
    #[arg(long)]
    pub no_wait: bool,

    /// Give up waiting for the monitored line after N milliseconds
    #[arg(long)]
    pub gate_timeout_ms: Option<u64>,

    /// Strip the high bit from incoming bytes (7-bit text mode)
    #[arg(long)]
    pub sevenbit: bool,

    /// Stop after N seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Stop after N bytes
    #[arg(long)]
    pub max_bytes: Option<u64>,

    /// Capture file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Directory for capture files
    #[arg(long)]
    pub directory: Option<PathBuf>,
}

impl CaptureArgs {
    /// Overlay these arguments on a configuration.
    pub fn apply(&self, config: &mut Config) {
        self.port.apply(&mut config.port);

        let capture = &mut config.capture;
        capture.log |= self.log;
        capture.seven_bit |= self.sevenbit;
        if self.no_wait {
            capture.wait_for_monitor = false;
        }
        if self.assert_line.is_some() {
            capture.assert_line = self.assert_line;
        }
        if let Some(ms) = self.pulse_ms {
            capture.pulse_ms = ms;
        }
        if self.monitor_line.is_some() {
            capture.monitor_line = self.monitor_line;
        }
        // Hardware flow control means the remote signals readiness on CTS.
        if capture.monitor_line.is_none() && config.port.hardware_flow_control {
            capture.monitor_line = Some(LineName::Cts);
        }
        if let Some(ms) = self.gate_timeout_ms {
            capture.gate_timeout_ms = ms;
        }
        if self.duration.is_some() {
            capture.duration_secs = self.duration;
        }
        if self.max_bytes.is_some() {
            capture.max_bytes = self.max_bytes;
        }
        if let Some(prefix) = &self.prefix {
            capture.prefix = prefix.clone();
        }
        if let Some(directory) = &self.directory {
            capture.directory = directory.clone();
        }
    }
}

/// Arguments for `watch`.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// The port to use.
    #[command(flatten)]
    pub port: PortArgs,

    /// Polling interval in milliseconds
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,

    /// Append records to this file instead of printing them
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `cable-test`.
#[derive(Args, Debug, Clone)]
pub struct CableTestArgs {
    /// The port to use.
    #[command(flatten)]
    pub port: PortArgs,

    /// Line to drive during the continuity sweep
    #[arg(long, value_parser = output_line, default_value = "rts")]
    pub drive: LineName,

    /// Line expected to follow the driven one
    #[arg(long, value_parser = input_line, default_value = "cts")]
    pub sense: LineName,

    /// Slowly toggle the drive line twice first, printing the sense line
    #[arg(long)]
    pub verbose: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `diagnose`.
#[derive(Args, Debug, Clone)]
pub struct DiagnoseArgs {
    /// The port to use.
    #[command(flatten)]
    pub port: PortArgs,

    /// How long to listen, in seconds
    #[arg(long, default_value_t = DEFAULT_LISTEN.as_secs())]
    pub listen: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

fn line(s: &str) -> Result<LineName, Error> {
    s.parse()
}

fn output_line(s: &str) -> Result<LineName, Error> {
    let line = line(s)?;
    if line.is_host_output() {
        Ok(line)
    } else {
        Err(Error::BadConfig(format!("{line} is not a host output line (RTS, DTR)")))
    }
}

fn input_line(s: &str) -> Result<LineName, Error> {
    let line = line(s)?;
    if line.is_host_input() {
        Ok(line)
    } else {
        Err(Error::BadConfig(format!(
            "{line} is not a host input line (CTS, DSR, RI, CD)"
        )))
    }
}

/// Handle commands which don't need a port.
pub fn handle_examples(example: Examples) -> Result<(), Error> {
    match example {
        Examples::Config => {
            println!("{}", Config::example().serialize_pretty()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn capture_flags_override_config() {
        let cli = Cli::parse_from([
            "rs232-probe",
            "capture",
            "/dev/ttyUSB1",
            "19200",
            "--rtscts",
            "--log",
            "--assert-line",
            "dtr",
            "--pulse-ms",
            "250",
            "--sevenbit",
        ]);
        let Commands::Capture(args) = cli.command else {
            panic!("Expected capture");
        };

        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.port.path, "/dev/ttyUSB1");
        assert_eq!(config.port.baud, 19200);
        assert!(config.capture.log);
        assert!(config.capture.seven_bit);
        assert_eq!(config.capture.assert_line, Some(LineName::Dtr));
        assert_eq!(config.capture.pulse_ms, 250);
        // Flow control implies waiting on CTS.
        assert_eq!(config.capture.monitor_line, Some(LineName::Cts));
        config.validate().unwrap();
    }

    #[test]
    fn diagnose_listens_for_the_default_time() {
        let cli = Cli::parse_from(["rs232-probe", "diagnose"]);
        let Commands::Diagnose(args) = cli.command else {
            panic!("Expected diagnose");
        };

        assert_eq!(args.listen, DEFAULT_LISTEN.as_secs());
    }

    #[test]
    fn line_roles_are_checked_while_parsing() {
        assert!(Cli::try_parse_from(["rs232-probe", "capture", "--monitor-line", "rts"]).is_err());
        assert!(Cli::try_parse_from(["rs232-probe", "capture", "--assert-line", "cts"]).is_err());
        assert!(Cli::try_parse_from(["rs232-probe", "cable-test", "--drive", "dsr"]).is_err());
    }
}
