use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

use crate::{
    capture::{CaptureLimits, CaptureOptions, DEFAULT_GATE_TIMEOUT},
    error::Error,
    interface::PortSettings,
    line::{LineName, PulseSpec},
};

/// How to open the port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// The path to the device.
    /// Likely "/dev/ttyUSBx" or "COMx".
    pub path: String,

    /// Bits per second.
    pub baud: u32,

    /// Data bits per character.
    pub data_bits: DataBits,

    /// Parity checking.
    pub parity: Parity,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Reads come back empty after this many milliseconds without data.
    pub read_timeout_ms: u64,

    /// Let the driver handle RTS/CTS.
    pub hardware_flow_control: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        let settings = PortSettings::default();

        Self {
            path: settings.path,
            baud: settings.baud,
            data_bits: settings.data_bits,
            parity: settings.parity,
            stop_bits: settings.stop_bits,
            read_timeout_ms: settings.read_timeout.as_millis() as u64,
            hardware_flow_control: settings.hardware_flow_control,
        }
    }
}

impl PortConfig {
    /// The settings to open the port with.
    pub fn settings(&self) -> PortSettings {
        PortSettings {
            path: self.path.clone(),
            baud: self.baud,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            hardware_flow_control: self.hardware_flow_control,
        }
    }
}

/// How a capture is done and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture files are named `PREFIX-YYYYMMDD-HHMMSS.bin`.
    pub prefix: String,

    /// Where capture files are written.
    pub directory: PathBuf,

    /// Write a hex/ASCII log next to the binary capture.
    pub log: bool,

    /// Clear the high bit of every received byte.
    pub seven_bit: bool,

    /// Wait for the monitored line before capturing.
    pub wait_for_monitor: bool,

    /// Capture anyway after waiting this many milliseconds.
    pub gate_timeout_ms: u64,

    /// The host output line to assert before capturing.
    pub assert_line: Option<LineName>,

    /// The remote driven line to gate on and annotate.
    pub monitor_line: Option<LineName>,

    /// Pulse the assert line for this many milliseconds. Zero means no pulse.
    pub pulse_ms: u64,

    /// Stop after this many seconds. Runs until interrupted if unset.
    pub duration_secs: Option<u64>,

    /// Stop after this many bytes.
    pub max_bytes: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            prefix: "llist".into(),
            directory: PathBuf::from("."),
            log: false,
            seven_bit: false,
            wait_for_monitor: true,
            gate_timeout_ms: DEFAULT_GATE_TIMEOUT.as_millis() as u64,
            assert_line: None,
            monitor_line: None,
            pulse_ms: 0,
            duration_secs: None,
            max_bytes: None,
        }
    }
}

impl CaptureConfig {
    /// The capture engine options this configuration describes.
    pub fn options(&self) -> Result<CaptureOptions, Error> {
        let pulse = match (self.assert_line, self.pulse_ms) {
            (_, 0) => None,
            (Some(line), ms) => Some(PulseSpec::new(line, Duration::from_millis(ms))?),
            (None, _) => {
                return Err(Error::BadConfig(
                    "a pulse needs an assert line (RTS or DTR)".into(),
                ))
            }
        };

        let options = CaptureOptions {
            monitor_line: self.monitor_line,
            wait_for_monitor: self.wait_for_monitor,
            gate_timeout: Duration::from_millis(self.gate_timeout_ms),
            drive_line: self.assert_line,
            pulse,
            seven_bit: self.seven_bit,
            limits: CaptureLimits {
                duration: self.duration_secs.map(Duration::from_secs),
                max_bytes: self.max_bytes,
            },
            ..Default::default()
        };
        options.validate()?;

        Ok(options)
    }
}

/// The configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The port to use.
    pub port: PortConfig,

    /// Capture settings.
    pub capture: CaptureConfig,
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            port: PortConfig {
                path: "/dev/ttyUSB0".into(),
                baud: 9600,
                hardware_flow_control: true,
                ..Default::default()
            },
            capture: CaptureConfig {
                log: true,
                assert_line: Some(LineName::Dtr),
                monitor_line: Some(LineName::Cts),
                pulse_ms: 250,
                ..Default::default()
            },
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(e.to_string()))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p)?;

        Self::deserialize(&s)
    }

    fn check_port(&self) -> Result<(), Error> {
        if self.port.path.is_empty() {
            return Err(Error::BadConfig("the port path is empty".into()));
        }
        if self.port.baud == 0 {
            return Err(Error::BadConfig("the baud rate must be above zero".into()));
        }

        Ok(())
    }

    fn check_lines(&self) -> Result<(), Error> {
        if let Some(line) = self.capture.assert_line {
            if !line.is_host_output() {
                return Err(Error::BadConfig(format!(
                    "{line} is driven by the remote and cannot be asserted, pick RTS or DTR"
                )));
            }
        }

        Ok(())
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_port()?;
        self.check_lines()?;
        self.capture.options()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serialize_roundtrips_example() {
        let c = Config::example();

        let text = c.serialize_pretty().unwrap();
        println!("{text}");

        assert_eq!(Config::deserialize(&text).unwrap(), c);
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    port: (
        path: "/dev/ttyUSB1",
        baud: 19200,
        stop_bits: Two,
        hardware_flow_control: true,
    ),
    capture: (
        prefix: "spectrum",
        log: true,
        seven_bit: true,
        assert_line: dtr,
        monitor_line: cts,
        gate_timeout_ms: 5000,
    ),
)
"#;
        let config = Config::deserialize(input).unwrap();
        config.validate().unwrap();

        assert_eq!(config.port.baud, 19200);
        assert_eq!(config.port.stop_bits, StopBits::Two);
        assert_eq!(config.port.data_bits, DataBits::Eight);
        assert_eq!(config.capture.prefix, "spectrum");
        assert_eq!(config.capture.monitor_line, Some(LineName::Cts));

        let options = config.capture.options().unwrap();
        assert_eq!(options.gate_timeout, Duration::from_secs(5));
        assert!(options.pulse.is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::deserialize("()").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.port.settings(), PortSettings::default());
    }

    #[test]
    fn bad_config_monitor_output_line() {
        let c = Config {
            capture: CaptureConfig {
                monitor_line: Some(LineName::Dtr),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("DTR"));
    }

    #[test]
    fn bad_config_assert_input_line() {
        let c = Config {
            capture: CaptureConfig {
                assert_line: Some(LineName::Dsr),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("DSR"));
    }

    #[test]
    fn bad_config_pulse_without_line() {
        let c = Config {
            capture: CaptureConfig {
                pulse_ms: 100,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(c.validate().unwrap_err().try_into_bad_config().is_some());
    }

    #[test]
    fn bad_config_zero_baud() {
        let mut c = Config::default();
        c.port.baud = 0;

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        assert!(err.contains("baud"));
    }
}
