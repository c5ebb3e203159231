use std::{io, time::Duration};

#[cfg(unix)]
use std::path::Path;

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, PortOpenProblem},
    interface::PortSettings,
};

/// Builder for a [`SerialPortHandle`].
#[derive(Debug, Default)]
pub struct SerialPortBuilder {
    settings: PortSettings,
}

fn open_problem(e: &serialport::Error) -> PortOpenProblem {
    match e.kind() {
        serialport::ErrorKind::NoDevice => PortOpenProblem::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => PortOpenProblem::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            PortOpenProblem::PermissionDenied
        }
        _ => {
            // Drivers only tell us the port is taken through the description.
            let description = e.to_string().to_lowercase();
            if description.contains("busy") {
                PortOpenProblem::Busy
            } else if description.contains("denied") {
                PortOpenProblem::PermissionDenied
            } else {
                PortOpenProblem::Other(e.to_string())
            }
        }
    }
}

#[cfg(unix)]
fn device_exists(path: &str) -> bool {
    Path::new(path).exists()
}

// COM ports are not filesystem paths.
#[cfg(not(unix))]
fn device_exists(_path: &str) -> bool {
    true
}

fn try_create_serial_port(settings: &PortSettings) -> Result<SerialStream, Error> {
    if !device_exists(&settings.path) {
        return Err(Error::PortOpen {
            path: settings.path.clone(),
            problem: PortOpenProblem::NotFound,
        });
    }

    tokio_serial::new(&settings.path, settings.baud)
        .data_bits(settings.data_bits)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .flow_control(settings.flow_control())
        .timeout(settings.read_timeout)
        .open_native_async()
        .map_err(|e| Error::PortOpen {
            path: settings.path.clone(),
            problem: open_problem(&e),
        })
}

/// Level of a host output line we have not driven ourselves.
/// Opening a port asserts RTS and DTR.
pub(crate) const OPEN_LEVEL: bool = true;

/// The remembered level of a host output line.
pub(crate) fn output_level(driven: Option<bool>) -> bool {
    driven.unwrap_or(OPEN_LEVEL)
}

fn raised_on_open(line: &str, result: serialport::Result<()>) -> Option<bool> {
    match result {
        Ok(()) => Some(true),
        Err(e) => {
            warn!(line, %e, "Could not raise line on open");
            None
        }
    }
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyUSBx` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            settings: PortSettings {
                path: tty.to_string(),
                ..Default::default()
            },
        }
    }

    /// Start from complete settings.
    pub fn from_settings(settings: PortSettings) -> Self {
        Self { settings }
    }

    /// Set the serial port builder's baud.
    /// Will use 9600 if not set.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.settings.baud = baud;
        self
    }

    /// Set the character framing.
    /// Will use 8N1 if not set.
    pub fn set_framing(mut self, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        self.settings.data_bits = data_bits;
        self.settings.parity = parity;
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set how long a read waits for data.
    pub fn set_read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = timeout;
        self
    }

    /// Enable or disable RTS/CTS flow control in the driver.
    pub fn set_hardware_flow_control(mut self, enabled: bool) -> Self {
        self.settings.hardware_flow_control = enabled;
        self
    }

    /// Open the port.
    ///
    /// Fails right away if the port cannot be opened, there is no retry.
    pub fn build(self) -> Result<SerialPortHandle, Error> {
        let settings = self.settings;

        debug!(path = %settings.path, framing = %settings.framing(), hardware_flow_control = settings.hardware_flow_control, "Opening port");

        let mut stream = try_create_serial_port(&settings)?;

        info!(path = %settings.path, "Port opened");

        let dtr = raised_on_open("DTR", stream.write_data_terminal_ready(true));
        // The driver owns RTS under hardware flow control.
        let rts = if settings.hardware_flow_control {
            None
        } else {
            raised_on_open("RTS", stream.write_request_to_send(true))
        };

        Ok(SerialPortHandle {
            settings,
            stream: Some(stream),
            rts,
            dtr,
        })
    }
}

/// An open serial port.
///
/// Dropping the handle closes the port.
pub struct SerialPortHandle {
    pub(crate) settings: PortSettings,
    pub(crate) stream: Option<SerialStream>,

    // The modem status register only reports remote driven lines,
    // so remember what we drove ourselves.
    pub(crate) rts: Option<bool>,
    pub(crate) dtr: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_device_is_not_found() {
        let result = SerialPortBuilder::new("/dev/this-tty-does-not-exist")
            .set_baud(19200)
            .build();

        let err = result.err().unwrap();
        assert!(err.is_device_not_found());
        assert!(err.to_string().contains("/dev/this-tty-does-not-exist"));
    }

    #[test]
    fn fresh_port_output_lines_read_asserted() {
        let dtr = raised_on_open("DTR", Ok(()));
        assert_eq!(dtr, Some(true));

        // Toggling from the remembered level drives the line low.
        assert!(!output_level(dtr));

        // Not raised by us, the line is still at its open level.
        let rts = raised_on_open(
            "RTS",
            Err(serialport::Error::new(serialport::ErrorKind::Unknown, "unsupported")),
        );
        assert_eq!(rts, None);
        assert!(output_level(rts));

        assert!(!output_level(Some(false)));
    }

    #[test]
    fn busy_description_is_busy() {
        let e = serialport::Error::new(serialport::ErrorKind::Unknown, "Device or resource busy");
        assert_eq!(open_problem(&e), PortOpenProblem::Busy);

        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert_eq!(open_problem(&e), PortOpenProblem::NotFound);
    }
}
