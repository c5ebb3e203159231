use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::trace;

use crate::{error::Error, line::LineName};

pub(crate) mod mock;
pub(crate) mod serial;

/// Largest read the capture loop asks for.
pub const MAX_READ: usize = 1024;

/// How a port is (or should be) opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// The device path.
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

    /// A read returns empty after this long without data.
    pub read_timeout: Duration,

    /// Let the driver handle RTS/CTS.
    pub hardware_flow_control: bool,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".into(),
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::from_secs(1),
            hardware_flow_control: false,
        }
    }
}

impl PortSettings {
    /// The flow control setting to hand the driver.
    pub fn flow_control(&self) -> FlowControl {
        if self.hardware_flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        }
    }

    /// Short form like `9600 8N1`.
    pub fn framing(&self) -> String {
        let data_bits = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };

        format!("{} {data_bits}{parity}{stop_bits}", self.baud)
    }
}

/// Byte and control line access to an open port.
///
/// Implemented by real serial ports and by the in-memory mock,
/// so everything above this layer is agnostic to which one it talks to.
#[async_trait]
pub trait LineInterface: Send {
    /// The device path or mock name.
    fn name(&self) -> &str;

    /// The settings the port was opened with.
    fn settings(&self) -> &PortSettings;

    /// Read up to `max_bytes`.
    ///
    /// Returns an empty buffer if nothing arrived within the read timeout.
    async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error>;

    /// Write all of `bytes`, returning how many were written.
    async fn write(&mut self, bytes: &[u8]) -> Result<usize, Error>;

    /// Push any buffered output onto the wire.
    async fn flush(&mut self) -> Result<(), Error>;

    /// Raw line read, errors included.
    fn read_line(&mut self, line: LineName) -> Result<bool, Error>;

    /// Raw line write. Only called with host output lines.
    fn write_line(&mut self, line: LineName, value: bool) -> Result<(), Error>;

    /// Drop anything pending in both directions.
    fn reset_buffers(&mut self) -> Result<(), Error>;

    /// Release the port. Calling this more than once is fine.
    fn close(&mut self);

    /// Current line state.
    ///
    /// Adapters differ in which modem lines they expose,
    /// so a line which cannot be read reads as `false`.
    fn get_line(&mut self, line: LineName) -> bool {
        match self.read_line(line) {
            Ok(state) => state,
            Err(e) => {
                trace!(%line, ?e, "Line unreadable, treating as deasserted");
                false
            }
        }
    }

    /// Drive a host output line.
    fn set_line(&mut self, line: LineName, value: bool) -> Result<(), Error> {
        if !line.is_host_output() {
            return Err(Error::LineControl {
                line,
                problem: "input-only line".into(),
            });
        }

        self.write_line(line, value).map_err(|e| match e {
            e @ Error::LineControl { .. } => e,
            other => Error::LineControl {
                line,
                problem: other.to_string(),
            },
        })
    }

    /// Read until `len` bytes have arrived or a read comes back empty.
    ///
    /// Short results are returned as they are.
    async fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut received = Vec::with_capacity(len);

        while received.len() < len {
            let chunk = self.read(len - received.len()).await?;
            if chunk.is_empty() {
                break;
            }
            received.extend_from_slice(&chunk);
        }

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn framing() {
        let settings = PortSettings::default();
        assert_eq!(settings.framing(), "9600 8N1");

        let settings = PortSettings {
            baud: 19200,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            ..Default::default()
        };
        assert_eq!(settings.framing(), "19200 7E2");
    }

    #[test]
    fn flow_control_follows_flag() {
        let mut settings = PortSettings::default();
        assert_eq!(settings.flow_control(), FlowControl::None);

        settings.hardware_flow_control = true;
        assert_eq!(settings.flow_control(), FlowControl::Hardware);
    }
}
