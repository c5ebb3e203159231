use std::io;

use thiserror::Error;

/// Errors on the data path of a serial port.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// Errors reported by the serial port driver.
    #[error("Serial port driver problem")]
    Driver(#[from] serialport::Error),
}
