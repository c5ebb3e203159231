use std::{fmt::Display, io};

use thiserror::Error;

use crate::{line::LineName, serial::error::SerialPortError};

/// Why a port could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortOpenProblem {
    /// Nothing exists at the given path.
    NotFound,

    /// The device exists but we may not open it.
    PermissionDenied,

    /// Another process holds the device.
    Busy,

    /// Anything else the operating system reported.
    Other(String),
}

impl Display for PortOpenProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortOpenProblem::NotFound => write!(f, "device not found"),
            PortOpenProblem::PermissionDenied => write!(f, "permission denied"),
            PortOpenProblem::Busy => write!(f, "device busy"),
            PortOpenProblem::Other(problem) => write!(f, "{problem}"),
        }
    }
}

/// Errors that may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The port could not be opened. Never retried.
    #[error("Could not open port `{path}`: {problem}")]
    PortOpen {
        /// The device path.
        path: String,

        /// What went wrong.
        problem: PortOpenProblem,
    },

    /// A control line could not be driven.
    #[error("Could not drive {line}: {problem}")]
    LineControl {
        /// The line we tried to drive.
        line: LineName,

        /// What went wrong.
        problem: String,
    },

    /// The port was used after being closed.
    #[error("Port `{0}` is closed")]
    PortClosed(String),

    /// Problems reading or writing the data path.
    #[error("Serial port problem")]
    Serial(#[from] SerialPortError),

    /// The binary or log sink could not be written.
    #[error("Could not write capture output")]
    SinkWrite(#[source] io::Error),

    /// The configuration is invalid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A report could not be rendered as JSON.
    #[error("Could not serialize report")]
    Json(#[from] serde_json::Error),

    /// Other IO related errors.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),
}

impl Error {
    /// If this is a [`Error::BadConfig`], get the message.
    pub fn try_into_bad_config(self) -> Option<String> {
        if let Self::BadConfig(message) = self {
            Some(message)
        } else {
            None
        }
    }

    /// True if the port could not be opened because the device does not exist.
    pub fn is_device_not_found(&self) -> bool {
        matches!(
            self,
            Error::PortOpen {
                problem: PortOpenProblem::NotFound,
                ..
            }
        )
    }
}
