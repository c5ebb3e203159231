#![deny(missing_docs)]

//! Capture and diagnose data coming in over an RS232 line.
//!
//! A capture optionally primes one of the host driven lines (RTS, DTR),
//! waits for the remote to assert one of its lines (CTS, DSR, RI, CD),
//! and then writes every received byte to a binary file.
//! A hex/ASCII log with line change annotations can be written alongside.
//!
//! For checking cables and adapters there is a TX->RX loopback test,
//! a line continuity sweep, a line watcher and a byte echo.
//!
//! Everything talks to the port through [`interface::LineInterface`],
//! so the in-memory [`mock`] can stand in for real hardware.

/// RS232 control line names and line state snapshots.
pub mod line;

/// Possible errors in this library.
pub mod error;

/// The port abstraction used by everything else.
pub mod interface;

/// Opening real serial ports.
pub mod serial;

/// An in-memory port for tests and dry runs.
pub mod mock;

/// Reading the remote driven control lines.
pub mod monitor;

/// Driving the host control lines.
pub mod output;

/// Capturing incoming bytes to files.
pub mod capture;

/// Cable tests: data loopback and line continuity.
pub mod loopback;

/// Port diagnostics.
pub mod diagnose;

/// Send received bytes back.
pub mod echo;

/// Configuration file.
pub mod config;

/// Command line interface.
pub mod cli;

/// Command runners behind the command line interface.
pub mod commands;

/// Tracing setup.
pub mod logging;
