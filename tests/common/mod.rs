#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use color_eyre::Result;
use rs232_probe::{
    capture::{CaptureEngine, CaptureOptions, CaptureReport},
    error::Error,
    mock::MockHandle,
};
use tempfile::TempDir;
use tokio::{fs::File, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Level;

pub async fn init() {
    rs232_probe::logging::init(Level::DEBUG, None).await;
}

/// Capture files in a scratch directory.
pub struct Sinks {
    _dir: TempDir,
    pub binary: PathBuf,
    pub log: PathBuf,
}

impl Sinks {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let binary = dir.path().join("capture.bin");
        let log = dir.path().join("capture.log");

        Ok(Self {
            _dir: dir,
            binary,
            log,
        })
    }

    pub async fn open(&self, with_log: bool) -> Result<(File, Option<File>)> {
        let binary = File::create(&self.binary).await?;
        let log = if with_log {
            Some(File::create(&self.log).await?)
        } else {
            None
        };

        Ok((binary, log))
    }

    pub fn binary_bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.binary)?)
    }

    pub fn log_lines(&self) -> Result<Vec<String>> {
        Ok(std::fs::read_to_string(&self.log)?
            .lines()
            .map(ToString::to_string)
            .collect())
    }

    /// Log lines that are hex records, i.e. not annotations.
    pub fn records(&self) -> Result<Vec<String>> {
        Ok(self
            .log_lines()?
            .into_iter()
            .filter(|line| !line.starts_with('#'))
            .collect())
    }
}

/// Run a capture on `mock` into fresh sinks.
pub async fn capture(
    mock: &mut MockHandle,
    options: CaptureOptions,
    with_log: bool,
    cancel: CancellationToken,
) -> Result<(Sinks, std::result::Result<CaptureReport, Error>)> {
    let sinks = Sinks::new()?;
    let (binary, log) = sinks.open(with_log).await?;

    let report = CaptureEngine::new(options)
        .run(mock, binary, log, cancel)
        .await;

    Ok((sinks, report))
}

/// Cancel `cancel` after `delay`.
pub fn cancel_after(cancel: &CancellationToken, delay: Duration) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        cancel.cancel();
    })
}

/// The offset and byte count of a hex record line.
pub fn parse_record(line: &str) -> (u64, usize) {
    let offset = u64::from_str_radix(&line[..8], 16).expect("Record should start with an offset");
    let count = line[10..58].split_whitespace().count();

    (offset, count)
}
