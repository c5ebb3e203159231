use std::io::SeekFrom;

use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::{hexdump, CaptureState};
use crate::{error::Error, line::LineName};

/// The state of one capture: the sinks it owns and how far it got.
///
/// Sinks are released when the session is closed.
#[derive(Debug)]
pub struct CaptureSession<B, L> {
    started: DateTime<Local>,
    binary: B,
    log: Option<L>,
    offset: u64,
    monitor_line: Option<LineName>,
    last_state: Option<bool>,
    states: Vec<CaptureState>,
}

impl<B, L> CaptureSession<B, L>
where
    B: AsyncWrite + AsyncSeek + Unpin + Send,
    L: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(binary: B, log: Option<L>, monitor_line: Option<LineName>) -> Self {
        Self {
            started: Local::now(),
            binary,
            log,
            offset: 0,
            monitor_line,
            last_state: None,
            states: vec![],
        }
    }

    /// Bytes captured so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Where the session is in its lifecycle. `None` until the engine starts it.
    pub fn state(&self) -> Option<CaptureState> {
        self.states.last().copied()
    }

    /// Every state the session has been in, oldest first.
    pub fn states(&self) -> &[CaptureState] {
        &self.states
    }

    /// When the session was created.
    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    pub(crate) fn set_state(&mut self, state: CaptureState) {
        if self.state() != Some(state) {
            debug!(from = ?self.state(), to = ?state, "Capture state");
            self.states.push(state);
        }
    }

    /// Remember the monitored line's state. True if it differs from before.
    pub(crate) fn observe_monitor(&mut self, state: bool) -> bool {
        let changed = self.last_state.map_or(false, |last| last != state);
        self.last_state = Some(state);
        changed
    }

    /// Append a line to the log, if logging.
    pub(crate) async fn annotate(&mut self, text: &str) -> Result<(), Error> {
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };

        log.write_all(format!("# {text}\n").as_bytes())
            .await
            .map_err(Error::SinkWrite)?;
        log.flush().await.map_err(Error::SinkWrite)
    }

    pub(crate) async fn write_header(&mut self) -> Result<(), Error> {
        let start = format!("start {}", self.started.format("%Y-%m-%dT%H:%M:%S%.6f"));
        let line = format!(
            "monitor_line: {}",
            self.monitor_line
                .map_or_else(|| "none".to_string(), |line| line.to_string())
        );
        let initial = format!(
            "monitor initial: {}",
            self.last_state
                .map_or_else(|| "n/a".to_string(), |state| state.to_string())
        );

        for text in [start, line, initial] {
            self.annotate(&text).await?;
        }

        Ok(())
    }

    /// Log a transition of the monitored line.
    pub(crate) async fn annotate_change(&mut self, line: LineName, state: bool) -> Result<(), Error> {
        let now = Utc::now();
        self.annotate(&format!(
            "{line} changed: {state} at {}.{:03}",
            now.timestamp(),
            now.timestamp_subsec_millis()
        ))
        .await
    }

    /// Persist a chunk: binary first, then its hex/ASCII lines.
    ///
    /// With `seven_bit` the unmasked bytes are written and flushed first,
    /// then overwritten in place by the masked ones.
    pub(crate) async fn record_chunk(&mut self, mut chunk: Vec<u8>, seven_bit: bool) -> Result<(), Error> {
        self.binary
            .write_all(&chunk)
            .await
            .map_err(Error::SinkWrite)?;
        self.binary.flush().await.map_err(Error::SinkWrite)?;

        if seven_bit {
            chunk.iter_mut().for_each(|b| *b &= 0x7F);

            self.binary
                .seek(SeekFrom::Current(-(chunk.len() as i64)))
                .await
                .map_err(Error::SinkWrite)?;
            self.binary
                .write_all(&chunk)
                .await
                .map_err(Error::SinkWrite)?;
            self.binary.flush().await.map_err(Error::SinkWrite)?;
        }

        if let Some(log) = self.log.as_mut() {
            let mut text = String::new();
            for record in hexdump::records(self.offset, &chunk) {
                text += &format!("{record}\n");
            }
            log.write_all(text.as_bytes())
                .await
                .map_err(Error::SinkWrite)?;
            log.flush().await.map_err(Error::SinkWrite)?;
        }

        self.offset += chunk.len() as u64;
        trace!(bytes = chunk.len(), offset = self.offset, "Chunk captured");

        Ok(())
    }

    /// Shut down and drop both sinks.
    ///
    /// Both sinks are shut down even if the first one fails.
    pub(crate) async fn close(mut self) -> Result<(), Error> {
        let binary = self.binary.shutdown().await;
        let log = match self.log.as_mut() {
            Some(log) => log.shutdown().await,
            None => Ok(()),
        };

        binary.and(log).map_err(Error::SinkWrite)
    }
}
