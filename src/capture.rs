use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::{
    io::{AsyncSeek, AsyncWrite},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    error::Error,
    interface::{LineInterface, MAX_READ},
    line::{LineName, PulseSpec},
    monitor::{ControlLineMonitor, WaitOutcome},
    output,
};

/// Hex/ASCII rendering of captured bytes.
pub mod hexdump;

/// Per-capture state.
pub mod session;

pub use session::CaptureSession;

/// How long to wait for the monitored line before capturing anyway.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a read that returned nothing.
pub const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// Lifecycle of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    /// Waiting for the monitored line to be asserted.
    AwaitingGate,

    /// Reading bytes.
    Capturing,

    /// A configured limit was reached.
    Completed,

    /// The operator stopped the capture, or a sink failed.
    Interrupted,
}

/// Which limit ended a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionReason {
    /// The duration limit passed.
    Duration,

    /// The byte limit was reached.
    ByteLimit,
}

/// How a capture ended. Neither is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureOutcome {
    /// A limit was reached.
    Completed(CompletionReason),

    /// Operator cancellation. The normal end of an unbounded capture.
    Interrupted,
}

/// Optional limits. Without any, a capture runs until interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Stop after this long.
    pub duration: Option<Duration>,

    /// Stop after this many bytes.
    pub max_bytes: Option<u64>,
}

/// What a capture should do.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// The remote driven line to gate on and annotate.
    pub monitor_line: Option<LineName>,

    /// Wait for the monitored line before capturing.
    pub wait_for_monitor: bool,

    /// Give up waiting for the monitored line after this long.
    pub gate_timeout: Duration,

    /// The host output line the caller primed, if any.
    pub drive_line: Option<LineName>,

    /// Pulse a host output line once the header is written.
    pub pulse: Option<PulseSpec>,

    /// Clear the high bit of every byte.
    pub seven_bit: bool,

    /// When to stop on our own.
    pub limits: CaptureLimits,

    /// Largest single read.
    pub max_read: usize,

    /// Pause after an empty read.
    pub idle_sleep: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            monitor_line: None,
            wait_for_monitor: true,
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            drive_line: None,
            pulse: None,
            seven_bit: false,
            limits: CaptureLimits::default(),
            max_read: MAX_READ,
            idle_sleep: IDLE_SLEEP,
        }
    }
}

impl CaptureOptions {
    /// Check the options make sense together.
    ///
    /// A line may be driven by us or monitored, never both.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_read == 0 {
            return Err(Error::BadConfig("the read size must be at least one byte".into()));
        }

        let Some(monitor) = self.monitor_line else {
            return Ok(());
        };

        if monitor.is_host_output() {
            return Err(Error::BadConfig(format!(
                "{monitor} is driven by the host and cannot be monitored, pick one of CTS, DSR, RI or CD"
            )));
        }

        let driven = self
            .drive_line
            .into_iter()
            .chain(self.pulse.map(|pulse| pulse.line()));
        for line in driven {
            if line == monitor {
                return Err(Error::BadConfig(format!(
                    "{line} cannot be both driven and monitored"
                )));
            }
        }

        Ok(())
    }
}

/// Summary of a finished capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    /// How it ended.
    pub outcome: CaptureOutcome,

    /// When the capture started.
    pub started: DateTime<Local>,

    /// The state the capture ended in.
    pub final_state: CaptureState,

    /// Every state the capture went through, oldest first.
    pub states: Vec<CaptureState>,

    /// Bytes written to the binary sink.
    pub bytes_captured: u64,

    /// Wall clock time from start to end.
    pub elapsed: Duration,

    /// The result of waiting for the monitored line, if we waited.
    #[serde(skip)]
    pub gate: Option<WaitOutcome>,

    /// Number of observed transitions on the monitored line.
    pub line_changes: u64,
}

/// Capture file names derived from the start time,
/// `PREFIX-YYYYMMDD-HHMMSS.bin` and `.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePaths {
    /// Raw bytes.
    pub binary: PathBuf,

    /// Hex/ASCII log.
    pub log: PathBuf,
}

impl CapturePaths {
    /// Paths in `directory` for a capture starting at `timestamp`.
    pub fn new(directory: &Path, prefix: &str, timestamp: DateTime<Local>) -> Self {
        let stem = format!("{prefix}-{}", timestamp.format("%Y%m%d-%H%M%S"));

        Self {
            binary: directory.join(format!("{stem}.bin")),
            log: directory.join(format!("{stem}.log")),
        }
    }
}

/// Runs captures.
#[derive(Debug, Clone, Default)]
pub struct CaptureEngine {
    options: CaptureOptions,
    monitor: ControlLineMonitor,
}

impl CaptureEngine {
    /// An engine with the given options.
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            monitor: ControlLineMonitor::default(),
        }
    }

    /// The options in use.
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Capture from `port` into `binary` (and `log`, if given) until a limit
    /// is reached or `cancel` fires.
    ///
    /// The sinks are owned by the capture and released on every exit path.
    /// Cancellation is only acted upon between reads.
    pub async fn run<B, L>(
        &self,
        port: &mut dyn LineInterface,
        binary: B,
        log: Option<L>,
        cancel: CancellationToken,
    ) -> Result<CaptureReport, Error>
    where
        B: AsyncWrite + AsyncSeek + Unpin + Send,
        L: AsyncWrite + Unpin + Send,
    {
        self.options.validate()?;

        let span = info_span!("capture", port = %port.name());

        async move {
            let start = Instant::now();
            let mut session = CaptureSession::new(binary, log, self.options.monitor_line);

            let result = self.drive(port, &mut session, &cancel, start).await;

            if result.is_err() {
                session.set_state(CaptureState::Interrupted);
            }
            let closed = session.close().await;

            let report = match (result, closed) {
                (Ok(report), Ok(())) => report,
                (Ok(_), Err(e)) | (Err(e), _) => {
                    warn!(%e, "Capture aborted");
                    return Err(e);
                }
            };

            info!(
                outcome = ?report.outcome,
                bytes = report.bytes_captured,
                elapsed = ?report.elapsed,
                "Capture finished"
            );

            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn drive<B, L>(
        &self,
        port: &mut dyn LineInterface,
        session: &mut CaptureSession<B, L>,
        cancel: &CancellationToken,
        start: Instant,
    ) -> Result<CaptureReport, Error>
    where
        B: AsyncWrite + AsyncSeek + Unpin + Send,
        L: AsyncWrite + Unpin + Send,
    {
        let options = &self.options;
        let mut line_changes = 0;

        let report = |outcome, session: &CaptureSession<B, L>, gate, line_changes| CaptureReport {
            outcome,
            started: session.started(),
            final_state: session.state().unwrap_or(CaptureState::Interrupted),
            states: session.states().to_vec(),
            bytes_captured: session.offset(),
            elapsed: start.elapsed(),
            gate,
            line_changes,
        };

        let gate = match options.monitor_line {
            Some(line) if options.wait_for_monitor => {
                session.set_state(CaptureState::AwaitingGate);
                tokio::select! {
                    outcome = self.monitor.wait_for_assertion(port, line, options.gate_timeout) => Some(outcome),
                    _ = cancel.cancelled() => {
                        session.set_state(CaptureState::Interrupted);
                        return Ok(report(CaptureOutcome::Interrupted, session, None, 0));
                    }
                }
            }
            _ => None,
        };

        session.set_state(CaptureState::Capturing);

        if let Some(line) = options.monitor_line {
            session.observe_monitor(port.get_line(line));
        }
        session.write_header().await?;

        if let Some(spec) = options.pulse {
            match output::pulse(port, spec).await {
                Ok(()) => {
                    session
                        .annotate(&format!(
                            "{} pulsed for {}ms",
                            spec.line(),
                            spec.duration().as_millis()
                        ))
                        .await?
                }
                Err(e) => warn!(%e, "Pulse failed, capturing without it"),
            }
        }

        loop {
            if cancel.is_cancelled() {
                session.set_state(CaptureState::Interrupted);
                return Ok(report(CaptureOutcome::Interrupted, session, gate, line_changes));
            }

            if let Some(limit) = options.limits.duration {
                if start.elapsed() >= limit {
                    session.set_state(CaptureState::Completed);
                    let outcome = CaptureOutcome::Completed(CompletionReason::Duration);
                    return Ok(report(outcome, session, gate, line_changes));
                }
            }

            let mut max_read = options.max_read;
            if let Some(limit) = options.limits.max_bytes {
                let remaining = limit.saturating_sub(session.offset());
                if remaining == 0 {
                    session.set_state(CaptureState::Completed);
                    let outcome = CaptureOutcome::Completed(CompletionReason::ByteLimit);
                    return Ok(report(outcome, session, gate, line_changes));
                }
                max_read = max_read.min(remaining.try_into().unwrap_or(usize::MAX));
            }

            if let Some(line) = options.monitor_line {
                let state = port.get_line(line);
                if session.observe_monitor(state) {
                    debug!(%line, state, "Monitored line changed");
                    line_changes += 1;
                    session.annotate_change(line, state).await?;
                }
            }

            let chunk = port.read(max_read).await?;

            if chunk.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(options.idle_sleep) => {}
                    _ = cancel.cancelled() => {}
                }
                continue;
            }

            info!(
                "+{} bytes | ASCII: {} | HEX: {}",
                chunk.len(),
                hexdump::ascii(&chunk),
                hexdump::hex(&chunk)
            );
            session.record_chunk(chunk, options.seven_bit).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn file_names_follow_start_time() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();

        let paths = CapturePaths::new(Path::new("captures"), "llist", timestamp);

        assert_eq!(paths.binary, PathBuf::from("captures/llist-20240309-070502.bin"));
        assert_eq!(paths.log, PathBuf::from("captures/llist-20240309-070502.log"));
    }

    #[test]
    fn monitoring_a_host_output_is_rejected() {
        let options = CaptureOptions {
            monitor_line: Some(LineName::Rts),
            ..Default::default()
        };

        let err = options.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("RTS"));
    }

    #[test]
    fn pulsing_the_monitored_line_is_rejected() {
        // Not constructible through PulseSpec::new for input lines,
        // but the driven line must still differ from the monitored one.
        let options = CaptureOptions {
            monitor_line: Some(LineName::Cts),
            drive_line: Some(LineName::Rts),
            pulse: Some(PulseSpec::new(LineName::Dtr, Duration::from_millis(5)).unwrap()),
            ..Default::default()
        };
        options.validate().unwrap();

        let options = CaptureOptions {
            max_read: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
