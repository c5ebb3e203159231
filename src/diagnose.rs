use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    capture::hexdump,
    error::Error,
    interface::{LineInterface, MAX_READ},
    line::{LineName, LineSnapshot},
    monitor::ControlLineMonitor,
    output,
};

/// How long [`run`] listens by default.
pub const DEFAULT_LISTEN: Duration = Duration::from_secs(10);

/// Longest listen [`run`] honours. Longer requests are cut to this.
pub const MAX_LISTEN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Wait after raising RTS and DTR before reading them back.
pub const DRIVE_SETTLE: Duration = Duration::from_millis(100);

/// What [`run`] found out about a port.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// Port path.
    pub port: String,

    /// E.g. `9600 8N1`.
    pub framing: String,

    /// Whether the driver handles RTS/CTS.
    pub hardware_flow_control: bool,

    /// Remote driven lines right after opening.
    pub input_lines: LineSnapshot,

    /// RTS and DTR after trying to raise them.
    pub output_lines: LineSnapshot,

    /// Output lines that could not be raised.
    pub drive_failures: Vec<String>,

    /// Every chunk received while listening, rendered as hex/ASCII lines.
    pub dumps: Vec<Vec<String>>,

    /// Total bytes received while listening.
    pub bytes_received: u64,
}

/// Report the port setup and line states, raise RTS and DTR,
/// then listen for `listen` (or until cancelled), counting what arrives.
pub async fn run(
    port: &mut dyn LineInterface,
    listen: Duration,
    cancel: CancellationToken,
) -> Result<DiagnosticReport, Error> {
    let monitor = ControlLineMonitor::default();
    let settings = port.settings().clone();

    let input_lines = monitor.sample(port, &LineName::HOST_INPUTS);
    info!(lines = %input_lines, "Input lines");

    let mut drive_failures = vec![];
    for line in LineName::HOST_OUTPUTS {
        if let Err(e) = output::assert_line(port, line, true) {
            drive_failures.push(e.to_string());
        }
    }
    tokio::time::sleep(DRIVE_SETTLE).await;
    let output_lines = monitor.sample(port, &LineName::HOST_OUTPUTS);

    info!(?listen, "Listening");

    let now = Instant::now();
    let deadline = now
        .checked_add(listen.min(MAX_LISTEN))
        .unwrap_or(now + MAX_LISTEN);
    let mut dumps = vec![];
    let mut bytes_received = 0;

    while Instant::now() < deadline && !cancel.is_cancelled() {
        let chunk = tokio::select! {
            chunk = port.read(MAX_READ) => chunk?,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = cancel.cancelled() => break,
        };

        if chunk.is_empty() {
            continue;
        }

        info!("Received {} byte(s)", chunk.len());
        bytes_received += chunk.len() as u64;
        dumps.push(
            hexdump::records(0, &chunk)
                .map(|record| record.to_string())
                .collect(),
        );
    }

    if bytes_received == 0 {
        warn!("Nothing received");
    }

    Ok(DiagnosticReport {
        port: settings.path.clone(),
        framing: settings.framing(),
        hardware_flow_control: settings.hardware_flow_control,
        input_lines,
        output_lines,
        drive_failures,
        dumps,
        bytes_received,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockBuilder;

    #[tokio::test(start_paused = true)]
    async fn reports_lines_and_data() {
        let mut mock = MockBuilder::new("mock")
            .set_line(LineName::Dsr, true)
            .add_chunk(b"HELLO\r")
            .add_chunk([0xAAu8; 20])
            .build();

        let report = run(&mut mock, Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.framing, "9600 8N1");
        assert_eq!(report.input_lines.get(LineName::Dsr), Some(true));
        assert_eq!(report.input_lines.get(LineName::Cts), Some(false));
        assert_eq!(report.output_lines.get(LineName::Rts), Some(true));
        assert_eq!(report.output_lines.get(LineName::Dtr), Some(true));
        assert!(report.drive_failures.is_empty());

        assert_eq!(report.bytes_received, 26);
        assert_eq!(report.dumps.len(), 2);
        assert!(report.dumps[0][0].ends_with("|HELLO.|"));
        assert_eq!(report.dumps[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undrivable_output_is_reported() {
        let mut mock = MockBuilder::new("mock").undrivable(LineName::Rts).build();

        let report = run(&mut mock, Duration::from_millis(200), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.drive_failures.len(), 1);
        assert_eq!(report.output_lines.get(LineName::Dtr), Some(true));
        assert_eq!(report.bytes_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listening_stops_at_the_deadline() {
        let mut mock = MockBuilder::new("mock")
            .set_read_timeout(Duration::from_secs(5))
            .build();

        let start = Instant::now();
        run(&mut mock, Duration::from_secs(2), CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_listen_is_cut_short_by_cancel() {
        let mut mock = MockBuilder::new("mock").build();
        let cancel = CancellationToken::new();

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            })
        };

        let report = run(&mut mock, Duration::from_secs(u64::MAX), cancel)
            .await
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(report.bytes_received, 0);
    }
}
