use std::{collections::BTreeSet, time::Duration};

use chrono::Local;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::Error,
    interface::LineInterface,
    line::{LineName, LineSnapshot},
};

/// How often [`ControlLineMonitor::wait_for_assertion`] samples.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The default interval used by [`watch_lines`].
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The CSV header written by [`watch_lines`].
pub const WATCH_HEADER: &str = "time,cts,dsr,ri,cd";

/// The result of waiting for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Whether the line was seen asserted.
    /// `false` means we gave up after the timeout.
    pub asserted: bool,

    /// How long we waited.
    pub elapsed: Duration,
}

/// Samples remote driven lines.
#[derive(Debug, Clone)]
pub struct ControlLineMonitor {
    poll_interval: Duration,
}

impl Default for ControlLineMonitor {
    fn default() -> Self {
        Self {
            poll_interval: WAIT_POLL_INTERVAL,
        }
    }
}

impl ControlLineMonitor {
    /// A monitor polling at `poll_interval` while waiting.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Read the given lines.
    ///
    /// A line that cannot be read shows up as `false`.
    pub fn sample(&self, port: &mut dyn LineInterface, lines: &[LineName]) -> LineSnapshot {
        lines
            .iter()
            .map(|line| (*line, port.get_line(*line)))
            .collect()
    }

    /// Poll `line` until it is asserted or `timeout` has passed.
    ///
    /// Timing out is a normal outcome: remote devices come up whenever they feel like it.
    pub async fn wait_for_assertion(
        &self,
        port: &mut dyn LineInterface,
        line: LineName,
        timeout: Duration,
    ) -> WaitOutcome {
        let start = Instant::now();

        debug!(%line, ?timeout, "Waiting for assertion");

        loop {
            let asserted = port.get_line(line);
            let elapsed = start.elapsed();

            if asserted {
                info!(%line, ?elapsed, "Line asserted");
                return WaitOutcome { asserted, elapsed };
            }

            if elapsed >= timeout {
                info!(%line, ?elapsed, "Timed out waiting for line");
                return WaitOutcome { asserted, elapsed };
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// The lines whose state differs between two snapshots.
///
/// There is no debouncing, a noisy line will show up every time it flips.
pub fn detect_change(previous: &LineSnapshot, current: &LineSnapshot) -> BTreeSet<LineName> {
    current
        .iter()
        .filter(|(line, state)| previous.get(*line) != Some(*state))
        .map(|(line, _)| line)
        .chain(
            previous
                .iter()
                .filter(|(line, _)| current.get(*line).is_none())
                .map(|(line, _)| line),
        )
        .collect()
}

fn csv_record(snapshot: &LineSnapshot) -> String {
    let mut record = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    for line in LineName::HOST_INPUTS {
        record += if snapshot.get(line).unwrap_or(false) {
            ",1"
        } else {
            ",0"
        };
    }
    record
}

/// Watch all remote driven lines and write a CSV record to `sink` for every change.
///
/// The header is only written when `write_header` is set, so an existing file can be appended to.
/// Runs until `cancel` fires, returning the number of changes recorded.
pub async fn watch_lines<W>(
    port: &mut dyn LineInterface,
    interval: Duration,
    sink: &mut W,
    write_header: bool,
    cancel: CancellationToken,
) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin + Send,
{
    let monitor = ControlLineMonitor::new(interval);

    if write_header {
        sink.write_all(format!("{WATCH_HEADER}\n").as_bytes())
            .await
            .map_err(Error::SinkWrite)?;
        sink.flush().await.map_err(Error::SinkWrite)?;
    }

    let mut last = monitor.sample(port, &LineName::HOST_INPUTS);
    info!(lines = %last, "Watching lines");

    let mut changes = 0;

    while !cancel.is_cancelled() {
        let current = monitor.sample(port, &LineName::HOST_INPUTS);

        if !detect_change(&last, &current).is_empty() {
            debug!(lines = %current, "Lines changed");

            sink.write_all(format!("{}\n", csv_record(&current)).as_bytes())
                .await
                .map_err(Error::SinkWrite)?;
            sink.flush().await.map_err(Error::SinkWrite)?;

            changes += 1;
            last = current;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {}
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockBuilder;

    fn snapshot(lines: &[(LineName, bool)]) -> LineSnapshot {
        lines.iter().copied().collect()
    }

    #[test]
    fn no_change_against_itself() {
        let s = snapshot(&[(LineName::Cts, true), (LineName::Dsr, false)]);
        assert!(detect_change(&s, &s).is_empty());
        assert!(detect_change(&LineSnapshot::default(), &LineSnapshot::default()).is_empty());
    }

    #[test]
    fn every_flip_is_reported() {
        let previous = snapshot(&[(LineName::Cts, true), (LineName::Dsr, false), (LineName::Cd, false)]);
        let current = snapshot(&[(LineName::Cts, false), (LineName::Dsr, false), (LineName::Cd, true)]);

        let changed = detect_change(&previous, &current);
        assert_eq!(changed, BTreeSet::from([LineName::Cts, LineName::Cd]));
    }

    #[test]
    fn sample_degrades_unreadable_lines() {
        let mut mock = MockBuilder::new("mock")
            .set_line(LineName::Cts, true)
            .set_line(LineName::Dsr, true)
            .unreadable(LineName::Dsr)
            .build();

        let s = ControlLineMonitor::default().sample(&mut mock, &[LineName::Cts, LineName::Dsr]);

        assert_eq!(s, snapshot(&[(LineName::Cts, true), (LineName::Dsr, false)]));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_returns_after_one_sample() {
        let mut mock = MockBuilder::new("mock").build();

        let outcome = ControlLineMonitor::default()
            .wait_for_assertion(&mut mock, LineName::Cts, Duration::ZERO)
            .await;

        assert!(!outcome.asserted);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn already_asserted_returns_immediately() {
        let mut mock = MockBuilder::new("mock").set_line(LineName::Dsr, true).build();

        let outcome = ControlLineMonitor::default()
            .wait_for_assertion(&mut mock, LineName::Dsr, Duration::from_secs(30))
            .await;

        assert!(outcome.asserted);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_failing() {
        let mut mock = MockBuilder::new("mock").build();

        let outcome = ControlLineMonitor::default()
            .wait_for_assertion(&mut mock, LineName::Cts, Duration::from_secs(30))
            .await;

        assert!(!outcome.asserted);
        assert!(outcome.elapsed >= Duration::from_secs(30));
        assert!(outcome.elapsed < Duration::from_secs(30) + WAIT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sees_late_assertion() {
        let mut mock = MockBuilder::new("mock").build();
        let remote = mock.controller();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_050)).await;
            remote.set_line(LineName::Cts, true);
        });

        let outcome = ControlLineMonitor::default()
            .wait_for_assertion(&mut mock, LineName::Cts, Duration::from_secs(30))
            .await;

        assert!(outcome.asserted);
        assert_eq!(outcome.elapsed, Duration::from_millis(1_100));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_records_changes() {
        let mut mock = MockBuilder::new("mock").build();
        let remote = mock.controller();
        let cancel = CancellationToken::new();

        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            remote.set_line(LineName::Dsr, true);
            tokio::time::sleep(Duration::from_millis(120)).await;
            remote.set_line(LineName::Cd, true);
            tokio::time::sleep(Duration::from_millis(120)).await;
            stop.cancel();
        });

        let mut sink = vec![];
        let changes = watch_lines(&mut mock, WATCH_POLL_INTERVAL, &mut sink, true, cancel)
            .await
            .unwrap();

        assert_eq!(changes, 2);

        let text = String::from_utf8(sink).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], WATCH_HEADER);
        assert!(lines[1].ends_with(",0,1,0,0"));
        assert!(lines[2].ends_with(",0,1,0,1"));
    }
}
