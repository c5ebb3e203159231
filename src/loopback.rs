use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::{error::Error, interface::LineInterface, line::LineName, output};

/// What [`run_data_loopback`] writes when not told otherwise.
pub const DEFAULT_PATTERN: &[u8] = b"TEST-LOOPBACK-123\r\n";

/// The levels [`run_line_continuity`] drives when not told otherwise.
pub const DEFAULT_SEQUENCE: [bool; 3] = [true, false, true];

/// Wait between writing the pattern and reading it back.
pub const DATA_SETTLE: Duration = Duration::from_millis(150);

/// Wait between driving a line and sampling its partner.
pub const LINE_SETTLE: Duration = Duration::from_millis(100);

/// One step of a continuity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContinuityStep {
    /// The level we drove.
    pub driven: bool,

    /// The level we then saw on the sense line.
    pub sensed: bool,
}

/// The outcome of a cable test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopbackResult {
    /// Bytes written.
    pub bytes_written: usize,

    /// Bytes that came back.
    pub bytes_read: usize,

    /// The bytes that came back.
    pub received: Vec<u8>,

    /// Whether what came back equals what was written.
    pub matches: bool,

    /// The continuity sweep, if one was run.
    pub continuity: Vec<ContinuityStep>,
}

/// Write `pattern` and check that it comes back unchanged.
///
/// A short read back is reported as is, it is not retried.
pub async fn run_data_loopback(
    port: &mut dyn LineInterface,
    pattern: &[u8],
) -> Result<LoopbackResult, Error> {
    port.reset_buffers()?;

    let bytes_written = port.write(pattern).await?;
    port.flush().await?;

    tokio::time::sleep(DATA_SETTLE).await;

    let received = port.read_up_to(pattern.len()).await?;
    let matches = received == pattern;

    info!(
        written = bytes_written,
        read = received.len(),
        matches,
        "Data loopback"
    );

    Ok(LoopbackResult {
        bytes_written,
        bytes_read: received.len(),
        received,
        matches,
        continuity: vec![],
    })
}

/// Drive `drive` through `sequence`, sampling `sense` after each step.
///
/// Nothing is judged here, whether the pairs show a connection is up to the operator.
pub async fn run_line_continuity(
    port: &mut dyn LineInterface,
    drive: LineName,
    sense: LineName,
    sequence: &[bool],
) -> Result<Vec<ContinuityStep>, Error> {
    let mut steps = Vec::with_capacity(sequence.len());

    for &driven in sequence {
        output::assert_line(port, drive, driven)?;
        tokio::time::sleep(LINE_SETTLE).await;

        let sensed = port.get_line(sense);
        debug!(%drive, driven, %sense, sensed, "Continuity step");

        steps.push(ContinuityStep { driven, sensed });
    }

    Ok(steps)
}

/// Data loopback followed by a continuity sweep.
pub async fn run_cable_test(
    port: &mut dyn LineInterface,
    pattern: &[u8],
    drive: LineName,
    sense: LineName,
    sequence: &[bool],
) -> Result<LoopbackResult, Error> {
    let mut result = run_data_loopback(port, pattern).await?;
    result.continuity = run_line_continuity(port, drive, sense, sequence).await?;

    Ok(result)
}
