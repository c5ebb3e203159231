use tracing::{debug, info, warn};

use crate::{
    error::Error,
    interface::LineInterface,
    line::{LineName, PulseSpec},
};

/// Drive a host output line to `value`.
pub fn assert_line(port: &mut dyn LineInterface, line: LineName, value: bool) -> Result<(), Error> {
    match port.set_line(line, value) {
        Ok(()) => {
            debug!(%line, value, "Line driven");
            Ok(())
        }
        Err(e) => {
            warn!(%line, value, %e, "Could not drive line");
            Err(e)
        }
    }
}

/// Invert the current level of a host output line, returning the new level.
pub fn toggle_line(port: &mut dyn LineInterface, line: LineName) -> Result<bool, Error> {
    let value = !port.get_line(line);
    assert_line(port, line, value)?;

    Ok(value)
}

/// Assert the pulse line, hold it for the pulse duration, then release it.
///
/// If the caller drops this future while it sleeps, the line stays asserted.
pub async fn pulse(port: &mut dyn LineInterface, spec: PulseSpec) -> Result<(), Error> {
    assert_line(port, spec.line(), true)?;
    tokio::time::sleep(spec.duration()).await;
    assert_line(port, spec.line(), false)?;

    info!(line = %spec.line(), duration = ?spec.duration(), "Pulsed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockBuilder;

    #[test]
    fn assert_and_release() {
        let mut mock = MockBuilder::new("mock").build();
        let remote = mock.controller();

        assert_line(&mut mock, LineName::Dtr, true).unwrap();
        assert!(remote.line(LineName::Dtr));

        assert_line(&mut mock, LineName::Dtr, false).unwrap();
        assert_eq!(remote.driven(LineName::Dtr), vec![true, false]);
    }

    #[test]
    fn driving_an_input_line_fails() {
        let mut mock = MockBuilder::new("mock").build();

        let err = assert_line(&mut mock, LineName::Cts, true).unwrap_err();
        assert!(matches!(err, Error::LineControl { line: LineName::Cts, .. }));
    }

    #[test]
    fn unsupported_output_line_fails() {
        let mut mock = MockBuilder::new("mock").undrivable(LineName::Rts).build();

        let err = assert_line(&mut mock, LineName::Rts, true).unwrap_err();
        assert!(matches!(err, Error::LineControl { line: LineName::Rts, .. }));

        // Other lines are unaffected.
        assert_line(&mut mock, LineName::Dtr, true).unwrap();
    }

    #[test]
    fn toggle_flips() {
        let mut mock = MockBuilder::new("mock").build();

        assert!(toggle_line(&mut mock, LineName::Rts).unwrap());
        assert!(!toggle_line(&mut mock, LineName::Rts).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_holds_for_duration() {
        let mut mock = MockBuilder::new("mock")
            .wire(LineName::Dtr, LineName::Dsr)
            .build();
        let remote = mock.controller();

        let observer = remote.clone();
        let seen = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            observer.line(LineName::Dsr)
        });

        let start = tokio::time::Instant::now();
        pulse(
            &mut mock,
            PulseSpec::new(LineName::Dtr, Duration::from_millis(250)).unwrap(),
        )
        .await
        .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(seen.await.unwrap(), "line should be high mid-pulse");
        assert_eq!(remote.driven(LineName::Dtr), vec![true, false]);
        assert!(!remote.line(LineName::Dsr));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pulse_leaves_line_asserted() {
        let mut mock = MockBuilder::new("mock").build();
        let remote = mock.controller();

        let spec = PulseSpec::new(LineName::Rts, Duration::from_secs(10)).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), pulse(&mut mock, spec)).await;

        assert!(result.is_err());
        assert_eq!(remote.driven(LineName::Rts), vec![true]);
    }
}
