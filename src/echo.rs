use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{error::Error, interface::LineInterface, serial::describe_byte};

/// Send every received byte straight back, one at a time, until cancelled.
///
/// Returns how many bytes were echoed.
pub async fn run(port: &mut dyn LineInterface, cancel: CancellationToken) -> Result<u64, Error> {
    let mut echoed = 0;

    info!(port = %port.name(), "Echoing");

    loop {
        let received = tokio::select! {
            received = port.read(1) => received?,
            _ = cancel.cancelled() => break,
        };

        let Some(&byte) = received.first() else {
            continue;
        };

        info!("Received: {}", describe_byte(byte));

        port.write(&[byte]).await?;
        port.flush().await?;
        echoed += 1;
    }

    info!(echoed, "Echo stopped");

    Ok(echoed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockBuilder;

    #[tokio::test(start_paused = true)]
    async fn echoes_everything_back() {
        let mut mock = MockBuilder::new("mock")
            .add_chunk(b"PRINT")
            .add_chunk([0x0D])
            .build();
        let remote = mock.controller();
        let cancel = CancellationToken::new();

        let stop = cancel.clone();
        let watcher = remote.clone();
        tokio::spawn(async move {
            while watcher.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            stop.cancel();
        });

        let echoed = run(&mut mock, cancel).await.unwrap();

        assert_eq!(echoed, 6);
        assert_eq!(remote.written(), b"PRINT\r");
    }
}
