//! The in-memory port behind the [`LineInterface`].
//! Incoming data is scripted, or produced via loopback:
//! bytes put on the wire are instead sent back.
//!
//! Useful for testing implementations which would use
//! regular serial ports- but faster and more reliable.

use async_trait::async_trait;
use tracing::trace;

use super::{LineInterface, PortSettings};
use crate::{error::Error, line::LineName, mock::MockHandle};

#[async_trait]
impl LineInterface for MockHandle {
    fn name(&self) -> &str {
        &self.settings.path
    }

    fn settings(&self) -> &PortSettings {
        &self.settings
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        let chunk = {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::PortClosed(self.settings.path.clone()));
            }

            match state.incoming.pop_front() {
                Some(mut chunk) if chunk.len() > max_bytes => {
                    let rest = chunk.split_off(max_bytes);
                    state.incoming.push_front(rest);
                    Some(chunk)
                }
                other => other,
            }
        };

        match chunk {
            Some(chunk) => {
                trace!("Mock read {} byte(s)", chunk.len());
                Ok(chunk)
            }
            None => {
                tokio::time::sleep(self.settings.read_timeout).await;
                Ok(vec![])
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::PortClosed(self.settings.path.clone()));
        }

        state.written.extend_from_slice(bytes);
        if state.loopback && !bytes.is_empty() {
            state.incoming.push_back(bytes.to_vec());
        }

        Ok(bytes.len())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if self.lock().closed {
            return Err(Error::PortClosed(self.settings.path.clone()));
        }

        Ok(())
    }

    fn read_line(&mut self, line: LineName) -> Result<bool, Error> {
        let state = self.lock();
        if state.closed {
            return Err(Error::PortClosed(self.settings.path.clone()));
        }
        if state.unreadable.contains(&line) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{line} not exposed by this adapter"),
            )));
        }

        Ok(state.lines.get(&line).copied().unwrap_or(false))
    }

    fn write_line(&mut self, line: LineName, value: bool) -> Result<(), Error> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::PortClosed(self.settings.path.clone()));
        }
        if state.undrivable.contains(&line) {
            return Err(Error::LineControl {
                line,
                problem: "not supported by this adapter".into(),
            });
        }

        state.lines.insert(line, value);
        state.driven.push((line, value));

        let sensed = state
            .wiring
            .iter()
            .filter(|(drive, _)| *drive == line)
            .map(|(_, sense)| *sense)
            .collect::<Vec<_>>();
        for sense in sensed {
            state.lines.insert(sense, value);
        }

        Ok(())
    }

    fn reset_buffers(&mut self) -> Result<(), Error> {
        let mut state = self.lock();
        state.incoming.clear();
        state.resets += 1;

        Ok(())
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
