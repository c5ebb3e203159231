//! A real serial port behind the [`LineInterface`].

use async_trait::async_trait;
use serialport::{ClearBuffer, SerialPort};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialStream;
use tracing::{debug, trace};

use super::{LineInterface, PortSettings};
use crate::{
    error::Error,
    line::LineName,
    serial::{
        error::SerialPortError,
        serial_port::{output_level, SerialPortHandle},
    },
};

impl SerialPortHandle {
    fn stream(&mut self) -> Result<&mut SerialStream, Error> {
        let path = &self.settings.path;
        self.stream
            .as_mut()
            .ok_or_else(|| Error::PortClosed(path.clone()))
    }
}

#[async_trait]
impl LineInterface for SerialPortHandle {
    fn name(&self) -> &str {
        &self.settings.path
    }

    fn settings(&self) -> &PortSettings {
        &self.settings
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        let timeout = self.settings.read_timeout;
        let stream = self.stream()?;
        let mut buf = vec![0; max_bytes];

        let n = match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Ok(result) => result.map_err(SerialPortError::from)?,
            Err(_elapsed) => 0,
        };
        buf.truncate(n);

        if n > 0 {
            trace!("Read {n} byte(s): `{:?}`", &buf[..n.min(32)]);
        }

        Ok(buf)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let stream = self.stream()?;
        stream
            .write_all(bytes)
            .await
            .map_err(SerialPortError::from)?;

        Ok(bytes.len())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let stream = self.stream()?;
        stream.flush().await.map_err(SerialPortError::from)?;

        Ok(())
    }

    fn read_line(&mut self, line: LineName) -> Result<bool, Error> {
        let (rts, dtr) = (self.rts, self.dtr);
        let stream = self.stream()?;

        let state = match line {
            LineName::Cts => stream.read_clear_to_send(),
            LineName::Dsr => stream.read_data_set_ready(),
            LineName::Ri => stream.read_ring_indicator(),
            LineName::Cd => stream.read_carrier_detect(),
            LineName::Rts => return Ok(output_level(rts)),
            LineName::Dtr => return Ok(output_level(dtr)),
        };

        Ok(state.map_err(SerialPortError::from)?)
    }

    fn write_line(&mut self, line: LineName, value: bool) -> Result<(), Error> {
        let stream = self.stream()?;

        let result = match line {
            LineName::Rts => stream.write_request_to_send(value),
            LineName::Dtr => stream.write_data_terminal_ready(value),
            other => {
                return Err(Error::LineControl {
                    line: other,
                    problem: "input-only line".into(),
                })
            }
        };
        result.map_err(|e| Error::LineControl {
            line,
            problem: e.to_string(),
        })?;

        match line {
            LineName::Rts => self.rts = Some(value),
            LineName::Dtr => self.dtr = Some(value),
            _ => {}
        }

        Ok(())
    }

    fn reset_buffers(&mut self) -> Result<(), Error> {
        let stream = self.stream()?;
        stream
            .clear(ClearBuffer::All)
            .map_err(SerialPortError::from)?;

        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(path = %self.settings.path, "Port closed");
        }
    }
}
