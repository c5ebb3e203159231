//! A mock, useful to test line handling without an actual serial port.
//!
//! The mock keeps its state behind a shared lock so that a [`MockController`]
//! can play the remote side while the [`MockHandle`] is in use.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tracing::info;

use crate::{interface::PortSettings, line::LineName};

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) incoming: VecDeque<Vec<u8>>,
    pub(crate) written: Vec<u8>,
    pub(crate) lines: BTreeMap<LineName, bool>,
    pub(crate) unreadable: BTreeSet<LineName>,
    pub(crate) undrivable: BTreeSet<LineName>,
    pub(crate) wiring: Vec<(LineName, LineName)>,
    pub(crate) driven: Vec<(LineName, bool)>,
    pub(crate) loopback: bool,
    pub(crate) resets: usize,
    pub(crate) closed: bool,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    // Nothing panics while holding the lock, so poisoning can be ignored.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builder for a [`MockHandle`].
#[derive(Debug)]
pub struct MockBuilder {
    name: String,
    read_timeout: Duration,
    state: MockState,
}

impl MockBuilder {
    /// A mock with the given name.
    /// Reads time out after 100 ms unless told otherwise.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            read_timeout: Duration::from_millis(100),
            state: MockState::default(),
        }
    }

    /// Set how long an empty read takes.
    pub fn set_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Anything written comes back as incoming data, like a TX->RX jumper.
    pub fn loopback(mut self) -> Self {
        self.state.loopback = true;
        self
    }

    /// Driving `drive` also sets `sense`, like a jumper between the two.
    pub fn wire(mut self, drive: LineName, sense: LineName) -> Self {
        self.state.wiring.push((drive, sense));
        self
    }

    /// Queue a chunk the remote "sends". Each chunk is delivered by its own read.
    pub fn add_chunk<B: AsRef<[u8]>>(mut self, chunk: B) -> Self {
        self.state.incoming.push_back(chunk.as_ref().to_vec());
        self
    }

    /// Set the initial state of a line.
    pub fn set_line(mut self, line: LineName, state: bool) -> Self {
        self.state.lines.insert(line, state);
        self
    }

    /// Reading this line fails.
    pub fn unreadable(mut self, line: LineName) -> Self {
        self.state.unreadable.insert(line);
        self
    }

    /// Driving this line fails.
    pub fn undrivable(mut self, line: LineName) -> Self {
        self.state.undrivable.insert(line);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> MockHandle {
        info!(name = %self.name, "Running mock");

        let settings = PortSettings {
            path: self.name,
            read_timeout: self.read_timeout,
            ..Default::default()
        };

        MockHandle {
            settings,
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

/// The port side of the mock.
#[derive(Debug)]
pub struct MockHandle {
    pub(crate) settings: PortSettings,
    pub(crate) state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// A controller for the remote side of this mock.
    pub fn controller(&self) -> MockController {
        MockController {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

/// The remote side of a mock.
#[derive(Debug, Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Queue more incoming data.
    pub fn push_chunk<B: AsRef<[u8]>>(&self, chunk: B) {
        lock(&self.state)
            .incoming
            .push_back(chunk.as_ref().to_vec());
    }

    /// Incoming bytes not read yet.
    pub fn pending(&self) -> usize {
        lock(&self.state).incoming.iter().map(Vec::len).sum()
    }

    /// Change a line as the remote would.
    pub fn set_line(&self, line: LineName, state: bool) {
        lock(&self.state).lines.insert(line, state);
    }

    /// Current level of a line.
    pub fn line(&self, line: LineName) -> bool {
        lock(&self.state).lines.get(&line).copied().unwrap_or(false)
    }

    /// Everything written to the port so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Every level driven on `line`, oldest first.
    pub fn driven(&self, line: LineName) -> Vec<bool> {
        lock(&self.state)
            .driven
            .iter()
            .filter(|(driven_line, _)| *driven_line == line)
            .map(|(_, value)| *value)
            .collect()
    }

    /// How many times buffers were reset.
    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }

    /// Whether the port side has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}
