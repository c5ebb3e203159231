use std::{collections::BTreeMap, fmt::Display, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An RS232 modem control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineName {
    /// Request To Send. Driven by the host.
    Rts,
    /// Clear To Send. Driven by the remote.
    Cts,
    /// Data Terminal Ready. Driven by the host.
    Dtr,
    /// Data Set Ready. Driven by the remote.
    Dsr,
    /// Ring Indicator. Driven by the remote.
    Ri,
    /// Carrier Detect. Driven by the remote.
    Cd,
}

impl LineName {
    /// The lines the host drives.
    pub const HOST_OUTPUTS: [LineName; 2] = [LineName::Rts, LineName::Dtr];

    /// The lines the remote drives, in the order they are usually reported.
    pub const HOST_INPUTS: [LineName; 4] = [LineName::Cts, LineName::Dsr, LineName::Ri, LineName::Cd];

    /// True for RTS and DTR.
    pub fn is_host_output(self) -> bool {
        matches!(self, LineName::Rts | LineName::Dtr)
    }

    /// True for CTS, DSR, RI and CD.
    pub fn is_host_input(self) -> bool {
        !self.is_host_output()
    }

    /// Upper case wire name, e.g. `CTS`.
    pub fn as_str(self) -> &'static str {
        match self {
            LineName::Rts => "RTS",
            LineName::Cts => "CTS",
            LineName::Dtr => "DTR",
            LineName::Dsr => "DSR",
            LineName::Ri => "RI",
            LineName::Cd => "CD",
        }
    }
}

impl Display for LineName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LineName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rts" => Ok(LineName::Rts),
            "cts" => Ok(LineName::Cts),
            "dtr" => Ok(LineName::Dtr),
            "dsr" => Ok(LineName::Dsr),
            "ri" => Ok(LineName::Ri),
            "cd" | "dcd" => Ok(LineName::Cd),
            other => Err(Error::BadConfig(format!("`{other}` is not a control line"))),
        }
    }
}

/// Line states sampled together.
///
/// Only holds the lines that were asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot(BTreeMap<LineName, bool>);

impl LineSnapshot {
    /// Record the state of a line.
    pub fn insert(&mut self, line: LineName, state: bool) {
        self.0.insert(line, state);
    }

    /// The state of a line, if it was sampled.
    pub fn get(&self, line: LineName) -> Option<bool> {
        self.0.get(&line).copied()
    }

    /// Sampled lines in [`LineName`] order.
    pub fn iter(&self) -> impl Iterator<Item = (LineName, bool)> + '_ {
        self.0.iter().map(|(line, state)| (*line, *state))
    }

    /// Number of sampled lines.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was sampled.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(LineName, bool)> for LineSnapshot {
    fn from_iter<T: IntoIterator<Item = (LineName, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for LineSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (line, state) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{line}={}", u8::from(state))?;
        }
        Ok(())
    }
}

/// Assert a host output line for some time, then release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseSpec {
    line: LineName,
    duration: Duration,
}

impl PulseSpec {
    /// A pulse on `line`.
    ///
    /// Only RTS and DTR can be pulsed.
    pub fn new(line: LineName, duration: Duration) -> Result<Self, Error> {
        if !line.is_host_output() {
            return Err(Error::LineControl {
                line,
                problem: "only host output lines (RTS, DTR) can be pulsed".into(),
            });
        }

        Ok(Self { line, duration })
    }

    /// The line to pulse.
    pub fn line(&self) -> LineName {
        self.line
    }

    /// How long the line stays asserted.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
