use std::fmt::Display;

use itertools::Itertools;

/// Bytes per hex/ASCII line.
pub const BYTES_PER_RECORD: usize = 16;

// Two hex digits and a separating space per byte.
const HEX_PANE_WIDTH: usize = BYTES_PER_RECORD * 3;

/// One line of a hex/ASCII dump, e.g.
/// `00000010: 48 49 0D 0A ...  |HI..|`.
///
/// The offset is where the first byte sits in the whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexLogRecord<'a> {
    offset: u64,
    bytes: &'a [u8],
}

impl<'a> HexLogRecord<'a> {
    /// A record of at most [`BYTES_PER_RECORD`] bytes starting at `offset`.
    pub fn new(offset: u64, bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() <= BYTES_PER_RECORD);
        Self { offset, bytes }
    }

    /// Stream offset of the first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The bytes in this record.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Space separated upper case hex, e.g. `48 49 0D`.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).join(" ")
}

/// Printable ASCII as is, everything else as `.`.
pub fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

impl Display for HexLogRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = hex(self.bytes);
        let ascii = ascii(self.bytes);

        write!(
            f,
            "{:08X}: {hex:<width$}  |{ascii}|",
            self.offset,
            width = HEX_PANE_WIDTH
        )
    }
}

/// Split `data` into records, the first starting at `base_offset`.
pub fn records(base_offset: u64, data: &[u8]) -> impl Iterator<Item = HexLogRecord<'_>> {
    data.chunks(BYTES_PER_RECORD)
        .enumerate()
        .map(move |(index, chunk)| {
            HexLogRecord::new(base_offset + (index * BYTES_PER_RECORD) as u64, chunk)
        })
}
