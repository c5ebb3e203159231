/// Serial port related errors.
pub mod error;

/// The serial port structure.
pub mod serial_port;

/// Render bytes as `0xNN` / `'c' (0xNN)` for tracing.
pub(crate) fn describe_byte(byte: u8) -> String {
    if (0x20..=0x7E).contains(&byte) {
        format!("'{}' (0x{byte:02X})", byte as char)
    } else {
        format!("0x{byte:02X}")
    }
}

#[cfg(test)]
mod tests {
    use super::describe_byte;

    #[test]
    fn printable_bytes_show_their_character() {
        assert_eq!(describe_byte(b'A'), "'A' (0x41)");
        assert_eq!(describe_byte(0x0D), "0x0D");
        assert_eq!(describe_byte(0x7F), "0x7F");
    }
}
