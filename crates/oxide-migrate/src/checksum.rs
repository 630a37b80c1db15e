//! Script checksums.
//!
//! A checksum is a CRC32 over the script's lines with line terminators
//! removed, so the same script checked out with LF or CRLF endings yields the
//! same value. It detects accidental edits to applied scripts; it is not a
//! tamper guarantee.

const BOM: char = '\u{feff}';

/// Computes the checksum of a script, as stored in the history table.
#[must_use]
pub fn checksum(content: &str) -> i32 {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let mut hasher = crc32fast::Hasher::new();
    for line in content.lines() {
        hasher.update(line.trim_end_matches('\r').as_bytes());
    }
    i32::from_ne_bytes(hasher.finalize().to_ne_bytes())
}
