use walrelay_types::WalEntry;

use crate::error::{WalError, WalResult};

/// Header size: 4 bytes payload length + 4 bytes CRC.
pub const FRAME_HEADER_LEN: usize = 8;

/// Upper bound on a single frame's payload. Lengths beyond this are
/// treated as corruption rather than allocated.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Encode one entry into a complete frame (header + payload).
pub fn encode_frame(entry: &WalEntry) -> WalResult<Vec<u8>> {
    let payload = bincode::serialize(entry).map_err(|e| WalError::Encoding(e.to_string()))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Split a raw header into `(payload_length, expected_crc)`.
pub fn parse_header(header: &[u8; FRAME_HEADER_LEN]) -> (u32, u32) {
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (length, crc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrelay_types::{Cell, WalEntry};

    #[test]
    fn encoded_frame_has_consistent_header() {
        let entry = WalEntry::new("t", 42).with_cell(Cell::new(
            b"row".to_vec(),
            b"fam".to_vec(),
            b"q".to_vec(),
            b"value".to_vec(),
        ));
        let frame = encode_frame(&entry).unwrap();
        assert!(frame.len() > FRAME_HEADER_LEN);

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&frame[..FRAME_HEADER_LEN]);
        let (length, crc) = parse_header(&header);
        let payload = &frame[FRAME_HEADER_LEN..];
        assert_eq!(length as usize, payload.len());
        assert_eq!(crc, crc32fast::hash(payload));
    }
}
