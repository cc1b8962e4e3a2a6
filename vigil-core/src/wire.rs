//! Fixed-frame sensor wire codec
//!
//! Every sensor message is exactly 64 ASCII bytes: the payload, an `@`
//! delimiter, then `0` padding to the frame length. Decoding takes
//! everything before the first `@` and discards the rest.

use thiserror::Error;

/// Wire frame length in bytes
pub const FRAME_LEN: usize = 64;

const DELIMITER: u8 = b'@';
const PADDING: u8 = b'0';

/// Errors from encoding or decoding a wire frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The payload plus its delimiter does not fit the frame.
    #[error("payload of {0} bytes does not fit a {FRAME_LEN}-byte frame")]
    PayloadTooLong(usize),

    /// A decoded buffer was not exactly one frame long.
    #[error("frame is {0} bytes, expected {FRAME_LEN}")]
    BadFrameLength(usize),

    /// The frame carries no `@` delimiter.
    #[error("frame has no payload delimiter")]
    MissingDelimiter,

    /// The payload bytes are not valid UTF-8.
    #[error("payload is not valid text")]
    InvalidPayload,
}

/// Encode a payload into one wire frame (the producer-side contract).
///
/// The payload and its delimiter must fit the 64-byte frame, so the
/// maximum payload is 63 bytes.
pub fn encode_frame(payload: &str) -> Result<[u8; FRAME_LEN], WireError> {
    if payload.len() > FRAME_LEN - 1 {
        return Err(WireError::PayloadTooLong(payload.len()));
    }

    let mut frame = [PADDING; FRAME_LEN];
    frame[..payload.len()].copy_from_slice(payload.as_bytes());
    frame[payload.len()] = DELIMITER;
    Ok(frame)
}

/// Decode one wire frame into its payload string.
pub fn decode_frame(frame: &[u8]) -> Result<String, WireError> {
    if frame.len() != FRAME_LEN {
        return Err(WireError::BadFrameLength(frame.len()));
    }

    let end = frame
        .iter()
        .position(|&b| b == DELIMITER)
        .ok_or(WireError::MissingDelimiter)?;

    std::str::from_utf8(&frame[..end])
        .map(str::to_string)
        .map_err(|_| WireError::InvalidPayload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = "1.2.3.4:80-10.0.0.5:22";
        let frame = encode_frame(payload).unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(decode_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn test_round_trip_all_lengths_under_frame() {
        for len in 0..FRAME_LEN {
            let payload = "x".repeat(len);
            let frame = encode_frame(&payload).unwrap();
            assert_eq!(decode_frame(&frame).unwrap(), payload, "len {len}");
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = "x".repeat(FRAME_LEN);
        let err = encode_frame(&payload).unwrap_err();
        assert_eq!(err, WireError::PayloadTooLong(FRAME_LEN));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode_frame(b"short").unwrap_err();
        assert_eq!(err, WireError::BadFrameLength(5));
    }

    #[test]
    fn test_decode_rejects_missing_delimiter() {
        let frame = [b'x'; FRAME_LEN];
        let err = decode_frame(&frame).unwrap_err();
        assert_eq!(err, WireError::MissingDelimiter);
    }

    #[test]
    fn test_decode_discards_everything_after_delimiter() {
        let mut frame = [b'0'; FRAME_LEN];
        frame[..5].copy_from_slice(b"abc@z");
        assert_eq!(decode_frame(&frame).unwrap(), "abc");
    }
}
