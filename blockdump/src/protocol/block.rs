//! Text request/response block protocol.
//!
//! The host asks for one block at a time with a single ASCII line:
//!
//! ```text
//! printblock:<index>\n
//! ```
//!
//! The device answers with the block as a run of text lines. There is no
//! terminator and no length prefix. A response is considered complete once it
//! holds strictly more than [`NEWLINE_THRESHOLD`] newline bytes; the device is
//! expected to emit more lines than that for every full block and never for a
//! partial one. Devices whose per-block line count sits close to the
//! threshold will produce false completions or spurious timeouts.

/// Command prefix of a block request.
pub const REQUEST_PREFIX: &str = "printblock:";

/// A response is complete once its newline count is strictly greater than this.
pub const NEWLINE_THRESHOLD: usize = 256;

/// Line terminator byte counted by the completion predicate.
pub const LF: u8 = b'\n';

/// Framing byte stripped from the end of every completed block.
pub const CR: u8 = b'\r';

/// Encode the request for `index` as raw bytes.
pub fn request_command(index: u32) -> Vec<u8> {
    format!("{REQUEST_PREFIX}{index}\n").into_bytes()
}

/// Count newline bytes in `data`.
pub fn count_newlines(data: &[u8]) -> usize {
    data.iter()
        .filter(|&&b| b == LF)
        .count()
}

/// Completion predicate: strictly more than `threshold` newlines.
pub fn exceeds_newline_threshold(newlines: usize, threshold: usize) -> bool {
    newlines > threshold
}

/// Strip trailing carriage-return bytes, keeping any that are not trailing.
pub fn strip_trailing_cr(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|&b| b != CR)
        .map_or(0, |i| i + 1);
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_command_exact_bytes() {
        assert_eq!(request_command(0), b"printblock:0\n");
        assert_eq!(request_command(7), b"printblock:7\n");
        assert_eq!(request_command(15624), b"printblock:15624\n");
    }

    #[test]
    fn test_request_command_has_no_padding() {
        for index in [0u32, 9, 10, 99, 100, 1000, u32::MAX] {
            let cmd = request_command(index);
            let expected = format!("printblock:{index}\n");
            assert_eq!(cmd, expected.as_bytes());
            assert_eq!(
                cmd.iter()
                    .filter(|&&b| b == LF)
                    .count(),
                1
            );
        }
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        assert!(!exceeds_newline_threshold(255, NEWLINE_THRESHOLD));
        assert!(!exceeds_newline_threshold(256, NEWLINE_THRESHOLD));
        assert!(exceeds_newline_threshold(257, NEWLINE_THRESHOLD));
    }

    #[test]
    fn test_count_newlines_ignores_carriage_returns() {
        assert_eq!(count_newlines(b"a\r\nb\r\nc"), 2);
        assert_eq!(count_newlines(b""), 0);
        assert_eq!(count_newlines(b"\r\r\r"), 0);
    }

    #[test]
    fn test_strip_trailing_cr_only_at_end() {
        assert_eq!(strip_trailing_cr(b"ab\r\ncd\r\r\r"), b"ab\r\ncd");
        assert_eq!(strip_trailing_cr(b"\rab"), b"\rab");
        assert_eq!(strip_trailing_cr(b"ab\n"), b"ab\n");
    }

    #[test]
    fn test_strip_trailing_cr_all_cr_and_empty() {
        assert_eq!(strip_trailing_cr(b"\r\r"), b"");
        assert_eq!(strip_trailing_cr(b""), b"");
    }
}
