//! Incremental Command Decoder
//!
//! This module decodes client commands from a byte buffer that the caller
//! owns and appends to as network data arrives. TCP is a stream protocol, so
//! a read may deliver half a command or several commands at once; the decoder
//! handles both by reporting exactly how many leading bytes each complete
//! command consumed and by never consuming anything on incomplete input.
//!
//! ## How decoding works
//!
//! [`decode_command`] returns one of:
//! - `Ok(Some((args, consumed)))` - one complete command, `consumed` leading
//!   bytes were used; the caller advances its buffer by that amount
//! - `Ok(None)` - the buffer does not yet hold a full command; zero bytes
//!   are consumed and the caller should wait for more data
//! - `Err(ParseError)` - the bytes violate the protocol; the connection
//!   layer reports the error and resets its buffer
//!
//! ## Grammar
//!
//! Two top-level forms, chosen by the first byte of the buffer:
//!
//! - **Array form** (`*`): `*<N>\r\n` followed by N bulk strings, each
//!   `$<L>\r\n<L bytes>\r\n`. Binary-safe; payload bytes are copied
//!   verbatim. Array framing accepts `\r\n` terminators only.
//! - **Inline form** (any other first byte): a single line terminated by
//!   `\r\n` or a bare `\n`, split on ASCII spaces into arguments. This is
//!   what a human typing into `nc` produces.

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Inline line with no tokens on it
    #[error("empty command")]
    EmptyCommand,

    /// Array header count is negative or not a number
    #[error("invalid multibulk length")]
    InvalidArrayLength,

    /// Bulk string length is negative or not a number
    #[error("invalid bulk length")]
    InvalidBulkLength,

    /// Array element did not start with `$`
    #[error("expected '$', got {0:#04x}")]
    ExpectedBulk(u8),

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingBulkTerminator,

    /// A single bulk string exceeds the maximum allowed size
    #[error("bulk string too large: {size} bytes (max: {max})")]
    BulkTooLarge { size: usize, max: usize },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Attempts to decode one command from the front of `buf`.
///
/// On success the command is returned as its argument vector (command name
/// first), together with the number of leading bytes consumed. On
/// incomplete input nothing is consumed.
pub fn decode_command(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] == b'*' {
        decode_array(buf)
    } else {
        decode_inline(buf)
    }
}

/// Decodes the array form: `*<N>\r\n` then N bulk strings.
fn decode_array(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    debug_assert!(buf[0] == b'*');

    let header_end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let count = match parse_decimal(&buf[1..1 + header_end]) {
        Some(n) if n >= 0 => n as usize,
        _ => return Err(ParseError::InvalidArrayLength),
    };

    let mut args = Vec::with_capacity(count);
    let mut consumed = 1 + header_end + 2;

    for _ in 0..count {
        match decode_bulk(&buf[consumed..])? {
            Some((arg, used)) => {
                args.push(arg);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((args, consumed)))
}

/// Decodes a single bulk string: `$<L>\r\n<L bytes>\r\n`.
fn decode_bulk(buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != b'$' {
        return Err(ParseError::ExpectedBulk(buf[0]));
    }

    let len_end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let len = match parse_decimal(&buf[1..1 + len_end]) {
        Some(n) if n >= 0 => n as usize,
        _ => return Err(ParseError::InvalidBulkLength),
    };

    if len > MAX_BULK_SIZE {
        return Err(ParseError::BulkTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let data_start = 1 + len_end + 2;
    let total = data_start + len + 2;
    if buf.len() < total {
        return Ok(None);
    }

    if &buf[data_start + len..total] != b"\r\n" {
        return Err(ParseError::MissingBulkTerminator);
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + len]);
    Ok(Some((data, total)))
}

/// Decodes the inline form: one line, space-separated tokens.
///
/// The terminator may be `\r\n` or a bare `\n`. Tokens are raw bytes; no
/// UTF-8 validation is applied.
fn decode_inline(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    let nl = match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let mut line = &buf[..nl];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }

    let args: Vec<Bytes> = line
        .split(|&b| b == b' ')
        .filter(|tok| !tok.is_empty())
        .map(Bytes::copy_from_slice)
        .collect();

    if args.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    Ok(Some((args, nl + 1)))
}

/// Parses an ASCII signed decimal integer.
fn parse_decimal(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Finds the position of the first CRLF in the buffer.
///
/// Returns the position of `\r`, or None when no CRLF is present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Reply;

    fn args(parts: &[&[u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn test_decode_array_command() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (cmd, consumed) = decode_command(input).unwrap().unwrap();
        assert_eq!(cmd, args(&[b"GET", b"name"]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_empty_array() {
        let (cmd, consumed) = decode_command(b"*0\r\n").unwrap().unwrap();
        assert!(cmd.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_decode_empty_bulk_argument() {
        let input = b"*2\r\n$3\r\nSET\r\n$0\r\n\r\n";
        let (cmd, consumed) = decode_command(input).unwrap().unwrap();
        assert_eq!(cmd, args(&[b"SET", b""]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_decode_binary_safe_payload() {
        // 5-byte payload containing NUL, a non-UTF-8 byte, and a newline
        let input = b"*2\r\n$3\r\nGET\r\n$5\r\nk\x00\xff\ny\r\n";
        let (cmd, consumed) = decode_command(input).unwrap().unwrap();
        assert_eq!(cmd[0], Bytes::from(&b"GET"[..]));
        assert_eq!(cmd[1], Bytes::from(&b"k\x00\xff\ny"[..]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_incomplete_returns_none() {
        assert!(decode_command(b"*").unwrap().is_none());
        assert!(decode_command(b"*2\r").unwrap().is_none());
        assert!(decode_command(b"*2\r\n").unwrap().is_none());
        assert!(decode_command(b"*2\r\n$3\r\nGET\r\n$3\r\nke").unwrap().is_none());
    }

    #[test]
    fn test_every_prefix_is_incomplete() {
        // Feeding any strict prefix of a valid frame must yield None;
        // feeding the full frame yields the command and consumes everything.
        let frame = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        for i in 0..frame.len() {
            assert!(
                decode_command(&frame[..i]).unwrap().is_none(),
                "prefix of length {} should be incomplete",
                i
            );
        }
        let (cmd, consumed) = decode_command(frame).unwrap().unwrap();
        assert_eq!(cmd, args(&[b"SET", b"foo", b"bar"]));
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_trailing_bytes_not_consumed() {
        let input = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (cmd, consumed) = decode_command(input).unwrap().unwrap();
        assert_eq!(cmd, args(&[b"PING"]));
        assert_eq!(consumed, 14);
    }

    #[test]
    fn test_negative_array_count_is_error() {
        assert_eq!(
            decode_command(b"*-1\r\n").unwrap_err(),
            ParseError::InvalidArrayLength
        );
    }

    #[test]
    fn test_non_numeric_count_is_error() {
        assert_eq!(
            decode_command(b"*abc\r\n").unwrap_err(),
            ParseError::InvalidArrayLength
        );
    }

    #[test]
    fn test_bare_lf_in_array_header_is_error() {
        // A stray LF makes the header line non-numeric once the real CRLF
        // shows up.
        let input = b"*2\n$3\r\nGET\r\n";
        assert_eq!(
            decode_command(input).unwrap_err(),
            ParseError::InvalidArrayLength
        );
    }

    #[test]
    fn test_negative_bulk_length_is_error() {
        assert_eq!(
            decode_command(b"*1\r\n$-1\r\n").unwrap_err(),
            ParseError::InvalidBulkLength
        );
    }

    #[test]
    fn test_non_bulk_element_is_error() {
        assert_eq!(
            decode_command(b"*1\r\n:42\r\n").unwrap_err(),
            ParseError::ExpectedBulk(b':')
        );
    }

    #[test]
    fn test_missing_bulk_terminator_is_error() {
        assert_eq!(
            decode_command(b"*1\r\n$4\r\nPINGXY").unwrap_err(),
            ParseError::MissingBulkTerminator
        );
    }

    #[test]
    fn test_decode_inline_command() {
        let (cmd, consumed) = decode_command(b"SET foo bar\r\n").unwrap().unwrap();
        assert_eq!(cmd, args(&[b"SET", b"foo", b"bar"]));
        assert_eq!(consumed, 13);
    }

    #[test]
    fn test_decode_inline_bare_lf() {
        let (cmd, consumed) = decode_command(b"PING\n").unwrap().unwrap();
        assert_eq!(cmd, args(&[b"PING"]));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_inline_collapses_repeated_spaces() {
        let (cmd, _) = decode_command(b"  GET   foo \r\n").unwrap().unwrap();
        assert_eq!(cmd, args(&[b"GET", b"foo"]));
    }

    #[test]
    fn test_inline_without_newline_is_incomplete() {
        assert!(decode_command(b"PING").unwrap().is_none());
    }

    #[test]
    fn test_empty_inline_line_is_error() {
        assert_eq!(decode_command(b"\r\n").unwrap_err(), ParseError::EmptyCommand);
        assert_eq!(
            decode_command(b"   \r\n").unwrap_err(),
            ParseError::EmptyCommand
        );
    }

    #[test]
    fn test_empty_buffer_is_incomplete() {
        assert!(decode_command(b"").unwrap().is_none());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        // Encoding an argument vector as an array frame and decoding it
        // yields the original vector and consumes exactly the frame.
        let original = args(&[b"ZADD", b"board", b"1.5", b"alice", b""]);
        let frame = Reply::array(original.iter().cloned().map(Reply::Bulk).collect()).serialize();

        let (decoded, consumed) = decode_command(&frame).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert_eq!(consumed, frame.len());
    }
}
