//! `aws-chunked` body decoding
//!
//! Streaming SigV4 uploads frame the body as
//!
//! ```text
//! <hex-size>;chunk-signature=<sig>\r\n
//! <data>\r\n
//! 0;chunk-signature=<sig>\r\n
//! \r\n
//! ```
//!
//! The decoder extracts the logical payload so the engine stores raw object
//! bytes rather than the chunk envelope. Per-chunk signatures are not
//! verified.

use bytes::{Bytes, BytesMut};
use silo_core::{Error, Result};

/// True when the request body uses AWS chunked encoding: `Content-Encoding`
/// contains `aws-chunked`, or the content hash is the streaming marker.
pub fn is_aws_chunked(content_encoding: Option<&str>, content_sha256: Option<&str>) -> bool {
    if content_encoding.is_some_and(|ce| {
        ce.split(',')
            .any(|v| v.trim().eq_ignore_ascii_case("aws-chunked"))
    }) {
        return true;
    }
    content_sha256.is_some_and(|sha| sha.starts_with("STREAMING-"))
}

/// Decode an AWS-chunked body into the raw payload bytes.
pub fn decode_aws_chunked(body: &[u8]) -> Result<Bytes> {
    let mut output = BytesMut::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(body, pos).ok_or(Error::IncompleteBody)?;
        let size_line = &body[pos..line_end];

        // Size line: <hex-size>[;chunk-signature=<sig>][;ext]
        let hex_part = match size_line.iter().position(|&b| b == b';') {
            Some(semi) => &size_line[..semi],
            None => size_line,
        };

        let hex_str = std::str::from_utf8(hex_part)
            .map_err(|_| Error::InvalidRequest("Invalid chunk size encoding".into()))?;
        let chunk_size = usize::from_str_radix(hex_str.trim(), 16)
            .map_err(|_| Error::InvalidRequest(format!("Invalid chunk size '{}'", hex_str)))?;

        pos = line_end + 2;

        if chunk_size == 0 {
            break;
        }

        if pos + chunk_size > body.len() {
            return Err(Error::IncompleteBody);
        }
        output.extend_from_slice(&body[pos..pos + chunk_size]);
        pos += chunk_size;

        // Each data block is CRLF-terminated
        if pos + 2 > body.len() || body[pos] != b'\r' || body[pos + 1] != b'\n' {
            return Err(Error::IncompleteBody);
        }
        pos += 2;
    }

    Ok(output.freeze())
}

fn find_crlf(data: &[u8], start: usize) -> Option<usize> {
    if data.len() < start + 2 {
        return None;
    }
    data[start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| start + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_content_encoding() {
        assert!(is_aws_chunked(Some("aws-chunked"), None));
        assert!(is_aws_chunked(Some("gzip, aws-chunked"), None));
        assert!(!is_aws_chunked(Some("gzip"), None));
    }

    #[test]
    fn test_detects_streaming_sha256() {
        assert!(is_aws_chunked(
            None,
            Some("STREAMING-AWS4-HMAC-SHA256-PAYLOAD")
        ));
        assert!(!is_aws_chunked(None, Some("UNSIGNED-PAYLOAD")));
        assert!(!is_aws_chunked(None, None));
    }

    #[test]
    fn test_decode_single_chunk() {
        let body = b"5;chunk-signature=abc123\r\nhello\r\n0;chunk-signature=def456\r\n\r\n";
        assert_eq!(decode_aws_chunked(body).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_decode_multiple_chunks() {
        let body =
            b"5;chunk-signature=aaa\r\nhello\r\n6;chunk-signature=bbb\r\n world\r\n0;chunk-signature=ccc\r\n\r\n";
        assert_eq!(decode_aws_chunked(body).unwrap().as_ref(), b"hello world");
    }

    #[test]
    fn test_decode_without_signature_extension() {
        let body = b"3\r\nabc\r\n0\r\n\r\n";
        assert_eq!(decode_aws_chunked(body).unwrap().as_ref(), b"abc");
    }

    #[test]
    fn test_decode_empty_body() {
        let body = b"0;chunk-signature=abc\r\n\r\n";
        assert!(decode_aws_chunked(body).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_chunk_is_incomplete_body() {
        let body = b"10;chunk-signature=abc\r\nshort\r\n";
        assert!(matches!(
            decode_aws_chunked(body),
            Err(Error::IncompleteBody)
        ));
    }

    #[test]
    fn test_missing_size_line_is_incomplete_body() {
        assert!(matches!(
            decode_aws_chunked(b"5;chunk-signature=abc"),
            Err(Error::IncompleteBody)
        ));
    }

    #[test]
    fn test_garbage_size_is_invalid_request() {
        assert!(matches!(
            decode_aws_chunked(b"zz\r\ndata\r\n"),
            Err(Error::InvalidRequest(_))
        ));
    }
}
