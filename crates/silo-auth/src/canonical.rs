//! SigV4 canonicalization helpers
//!
//! URI encoding uses the RFC 3986 unreserved set (`A-Za-z0-9-_.~`) with
//! uppercase percent hex. Query strings are decoded and re-encoded so the
//! canonical form is independent of how the client chose to escape; the
//! request path is signed as received and never re-encoded.

use std::collections::BTreeMap;

/// Percent-encode `input` for canonicalization. `encode_slash` is false for
/// path segments, true for query keys and values.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// The canonical path: empty becomes `/`, everything else passes through.
pub fn canonical_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Parse a raw query string into decoded `(key, value)` pairs.
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_else(|_| key.to_string()),
                urlencoding::decode(value)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            )
        })
        .collect()
}

/// Build the canonical query string from decoded pairs: keys sorted, values
/// sorted within duplicate keys, both re-encoded.
pub fn canonical_query_string(mut pairs: Vec<(String, String)>) -> String {
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", uri_encode(&k, true), uri_encode(&v, true)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Fold the signed headers into canonical form: each lowercase name, a
/// colon, the trimmed value, a newline, in the order given by SignedHeaders.
pub fn canonical_headers(headers: &BTreeMap<String, String>, signed: &[String]) -> String {
    let mut result = String::new();
    for name in signed {
        let lower = name.to_lowercase();
        if let Some(value) = headers.get(&lower) {
            result.push_str(&lower);
            result.push(':');
            result.push_str(value.trim());
            result.push('\n');
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode_unreserved_passthrough() {
        assert_eq!(uri_encode("AZaz09-_.~", true), "AZaz09-_.~");
        assert_eq!(uri_encode("a b&c", true), "a%20b%26c");
        assert_eq!(uri_encode("a/b", false), "a/b");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
    }

    #[test]
    fn test_uri_encode_uses_uppercase_hex() {
        assert_eq!(uri_encode("\u{00e9}", true), "%C3%A9");
    }

    #[test]
    fn test_canonical_query_sorting() {
        let pairs = parse_query_pairs("b=2&a=1&a=0");
        assert_eq!(canonical_query_string(pairs), "a=0&a=1&b=2");
    }

    #[test]
    fn test_canonical_query_decode_then_reencode() {
        // The client escaped with lowercase hex; the canonical form uses
        // uppercase regardless.
        let pairs = parse_query_pairs("prefix=a%2fb");
        assert_eq!(canonical_query_string(pairs), "prefix=a%2Fb");
    }

    #[test]
    fn test_canonical_headers_order_and_trim() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "localhost:9000".to_string());
        headers.insert("x-amz-date".to_string(), "  20130524T000000Z ".to_string());

        let signed = vec!["host".to_string(), "x-amz-date".to_string()];
        assert_eq!(
            canonical_headers(&headers, &signed),
            "host:localhost:9000\nx-amz-date:20130524T000000Z\n"
        );
    }

    #[test]
    fn test_empty_path_becomes_root() {
        assert_eq!(canonical_path(""), "/");
        assert_eq!(canonical_path("/b/k"), "/b/k");
    }
}
