//! Silo Crypto
//!
//! Digest and MAC helpers shared by the blob store and the signature
//! verifier.

use base64::{engine::general_purpose::STANDARD, Engine};
use digest::Digest;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::Sha256;

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn md5_base64(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Incremental MD5 for streaming writes. The blob store feeds it while
/// copying into a temp file so the digest never requires a second pass.
#[derive(Default)]
pub struct Md5Stream {
    hasher: Md5,
}

impl Md5Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Multipart upload ETag: MD5 over the concatenated binary part digests,
/// suffixed with the part count.
pub fn multipart_etag(part_etags: &[String]) -> String {
    let mut hasher = Md5::new();

    for etag in part_etags {
        let clean = etag.trim_matches('"');
        if let Ok(bytes) = hex::decode(clean) {
            hasher.update(&bytes);
        }
    }

    format!("{}-{}", hex::encode(hasher.finalize()), part_etags.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            md5_hex(b"Hello, World!"),
            "65a8e27d8879283831b664bd8b7f0ad4"
        );
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_md5_stream_matches_one_shot() {
        let mut stream = Md5Stream::new();
        stream.update(b"Hello, ");
        stream.update(b"World!");
        assert_eq!(stream.finalize_hex(), md5_hex(b"Hello, World!"));
    }

    #[test]
    fn test_multipart_etag_composition() {
        let p1 = md5_hex(b"part one");
        let p2 = md5_hex(b"part two");

        let mut concat = hex::decode(&p1).unwrap();
        concat.extend(hex::decode(&p2).unwrap());
        let expected = format!("{}-2", md5_hex(&concat));

        assert_eq!(multipart_etag(&[p1, p2]), expected);
    }

    #[test]
    fn test_multipart_etag_ignores_quotes() {
        let p1 = format!("\"{}\"", md5_hex(b"a"));
        let unquoted = md5_hex(b"a");
        assert_eq!(multipart_etag(&[p1]), multipart_etag(&[unquoted]));
    }
}
