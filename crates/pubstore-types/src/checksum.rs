use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digests of a source file, as supplied by the caller.
///
/// pubstore never computes these; it only compares them against what the
/// remote store reports. An empty string means "unknown".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub sha512: String,
}

impl ChecksumInfo {
    /// Checksum info carrying only an MD5 hex digest.
    pub fn with_md5(md5: impl Into<String>) -> Self {
        Self {
            md5: md5.into(),
            ..Default::default()
        }
    }

    /// The MD5 digest in canonical form, or `None` if it is missing or
    /// not a valid hex-encoded MD5.
    pub fn md5_digest(&self) -> Option<Md5Digest> {
        Md5Digest::from_hex(&self.md5).ok()
    }
}

/// A 16-byte MD5 digest in canonical (raw) form.
///
/// Callers hand us hex; cloud stores commonly report base64. Both decode
/// into this type so comparisons never depend on the text encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Create a digest from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parse a hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypeError::Empty);
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Parse a standard-alphabet base64 string.
    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypeError::Empty);
        }
        let bytes = BASE64
            .decode(s)
            .map_err(|e| TypeError::InvalidBase64(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != 16 {
            return Err(TypeError::InvalidLength {
                expected: 16,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Standard base64 representation.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Digest({})", self.to_hex())
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // md5("hello")
    const HELLO_HEX: &str = "5d41402abc4b2a76b9719d911017c592";
    const HELLO_B64: &str = "XUFAKrxLKna5cZ2REBfFkg==";

    #[test]
    fn hex_and_base64_decode_to_same_digest() {
        let from_hex = Md5Digest::from_hex(HELLO_HEX).unwrap();
        let from_b64 = Md5Digest::from_base64(HELLO_B64).unwrap();
        assert_eq!(from_hex, from_b64);
    }

    #[test]
    fn hex_is_case_insensitive() {
        let lower = Md5Digest::from_hex(HELLO_HEX).unwrap();
        let upper = Md5Digest::from_hex(&HELLO_HEX.to_uppercase()).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn encodes_back_to_canonical_text() {
        let digest = Md5Digest::from_base64(HELLO_B64).unwrap();
        assert_eq!(digest.to_hex(), HELLO_HEX);
        assert_eq!(digest.to_base64(), HELLO_B64);
        assert_eq!(format!("{digest}"), HELLO_HEX);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(Md5Digest::from_hex(""), Err(TypeError::Empty));
        assert_eq!(Md5Digest::from_base64("  "), Err(TypeError::Empty));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = Md5Digest::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 16,
                actual: 2
            }
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Md5Digest::from_hex("not-hex-at-all"),
            Err(TypeError::InvalidHex(_))
        ));
        assert!(matches!(
            Md5Digest::from_base64("***"),
            Err(TypeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn checksum_info_md5_digest() {
        assert!(ChecksumInfo::default().md5_digest().is_none());
        assert!(ChecksumInfo::with_md5("zz").md5_digest().is_none());
        let info = ChecksumInfo::with_md5(HELLO_HEX);
        assert_eq!(info.md5_digest().unwrap().to_hex(), HELLO_HEX);
    }

    #[test]
    fn checksum_info_serde_defaults_missing_fields() {
        let info: ChecksumInfo = serde_json::from_str(r#"{"md5":"abc"}"#).unwrap();
        assert_eq!(info.md5, "abc");
        assert_eq!(info.size, 0);
        assert!(info.sha256.is_empty());
    }
}
