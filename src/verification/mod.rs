use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

pub mod cipher;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Clone)]
pub enum KeyedDigest {
    /// Plain SHA-256; the shared secret travels as one of the joined fields.
    Sha256Concat,
    HmacSha256 { key: Vec<u8> },
    HmacSha512 { key: Vec<u8> },
}

impl std::fmt::Debug for KeyedDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyedDigest::Sha256Concat => f.write_str("Sha256Concat"),
            KeyedDigest::HmacSha256 { .. } => f.write_str("HmacSha256 { key: <redacted> }"),
            KeyedDigest::HmacSha512 { .. } => f.write_str("HmacSha512 { key: <redacted> }"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestEncoding {
    Hex,
    Base64,
}

/// How a provider signs: which digest, how fields are joined, and how the
/// result is rendered.
#[derive(Debug, Clone)]
pub struct SignatureScheme {
    pub digest: KeyedDigest,
    pub separator: &'static str,
    pub encoding: DigestEncoding,
}

impl SignatureScheme {
    pub fn sha256(separator: &'static str) -> Self {
        Self {
            digest: KeyedDigest::Sha256Concat,
            separator,
            encoding: DigestEncoding::Hex,
        }
    }

    pub fn hmac_sha256(key: impl AsRef<[u8]>, separator: &'static str) -> Self {
        Self {
            digest: KeyedDigest::HmacSha256 {
                key: key.as_ref().to_vec(),
            },
            separator,
            encoding: DigestEncoding::Hex,
        }
    }

    pub fn hmac_sha512(key: impl AsRef<[u8]>, separator: &'static str) -> Self {
        Self {
            digest: KeyedDigest::HmacSha512 {
                key: key.as_ref().to_vec(),
            },
            separator,
            encoding: DigestEncoding::Hex,
        }
    }

    pub fn base64(mut self) -> Self {
        self.encoding = DigestEncoding::Base64;
        self
    }

    pub fn sign<S: AsRef<str>>(&self, fields: &[S]) -> String {
        let joined = fields
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(self.separator);
        self.sign_bytes(joined.as_bytes())
    }

    pub fn sign_bytes(&self, data: &[u8]) -> String {
        let digest = match &self.digest {
            KeyedDigest::Sha256Concat => Sha256::digest(data).to_vec(),
            KeyedDigest::HmacSha256 { key } => {
                // HMAC accepts keys of any length, the error arm is unreachable.
                match HmacSha256::new_from_slice(key) {
                    Ok(mut mac) => {
                        mac.update(data);
                        mac.finalize().into_bytes().to_vec()
                    }
                    Err(_) => Vec::new(),
                }
            }
            KeyedDigest::HmacSha512 { key } => match HmacSha512::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(data);
                    mac.finalize().into_bytes().to_vec()
                }
                Err(_) => Vec::new(),
            },
        };
        match self.encoding {
            DigestEncoding::Hex => hex::encode(digest),
            DigestEncoding::Base64 => BASE64.encode(digest),
        }
    }

    pub fn verify<S: AsRef<str>>(&self, fields: &[S], provided: &str) -> bool {
        self.matches(&self.sign(fields), provided)
    }

    pub fn verify_bytes(&self, data: &[u8], provided: &str) -> bool {
        self.matches(&self.sign_bytes(data), provided)
    }

    fn matches(&self, expected: &str, provided: &str) -> bool {
        match self.encoding {
            DigestEncoding::Hex => constant_time_eq_hex(expected, provided.trim()),
            DigestEncoding::Base64 => constant_time_eq(expected.as_bytes(), provided.trim().as_bytes()),
        }
    }
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    a.ct_eq(b).unwrap_u8() == 1
}

/// Case-insensitive comparison of two hex digests.
pub fn constant_time_eq_hex(a: &str, b: &str) -> bool {
    constant_time_eq(
        a.to_ascii_lowercase().as_bytes(),
        b.to_ascii_lowercase().as_bytes(),
    )
}
