use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("invalid iv length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("decryption failure")]
    Decrypt,
    #[error("decrypted payload is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// AES-256-CBC with PKCS#7 padding, hex on the wire.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; KEY_LENGTH],
    iv: [u8; IV_LENGTH],
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadCipher(<redacted>)")
    }
}

impl PayloadCipher {
    pub fn new(key: impl AsRef<[u8]>, iv: impl AsRef<[u8]>) -> Result<Self, CipherError> {
        let key = key.as_ref();
        let iv = iv.as_ref();
        let key: [u8; KEY_LENGTH] = key.try_into().map_err(|_| CipherError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: key.len(),
        })?;
        let iv: [u8; IV_LENGTH] = iv.try_into().map_err(|_| CipherError::InvalidIvLength {
            expected: IV_LENGTH,
            actual: iv.len(),
        })?;
        Ok(Self { key, iv })
    }

    pub fn encrypt_hex(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        hex::encode(ciphertext)
    }

    /// Fails on bad hex, a wrong key (padding check) or non-UTF-8 output.
    pub fn decrypt_hex(&self, ciphertext: &str) -> Result<String, CipherError> {
        let bytes = hex::decode(ciphertext.trim())?;
        let plain = Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
            .map_err(|_| CipherError::Decrypt)?;
        Ok(String::from_utf8(plain)?)
    }
}
