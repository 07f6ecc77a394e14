//! Optional transport confidentiality for inference service traffic.
//!
//! A 256-bit key is derived as SHA-256 of a shared secret string. Each
//! message is AES-256-CFB encrypted with a fresh random 16-byte IV; the
//! wire form is `base64(IV || ciphertext)`. This is confidentiality only
//! (no authentication tag) and is scoped to trusted-localhost
//! deployments.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// IV length in bytes (AES block size).
const IV_LEN: usize = 16;

/// Errors from decoding or decrypting a payload.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The payload is not valid base64.
    #[error("Invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The decoded payload is shorter than one IV.
    #[error("Ciphertext too short")]
    TooShort,
}

/// Symmetric payload cipher shared by both directions of the transport.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; 32],
}

impl PayloadCipher {
    /// Derive the cipher key from a shared secret string.
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self { key: key.into() }
    }

    /// Encrypt a payload, returning `base64(IV || ciphertext)`.
    ///
    /// A fresh random IV is drawn per call, so encrypting the same
    /// payload twice never yields the same output.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let mut buf = plaintext.to_vec();
        Aes256CfbEnc::new(&self.key.into(), &iv.into()).encrypt(&mut buf);

        let mut out = Vec::with_capacity(IV_LEN + buf.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        BASE64.encode(out)
    }

    /// Decrypt a `base64(IV || ciphertext)` payload.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = BASE64.decode(encoded)?;
        if raw.len() < IV_LEN {
            return Err(CryptoError::TooShort);
        }

        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv.try_into().expect("split_at yields IV_LEN bytes");

        let mut buf = ciphertext.to_vec();
        Aes256CfbDec::new(&self.key.into(), &iv.into()).decrypt(&mut buf);
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- round trip ----------------------------------------------------------

    #[test]
    fn round_trip_recovers_payload() {
        let cipher = PayloadCipher::new("shared-secret");
        let payload = b"{\"prompt\":\"a cat\"}";
        let encoded = cipher.encrypt(payload);
        assert_eq!(cipher.decrypt(&encoded).unwrap(), payload);
    }

    #[test]
    fn round_trip_empty_payload() {
        let cipher = PayloadCipher::new("shared-secret");
        let encoded = cipher.encrypt(b"");
        assert_eq!(cipher.decrypt(&encoded).unwrap(), b"");
    }

    #[test]
    fn round_trip_binary_payload() {
        let cipher = PayloadCipher::new("shared-secret");
        let payload: Vec<u8> = (0..=255).collect();
        let encoded = cipher.encrypt(&payload);
        assert_eq!(cipher.decrypt(&encoded).unwrap(), payload);
    }

    // -- IV freshness --------------------------------------------------------

    #[test]
    fn same_payload_never_encrypts_identically() {
        let cipher = PayloadCipher::new("shared-secret");
        let a = cipher.encrypt(b"identical payload");
        let b = cipher.encrypt(b"identical payload");
        assert_ne!(a, b);
    }

    // -- key agreement -------------------------------------------------------

    #[test]
    fn same_secret_yields_interoperable_ciphers() {
        let sender = PayloadCipher::new("secret");
        let receiver = PayloadCipher::new("secret");
        let encoded = sender.encrypt(b"payload");
        assert_eq!(receiver.decrypt(&encoded).unwrap(), b"payload");
    }

    #[test]
    fn different_secret_garbles_payload() {
        let sender = PayloadCipher::new("secret-a");
        let receiver = PayloadCipher::new("secret-b");
        let encoded = sender.encrypt(b"payload");
        // CFB has no authentication, so decryption succeeds but the
        // recovered bytes differ.
        assert_ne!(receiver.decrypt(&encoded).unwrap(), b"payload");
    }

    // -- malformed input -----------------------------------------------------

    #[test]
    fn invalid_base64_rejected() {
        let cipher = PayloadCipher::new("secret");
        assert_matches!(cipher.decrypt("not!!base64"), Err(CryptoError::Encoding(_)));
    }

    #[test]
    fn truncated_payload_rejected() {
        let cipher = PayloadCipher::new("secret");
        let short = BASE64.encode([0u8; IV_LEN - 1]);
        assert_matches!(cipher.decrypt(&short), Err(CryptoError::TooShort));
    }
}
