//! Credential sealing.
//!
//! The persisted metadata record carries the user's remote password sealed
//! with AES-256-GCM. The key is derived by hashing the configured
//! `encrypt_key` and `encrypt_salt` with SHA-256; every seal uses a fresh
//! random 96-bit nonce prepended to the ciphertext, and the whole envelope
//! is stored as lowercase hex. Cleartext never touches disk.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::SecretsConfig;
use crate::error::SyncError;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Seals and opens credential envelopes.
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    /// Derive the sealing key from the configured secrets.
    #[must_use]
    pub fn new(secrets: &SecretsConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secrets.encrypt_key.as_bytes());
        hasher.update(secrets.encrypt_salt.as_bytes());
        let digest = hasher.finalize();
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Seal `plaintext` into a hex envelope (`nonce ‖ ciphertext ‖ tag`).
    ///
    /// # Errors
    /// Returns [`SyncError::Crypto`] if encryption fails.
    pub fn seal(&self, plaintext: &str) -> Result<String, SyncError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| SyncError::Crypto {
                message: format!("encrypt: {e}"),
            })?;
        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(hex_encode(&envelope))
    }

    /// Open a hex envelope produced by [`seal`](Self::seal).
    ///
    /// # Errors
    /// Returns [`SyncError::Crypto`] on malformed envelopes, wrong keys, or
    /// tampered ciphertext.
    pub fn open(&self, envelope: &str) -> Result<String, SyncError> {
        let bytes = hex_decode(envelope).map_err(|message| SyncError::Crypto { message })?;
        if bytes.len() <= NONCE_LEN {
            return Err(SyncError::Crypto {
                message: "envelope too short".to_owned(),
            });
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SyncError::Crypto {
                message: "decrypt failed (wrong key or corrupt envelope)".to_owned(),
            })?;
        String::from_utf8(plaintext).map_err(|_| SyncError::Crypto {
            message: "sealed value is not UTF-8".to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hex helpers (also used for session tokens)
// ---------------------------------------------------------------------------

/// Lowercase hex encoding.
#[must_use]
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Decode a hex string, rejecting odd lengths and non-hex digits.
pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("hex string has odd length".to_owned());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks(2) {
        let hi = hex_digit(chunk[0]).ok_or_else(|| format!("invalid hex digit '{}'", chunk[0] as char))?;
        let lo = hex_digit(chunk[1]).ok_or_else(|| format!("invalid hex digit '{}'", chunk[1] as char))?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer() -> Sealer {
        Sealer::new(&SecretsConfig::default())
    }

    #[test]
    fn seal_open_roundtrip() {
        let s = sealer();
        let envelope = s.seal("hunter2").unwrap();
        assert_eq!(s.open(&envelope).unwrap(), "hunter2");
    }

    #[test]
    fn envelope_is_hex_and_never_cleartext() {
        let s = sealer();
        let envelope = s.seal("supersecret").unwrap();
        assert!(envelope.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!envelope.contains("supersecret"));
    }

    #[test]
    fn fresh_nonce_every_seal() {
        let s = sealer();
        assert_ne!(s.seal("same").unwrap(), s.seal("same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = sealer().seal("pw").unwrap();
        let other = Sealer::new(&SecretsConfig {
            encrypt_key: "other".to_owned(),
            encrypt_salt: "salts".to_owned(),
        });
        assert!(matches!(
            other.open(&envelope),
            Err(SyncError::Crypto { .. })
        ));
    }

    #[test]
    fn tampered_envelope_fails() {
        let s = sealer();
        let mut envelope = s.seal("pw").unwrap();
        // Flip the last hex digit.
        let last = envelope.pop().unwrap();
        envelope.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(s.open(&envelope), Err(SyncError::Crypto { .. })));
    }

    #[test]
    fn malformed_envelopes_rejected() {
        let s = sealer();
        assert!(s.open("abc").is_err()); // odd length
        assert!(s.open("zz").is_err()); // not hex
        assert!(s.open("00ff").is_err()); // too short
    }

    #[test]
    fn empty_password_roundtrips() {
        let s = sealer();
        let envelope = s.seal("").unwrap();
        assert_eq!(s.open(&envelope).unwrap(), "");
    }

    #[test]
    fn hex_helpers_roundtrip() {
        let bytes = [0x00, 0x7f, 0xff, 0x10];
        assert_eq!(hex_encode(&bytes), "007fff10");
        assert_eq!(hex_decode("007fff10").unwrap(), bytes);
    }
}
