use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};

use crate::{errors::Error, Result};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for stored provider credentials.
///
/// Ciphertexts are rendered as `"<ciphertext hex>|<nonce hex>"`.
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parses a 64-character hex secret.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| Error::Config(format!("cipher secret is not valid hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Config(format!("cipher secret must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

        Ok(format!(
            "{}|{}",
            hex::encode(ciphertext),
            hex::encode(nonce_bytes)
        ))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let (ciphertext_hex, nonce_hex) = encoded
            .split_once('|')
            .ok_or_else(|| Error::Crypto("malformed ciphertext".to_string()))?;

        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|e| Error::Crypto(format!("malformed ciphertext: {e}")))?;
        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| Error::Crypto(format!("malformed nonce: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(Error::Crypto(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| Error::Crypto(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Crypto(format!("decrypted key is not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> CredentialCipher {
        CredentialCipher::new([byte; 32])
    }

    #[test]
    fn encrypt_then_decrypt() {
        let c = cipher(7);
        let sealed = c.encrypt("deepl-key:fx").unwrap();
        assert!(sealed.contains('|'));
        assert!(!sealed.contains("deepl-key"));
        assert_eq!(c.decrypt(&sealed).unwrap(), "deepl-key:fx");
    }

    #[test]
    fn nonces_differ_per_call() {
        let c = cipher(7);
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let sealed = cipher(1).encrypt("secret").unwrap();
        assert!(matches!(cipher(2).decrypt(&sealed), Err(Error::Crypto(_))));

        let (ct, nonce) = sealed.split_once('|').unwrap();
        let mut bytes = hex::decode(ct).unwrap();
        bytes[0] ^= 0xff;
        let tampered = format!("{}|{nonce}", hex::encode(bytes));
        assert!(cipher(1).decrypt(&tampered).is_err());

        assert!(cipher(1).decrypt("no-separator").is_err());
        assert!(cipher(1).decrypt("abcd|00").is_err());
    }

    #[test]
    fn from_hex_requires_32_bytes() {
        assert!(CredentialCipher::from_hex(&"0f".repeat(32)).is_ok());
        assert!(CredentialCipher::from_hex("0f0f").is_err());
    }
}
