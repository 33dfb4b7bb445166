use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde_json::Value;

use crate::engine::codec::JsonCodec;
use crate::{Codec, Error, Result};

const NONCE_LEN: usize = 12;

/// Encrypts every stored value with AES-256-GCM.
///
/// The wrapped codec produces the plaintext; rows hold the hex-encoded nonce followed by
/// the ciphertext. Reading a row with the wrong key fails with a codec error.
pub struct VaultCodec<C = JsonCodec> {
    cipher: Aes256Gcm,
    inner: C,
}

impl VaultCodec<JsonCodec> {
    /// Creates a vault over JSON text using a 32-byte master key.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        Self::with_inner(master_key, JsonCodec)
    }
}

impl<C: Codec> VaultCodec<C> {
    pub fn with_inner(master_key: &[u8], inner: C) -> Result<Self> {
        if master_key.len() != 32 {
            return Err(Error::Argument("vault key must be 32 bytes".to_string()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(master_key).map_err(|e| Error::Argument(e.to_string()))?;
        Ok(Self { cipher, inner })
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Codec(e.to_string()))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(hex::encode(combined))
    }

    fn decrypt(&self, cipher_hex: &str) -> Result<String> {
        let combined = hex::decode(cipher_hex).map_err(|e| Error::Codec(e.to_string()))?;
        if combined.len() < NONCE_LEN {
            return Err(Error::Codec("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Codec("decryption failed (wrong key or tampered data)".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| Error::Codec(e.to_string()))
    }
}

impl<C: Codec> Codec for VaultCodec<C> {
    fn encode(&self, value: &Value) -> Result<String> {
        let plaintext = self.inner.encode(value)?;
        self.encrypt(&plaintext)
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        let plaintext = self.decrypt(raw)?;
        self.inner.decode(&plaintext)
    }
}
