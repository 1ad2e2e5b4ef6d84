//! Process-wide RSA key pair for the login encryption handshake.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::CryptoError;

/// Modulus size the vanilla client expects.
pub const KEY_BITS: usize = 1024;

/// Server-side RSA key pair. Generated once at startup and shared by every
/// connection.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_der: Vec<u8>,
}

impl ServerKeyPair {
    /// Generate a new random 1024-bit key pair.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .map_err(|e| CryptoError::PublicKeyEncoding(e.to_string()))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            private,
            public_der,
        })
    }

    /// Public key as SPKI DER, the form sent in EncryptionRequest.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    /// PKCS#1 v1.5 decryption with the private key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public_der_len", &self.public_der.len())
            .finish_non_exhaustive()
    }
}

/// Client side of the exchange: encrypt `data` for the holder of
/// `public_key_der`.
pub fn encrypt_with_public_key(public_key_der: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| CryptoError::PublicKeyEncoding(e.to_string()))?;
    public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))
}
