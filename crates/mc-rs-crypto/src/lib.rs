//! Login encryption: RSA key exchange, verify tokens and the AES-128-CFB8
//! stream cipher used for the rest of the session.

pub mod cipher;
pub mod handshake;
pub mod keypair;

pub use cipher::StreamCipher;
pub use handshake::{PendingHandshake, SessionSecret, SECRET_LEN, VERIFY_TOKEN_LEN};
pub use keypair::{encrypt_with_public_key, ServerKeyPair, KEY_BITS};

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("verify token mismatch")]
    VerifyTokenMismatch,

    #[error("RSA decryption failed: {0}")]
    Decrypt(String),

    #[error("shared secret must be {expected} bytes, got {actual}")]
    InvalidSecretLength { expected: usize, actual: usize },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("public key encoding failed: {0}")]
    PublicKeyEncoding(String),

    #[error("RSA encryption failed: {0}")]
    Encrypt(String),
}
