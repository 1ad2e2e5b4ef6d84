//! Verify-token exchange and the resulting session secret.
//!
//! ```text
//! server → EncryptionRequest(public key, verify token)
//! client → EncryptionResponse(RSA(secret), RSA(verify token))
//! ```
//!
//! The decrypted token must equal the one sent, byte for byte, before the
//! secret is accepted.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::keypair::ServerKeyPair;
use crate::CryptoError;

/// Length of the AES-128 shared secret.
pub const SECRET_LEN: usize = 16;

/// Length of the per-attempt verify token.
pub const VERIFY_TOKEN_LEN: usize = 4;

/// Symmetric key for one connection. Zeroed when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SECRET_LEN]);

impl SessionSecret {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SECRET_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidSecretLength {
                    expected: SECRET_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Fresh random secret, as a client would choose it.
    pub fn random() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Server state between EncryptionRequest and EncryptionResponse.
#[derive(Debug)]
pub struct PendingHandshake {
    verify_token: [u8; VERIFY_TOKEN_LEN],
}

impl Default for PendingHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingHandshake {
    /// Start a handshake with a fresh random verify token.
    pub fn new() -> Self {
        let mut verify_token = [0u8; VERIFY_TOKEN_LEN];
        OsRng.fill_bytes(&mut verify_token);
        Self { verify_token }
    }

    pub fn verify_token(&self) -> &[u8] {
        &self.verify_token
    }

    /// Check the client's response and recover the shared secret.
    ///
    /// Consumes the pending state: a failed attempt cannot be retried.
    pub fn complete(
        self,
        keypair: &ServerKeyPair,
        encrypted_secret: &[u8],
        encrypted_token: &[u8],
    ) -> Result<SessionSecret, CryptoError> {
        let token = keypair.decrypt(encrypted_token)?;
        if token.as_slice() != self.verify_token.as_slice() {
            tracing::debug!("verify token mismatch ({} bytes received)", token.len());
            return Err(CryptoError::VerifyTokenMismatch);
        }
        let secret = Zeroizing::new(keypair.decrypt(encrypted_secret)?);
        SessionSecret::from_slice(&secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::encrypt_with_public_key;
    use crate::keypair::tests::test_keypair;

    #[test]
    fn correct_response_yields_secret() {
        let kp = test_keypair();
        let pending = PendingHandshake::new();
        let secret = SessionSecret::random();

        let enc_secret = encrypt_with_public_key(kp.public_key_der(), secret.as_bytes()).unwrap();
        let enc_token = encrypt_with_public_key(kp.public_key_der(), pending.verify_token()).unwrap();

        let recovered = pending.complete(kp, &enc_secret, &enc_token).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn corrupted_token_rejected() {
        let kp = test_keypair();
        let pending = PendingHandshake::new();
        let secret = SessionSecret::random();

        let mut wrong = pending.verify_token().to_vec();
        wrong[0] ^= 0xFF;
        let enc_secret = encrypt_with_public_key(kp.public_key_der(), secret.as_bytes()).unwrap();
        let enc_token = encrypt_with_public_key(kp.public_key_der(), &wrong).unwrap();

        assert!(matches!(
            pending.complete(kp, &enc_secret, &enc_token),
            Err(CryptoError::VerifyTokenMismatch)
        ));
    }

    #[test]
    fn undecryptable_token_rejected() {
        let kp = test_keypair();
        let pending = PendingHandshake::new();
        assert!(matches!(
            pending.complete(kp, &[0u8; 128], &[0u8; 128]),
            Err(CryptoError::Decrypt(_))
        ));
    }

    #[test]
    fn wrong_secret_length_rejected() {
        let kp = test_keypair();
        let pending = PendingHandshake::new();
        let enc_secret = encrypt_with_public_key(kp.public_key_der(), &[1u8; 8]).unwrap();
        let enc_token = encrypt_with_public_key(kp.public_key_der(), pending.verify_token()).unwrap();
        assert!(matches!(
            pending.complete(kp, &enc_secret, &enc_token),
            Err(CryptoError::InvalidSecretLength { actual: 8, .. })
        ));
    }

    #[test]
    fn tokens_are_fresh() {
        let a = PendingHandshake::new();
        let b = PendingHandshake::new();
        let c = PendingHandshake::new();
        assert_eq!(a.verify_token().len(), VERIFY_TOKEN_LEN);
        // 2^-64 chance of a false failure
        assert!(a.verify_token() != b.verify_token() || b.verify_token() != c.verify_token());
    }

    #[test]
    fn secret_zeroize_clears_bytes() {
        let mut secret = SessionSecret::from_slice(&[9u8; 16]).unwrap();
        secret.zeroize();
        assert_eq!(secret.as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn debug_redacts_secret() {
        let secret = SessionSecret::from_slice(&[9u8; 16]).unwrap();
        assert_eq!(format!("{secret:?}"), "SessionSecret(..)");
    }
}
