//! AES-128-CFB8 stream transform for an encrypted session.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb8::{Decryptor, Encryptor};

use crate::handshake::SessionSecret;

/// Paired send and receive ciphers for one connection.
///
/// The shared secret is both key and IV. Cipher state runs continuously
/// across writes, so every byte must pass through exactly once and in
/// stream order.
pub struct StreamCipher {
    encryptor: Encryptor<Aes128>,
    decryptor: Decryptor<Aes128>,
}

impl StreamCipher {
    pub fn new(secret: &SessionSecret) -> Self {
        let key = secret.as_bytes();
        Self {
            encryptor: Encryptor::<Aes128>::new(key.into(), key.into()),
            decryptor: Decryptor::<Aes128>::new(key.into(), key.into()),
        }
    }

    /// Encrypt outgoing bytes in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.encryptor.encrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }

    /// Decrypt incoming bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.decryptor.decrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamCipher")
    }
}
