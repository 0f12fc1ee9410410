//! Depot chunk encryption.
//!
//! Layout of an encrypted chunk:
//!
//! ```text
//! [0..16)   IV, encrypted with AES-256-ECB under the depot key
//! [16..)    payload, AES-256-CBC with PKCS#7 padding
//! ```

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{ChunkCipher, ProcessError};
use crate::keystore::DepotKey;

/// AES block size in bytes.
const AES_BLOCK_SIZE: usize = 16;

/// The depot symmetric scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricCipher;

impl SymmetricCipher {
    /// Encrypt `plaintext` the way content servers store chunks.
    pub fn encrypt(
        key: &DepotKey,
        iv: [u8; AES_BLOCK_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProcessError> {
        let ecb = Aes256::new_from_slice(key.as_bytes())
            .map_err(|e| ProcessError::Decrypt(e.to_string()))?;
        let mut header = aes::Block::clone_from_slice(&iv);
        ecb.encrypt_block(&mut header);

        let mut body = plaintext.to_vec();
        body.resize(plaintext.len() + AES_BLOCK_SIZE, 0);
        let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(key.as_bytes(), &iv)
            .map_err(|e| ProcessError::Decrypt(e.to_string()))?;
        let encrypted = encryptor
            .encrypt_padded_mut::<Pkcs7>(&mut body, plaintext.len())
            .map_err(|e| ProcessError::Decrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(AES_BLOCK_SIZE + encrypted.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(encrypted);
        Ok(out)
    }
}

impl ChunkCipher for SymmetricCipher {
    fn decrypt(&self, key: &DepotKey, data: &[u8]) -> Result<Vec<u8>, ProcessError> {
        if data.len() < 2 * AES_BLOCK_SIZE || data.len() % AES_BLOCK_SIZE != 0 {
            return Err(ProcessError::Decrypt(format!(
                "ciphertext length {} is not a whole number of blocks",
                data.len()
            )));
        }

        let ecb = Aes256::new_from_slice(key.as_bytes())
            .map_err(|e| ProcessError::Decrypt(e.to_string()))?;
        let mut iv = aes::Block::clone_from_slice(&data[..AES_BLOCK_SIZE]);
        ecb.decrypt_block(&mut iv);

        let mut body = data[AES_BLOCK_SIZE..].to_vec();
        let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(key.as_bytes(), iv.as_slice())
            .map_err(|e| ProcessError::Decrypt(e.to_string()))?;
        let len = decryptor
            .decrypt_padded_mut::<Pkcs7>(&mut body)
            .map_err(|_| ProcessError::Decrypt("bad padding".to_string()))?
            .len();
        body.truncate(len);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> DepotKey {
        DepotKey::from_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let plaintext = b"chunk payload that spans more than one block";
        let encrypted = SymmetricCipher::encrypt(&key(7), [3u8; 16], plaintext).unwrap();

        assert_eq!(encrypted.len() % 16, 0);
        assert_eq!(encrypted.len(), 16 + 48);
        // IV is not stored in the clear
        assert_ne!(&encrypted[..16], &[3u8; 16]);

        let decrypted = SymmetricCipher.decrypt(&key(7), &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let encrypted = SymmetricCipher::encrypt(&key(1), [0u8; 16], b"").unwrap();
        assert_eq!(encrypted.len(), 32);
        assert!(SymmetricCipher.decrypt(&key(1), &encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_truncated_ciphertext() {
        let result = SymmetricCipher.decrypt(&key(1), &[0u8; 20]);
        assert!(matches!(result, Err(ProcessError::Decrypt(_))));
        assert!(SymmetricCipher.decrypt(&key(1), &[0u8; 16]).is_err());
    }

    #[test]
    fn test_wrong_key_does_not_yield_plaintext() {
        let plaintext = vec![0x5au8; 100];
        let encrypted = SymmetricCipher::encrypt(&key(1), [9u8; 16], &plaintext).unwrap();
        match SymmetricCipher.decrypt(&key(2), &encrypted) {
            Ok(garbage) => assert_ne!(garbage, plaintext),
            Err(e) => assert!(e.is_structural()),
        }
    }
}
