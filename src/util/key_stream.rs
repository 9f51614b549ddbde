use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};

use super::crypto_constants::{trimmed_user_key, WZ_USER_KEY};

/// Keys are expanded in 4096-byte batches so a short name never pays for
/// a megabyte of AES work.
const KEY_BATCH_SIZE: usize = 4096;

/// The string decryption key stream, materialized lazily from a 4-byte
/// region IV.
///
/// The stream is generated in 16-byte blocks with AES-256 ECB: the first
/// plaintext block is the IV repeated four times, every following block
/// encrypts the previous ciphertext block. A zero IV yields the all-zero
/// stream, which leaves only the rolling string mask in effect.
#[derive(Debug)]
pub struct WzKeyStream {
    pub iv: [u8; 4],
    aes_key: [u8; 32],
    stream: Vec<u8>,
    /// iv == 0, stream is identically zero
    pub plain: bool,
}

impl WzKeyStream {
    pub fn new(iv: [u8; 4]) -> Self {
        Self {
            iv,
            aes_key: trimmed_user_key(&WZ_USER_KEY),
            stream: Vec::new(),
            plain: iv == [0; 4],
        }
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }
    /// true when `size` bytes can be consumed without expansion.
    pub fn is_ready(&self, size: usize) -> bool {
        self.plain || self.stream.len() >= size
    }

    /// Key byte at `index`, expanding the stream as needed.
    pub fn byte_at(&mut self, index: usize) -> u8 {
        if self.plain {
            return 0;
        }
        self.expand_to(index + 1);
        self.stream[index]
    }

    /// Grow the stream to at least `size` bytes, rounded up to the next
    /// batch boundary.
    pub fn expand_to(&mut self, size: usize) {
        if self.plain || self.stream.len() >= size {
            return;
        }

        let target = size.div_ceil(KEY_BATCH_SIZE) * KEY_BATCH_SIZE;
        self.stream.reserve(target - self.stream.len());

        let cipher = Aes256::new(&self.aes_key.into());

        let mut block = [0u8; 16];
        if self.stream.is_empty() {
            for (i, byte) in block.iter_mut().enumerate() {
                *byte = self.iv[i % 4];
            }
        } else {
            block.copy_from_slice(&self.stream[self.stream.len() - 16..]);
        }

        while self.stream.len() < target {
            let mut out = Block::from(block);
            cipher.encrypt_block(&mut out);
            self.stream.extend_from_slice(out.as_slice());
            block.copy_from_slice(out.as_slice());
        }
    }

    /// XOR `data` with the head of the stream. The caller must have
    /// expanded the stream to `data.len()` first.
    pub fn decrypt_slice(&self, data: &mut [u8]) {
        if self.plain {
            return;
        }
        data.iter_mut()
            .zip(&self.stream)
            .for_each(|(byte, key)| *byte ^= key);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::crypto_constants::{WZ_GMS_IV, WZ_SEA_IV};

    #[test]
    fn test_zero_iv_is_plain() {
        let mut key = WzKeyStream::new([0; 4]);

        assert!(key.plain);
        assert_eq!(key.byte_at(0), 0);
        assert_eq!(key.byte_at(100_000), 0);
        assert!(key.is_empty());

        let mut data = vec![0x41, 0x42, 0x43];
        key.decrypt_slice(&mut data);
        assert_eq!(data, vec![0x41, 0x42, 0x43]);
    }

    #[test]
    fn test_expand_in_batches() {
        let mut key = WzKeyStream::new(WZ_GMS_IV);

        key.expand_to(16);
        assert_eq!(key.len(), 4096);

        key.expand_to(4200);
        assert_eq!(key.len(), 4096 * 2);

        key.expand_to(4096 * 4 + 5);
        assert_eq!(key.len(), 4096 * 5);
    }

    #[test]
    fn test_byte_at_expands() {
        let mut key = WzKeyStream::new(WZ_SEA_IV);

        let _ = key.byte_at(1);
        assert_eq!(key.len(), 4096);

        let _ = key.byte_at(4000);
        assert_eq!(key.len(), 4096);

        let _ = key.byte_at(4097);
        assert_eq!(key.len(), 4096 * 2);
    }

    #[test]
    fn test_byte_at_is_stable() {
        let mut key = WzKeyStream::new(WZ_GMS_IV);

        let early: Vec<u8> = (0..64).map(|i| key.byte_at(i)).collect();
        let _ = key.byte_at(10_000);
        let late: Vec<u8> = (0..64).map(|i| key.byte_at(i)).collect();

        assert_eq!(early, late);
    }

    #[test]
    fn test_first_block_is_encrypted_iv() {
        let mut key = WzKeyStream::new(WZ_GMS_IV);

        let mut block = [0u8; 16];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = WZ_GMS_IV[i % 4];
        }
        let cipher = Aes256::new(&trimmed_user_key(&WZ_USER_KEY).into());
        let mut expected = Block::from(block);
        cipher.encrypt_block(&mut expected);

        let first: Vec<u8> = (0..16).map(|i| key.byte_at(i)).collect();
        assert_eq!(first, expected.as_slice().to_vec());
    }

    #[test]
    fn test_blocks_chain() {
        let mut key = WzKeyStream::new(WZ_GMS_IV);
        key.expand_to(32);

        let cipher = Aes256::new(&trimmed_user_key(&WZ_USER_KEY).into());
        let mut second = Block::clone_from_slice(&key.stream[0..16]);
        cipher.encrypt_block(&mut second);

        assert_eq!(&key.stream[16..32], second.as_slice());
    }
}
