//! One-shot AES-256-CTR encrypt/decrypt and HMAC-SHA256 compute/verify.

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use ring::hmac;
use subtle::ConstantTimeEq;

use super::key::CipherKey;

pub const IV_SIZE: usize = 16;
pub const MAC_SIZE: usize = 32;

/// AES-256 in CTR mode with a big-endian 128-bit counter.
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Encrypt `plaintext` under `key`, drawing a fresh random IV and
/// returning `IV ‖ ciphertext`.
pub fn encrypt(plaintext: &[u8], key: &CipherKey) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(IV_SIZE + plaintext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);

    let mut cipher = Aes256Ctr::new(key.aes_key().into(), (&iv).into());
    cipher.apply_keystream(&mut out[IV_SIZE..]);
    out
}

/// Decrypt `IV ‖ ciphertext` under `key`, returning the plaintext.
///
/// Returns `None` if `buf` is shorter than an IV — callers that need a
/// typed error should check `buf.len()` themselves first.
pub fn decrypt(buf: &[u8], key: &CipherKey) -> Option<Vec<u8>> {
    if buf.len() < IV_SIZE {
        return None;
    }
    let (iv, ciphertext) = buf.split_at(IV_SIZE);
    let mut plaintext = ciphertext.to_vec();
    let mut cipher = Aes256Ctr::new(key.aes_key().into(), iv.into());
    cipher.apply_keystream(&mut plaintext);
    Some(plaintext)
}

/// Compute the HMAC-SHA256 of `data` under `key`.
pub fn hmac_sign(data: &[u8], key: &CipherKey) -> [u8; MAC_SIZE] {
    let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key.mac_key());
    let tag = hmac::sign(&hmac_key, data);
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(tag.as_ref());
    out
}

/// Constant-time verification of an HMAC-SHA256 tag.
pub fn hmac_verify(data: &[u8], expected: &[u8], key: &CipherKey) -> bool {
    let computed = hmac_sign(data, key);
    computed.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = CipherKey::derive(b"secret");
        let plaintext = b"abcdefgh";
        let encrypted = encrypt(plaintext, &key);
        assert_eq!(encrypted.len(), IV_SIZE + plaintext.len());
        let decrypted = decrypt(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_does_not_panic_but_garbles() {
        let key = CipherKey::derive(b"secret");
        let wrong = CipherKey::derive(b"wrong");
        let encrypted = encrypt(b"abcdefgh", &key);
        let decrypted = decrypt(&encrypted, &wrong).unwrap();
        assert_ne!(decrypted, b"abcdefgh");
    }

    #[test]
    fn decrypt_too_short_returns_none() {
        let key = CipherKey::derive(b"secret");
        assert!(decrypt(&[1, 2, 3], &key).is_none());
    }

    #[test]
    fn hmac_roundtrip() {
        let key = CipherKey::derive(b"secret");
        let data = b"hello world";
        let tag = hmac_sign(data, &key);
        assert!(hmac_verify(data, &tag, &key));
    }

    #[test]
    fn hmac_tamper_detected() {
        let key = CipherKey::derive(b"secret");
        let data = b"hello world";
        let mut tag = hmac_sign(data, &key);
        tag[0] ^= 0xFF;
        assert!(!hmac_verify(data, &tag, &key));
    }
}
