use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// The 32-byte key derived from a user-supplied key, used both as the
/// AES-256-CTR key and as the HMAC-SHA256 key.
///
/// Derivation is `SHA-256(userKey)` unconditionally, even when `userKey`
/// is empty — there is no separate "no encryption" code path at the key
/// level, only at the flag level.
pub struct CipherKey(Zeroizing<[u8; 32]>);

impl CipherKey {
    pub fn derive(user_key: &[u8]) -> Self {
        let digest = Sha256::digest(user_key);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(Zeroizing::new(bytes))
    }

    pub fn aes_key(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn mac_key(&self) -> &[u8] {
        self.0.as_slice()
    }
}
