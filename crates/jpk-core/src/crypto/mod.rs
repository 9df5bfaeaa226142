//! Cryptographic primitives for JPK archives: key derivation, one-shot
//! AES-256-CTR encrypt/decrypt, and HMAC-SHA256 compute/verify.

mod key;
mod primitives;

pub use key::CipherKey;
pub use primitives::{decrypt, encrypt, hmac_sign, hmac_verify, IV_SIZE, MAC_SIZE};
