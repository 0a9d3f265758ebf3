//! Key vault (spec.md §4.8): AEAD-encrypted escrow seed storage. Every
//! escrow's 55-letter seed is encrypted at rest under a key derived from
//! the operator-supplied `ESCROW_MASTER_KEY`; nothing ever stores or logs
//! a seed in the clear.

use crate::errors::{EngineError, EngineResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

const SEED_LEN: usize = 55;
const IV_LEN: usize = 12;

pub type MasterKey = [u8; 32];

#[derive(Debug, Clone)]
pub struct EncryptedSeed {
    pub ciphertext_hex: String,
    pub iv_hex: String,
    pub tag_hex: String,
}

/// A 55-lowercase-letter seed, freshly generated for one escrow's on-chain
/// identity. Rejection sampling keeps the distribution uniform over
/// `a`-`z` instead of biasing toward the low end of a modulo reduction.
pub fn generate_seed() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(SEED_LEN);
    while out.len() < SEED_LEN {
        let b = (rng.next_u32() & 0xff) as u8;
        if b < 26 * 9 {
            out.push((b'a' + b % 26) as char);
        }
    }
    out
}

fn is_valid_seed(seed: &str) -> bool {
    seed.len() == SEED_LEN && seed.bytes().all(|b| b.is_ascii_lowercase())
}

/// If `operator_secret` is exactly 64 hex characters, decodes it directly
/// as the 32-byte key; otherwise the key is `SHA256(operator_secret)`
/// (spec.md §4.8).
pub fn derive_master_key(operator_secret: &str) -> MasterKey {
    if operator_secret.len() == 64 && operator_secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(operator_secret) {
            if bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return key;
            }
        }
    }
    let hash = crate::proof::sha256_hex(operator_secret.as_bytes());
    let bytes = hex::decode(hash).expect("sha256_hex always produces valid hex");
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    key
}

/// Encrypts `seed` under `master_key` with a fresh random 12-byte IV.
/// Rejects any seed not in the exactly-55-lowercase-letters format before
/// touching the cipher.
pub fn encrypt_seed(seed: &str, master_key: &MasterKey) -> EngineResult<EncryptedSeed> {
    if !is_valid_seed(seed) {
        return Err(EngineError::InvalidSeedFormat);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
    let mut iv_bytes = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    let mut ciphertext_and_tag = cipher
        .encrypt(nonce, seed.as_bytes())
        .map_err(|_| EngineError::CryptoAead)?;
    // `aes-gcm` appends the 16-byte tag to the ciphertext; split it back
    // out so storage keeps the three fields the spec names separately.
    let tag = ciphertext_and_tag.split_off(ciphertext_and_tag.len() - 16);

    Ok(EncryptedSeed {
        ciphertext_hex: hex::encode(ciphertext_and_tag),
        iv_hex: hex::encode(iv_bytes),
        tag_hex: hex::encode(tag),
    })
}

/// Decrypts and validates the result against the seed format. Either an
/// AEAD failure (wrong key, tampered ciphertext) or a format mismatch is
/// surfaced as an error — the escrow state machine treats both as
/// fatal-for-this-escrow, reverting the claim for manual review.
pub fn decrypt_seed(enc: &EncryptedSeed, master_key: &MasterKey) -> EngineResult<String> {
    let mut ciphertext = hex::decode(&enc.ciphertext_hex).map_err(|_| EngineError::CryptoAead)?;
    let tag = hex::decode(&enc.tag_hex).map_err(|_| EngineError::CryptoAead)?;
    let iv = hex::decode(&enc.iv_hex).map_err(|_| EngineError::CryptoAead)?;
    if iv.len() != IV_LEN || tag.len() != 16 {
        return Err(EngineError::CryptoAead);
    }
    ciphertext.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
    let nonce = Nonce::from_slice(&iv);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| EngineError::CryptoAead)?;
    let seed = String::from_utf8(plaintext).map_err(|_| EngineError::InvalidSeedFormat)?;

    if !is_valid_seed(&seed) {
        return Err(EngineError::InvalidSeedFormat);
    }
    Ok(seed)
}

/// `len` random bytes, hex-encoded. Used for the secure-overwrite step on
/// key archive (spec.md §4.8): the storage layer replaces the ciphertext,
/// iv, and tag with fresh random strings of equal length in the same
/// write that flips the key's status, so there is no window where the
/// original bytes are retrievable under an "archived" row.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_seed() {
        let key = derive_master_key("operator-secret");
        let seed = generate_seed();
        let enc = encrypt_seed(&seed, &key).unwrap();
        let decrypted = decrypt_seed(&enc, &key).unwrap();
        assert_eq!(seed, decrypted);
    }

    #[test]
    fn rejects_malformed_seed_on_encrypt() {
        let key = derive_master_key("operator-secret");
        assert!(encrypt_seed("too-short", &key).is_err());
        assert!(encrypt_seed(&"A".repeat(55), &key).is_err());
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let key_a = derive_master_key("secret-a");
        let key_b = derive_master_key("secret-b");
        let seed = generate_seed();
        let enc = encrypt_seed(&seed, &key_a).unwrap();
        assert!(decrypt_seed(&enc, &key_b).is_err());
    }

    #[test]
    fn hex_64_char_secret_is_decoded_directly() {
        let hex_secret = "11".repeat(32);
        let key = derive_master_key(&hex_secret);
        assert_eq!(hex::encode(key), hex_secret);
    }

    #[test]
    fn generated_seeds_are_well_formed() {
        for _ in 0..20 {
            let seed = generate_seed();
            assert!(is_valid_seed(&seed), "seed {seed} is not 55 lowercase letters");
        }
    }
}
