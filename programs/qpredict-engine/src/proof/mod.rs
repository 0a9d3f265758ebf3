//! Provably-fair layer (spec.md §4.7): canonical JSON, the commitment
//! hash chain, bet/market commitments, Merkle solvency proofs, and the
//! resolution proof package. SHA-256 and HMAC-SHA-256 are the only
//! primitives used anywhere in this module.

pub mod canonical;
pub mod chain;
pub mod commitment;
pub mod merkle;
pub mod package;

pub use canonical::canonical_json;
pub use chain::{append_entry, verify_chain_sequence, ChainVerification};
pub use commitment::{bet_commitment, market_commitment};
pub use merkle::{build_merkle_tree, inclusion_proof, MerkleNode};
pub use package::{build_resolution_package, verify_resolution_package, ResolutionProofPackage};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn hmac_sha256_hex(secret: &str, data: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_hmac_sha256(secret: &str, data: &str, signature_hex: &str) -> bool {
    let expected = hmac_sha256_hex(secret, data);
    expected == signature_hex
}
