use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Swept,
    Archived,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Swept => "swept",
            KeyStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "active" => KeyStatus::Active,
            "swept" => KeyStatus::Swept,
            "archived" => KeyStatus::Archived,
            _ => return None,
        })
    }
}

/// AEAD-encrypted seed material for one escrow's on-chain identity. On
/// transition to `archived`, `{ciphertext, iv, tag}` are overwritten with
/// fresh random bytes of equal length in the same write (spec.md §4.8) —
/// the storage layer guarantees this, see `db::keys::archive_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowKey {
    pub escrow_id: String,
    pub ciphertext_hex: String,
    pub iv_hex: String,
    pub tag_hex: String,
    pub status: KeyStatus,
}
