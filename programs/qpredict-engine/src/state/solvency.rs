use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvencyProof {
    pub merkle_root: String,
    pub total_user_balance: i64,
    pub on_chain_balance: i64,
    pub is_solvent: bool,
    pub account_count: u64,
    pub tick: u32,
    pub epoch: u32,
    pub leaves: Vec<String>,
}
