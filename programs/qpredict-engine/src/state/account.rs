use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub display_name: Option<String>,
    pub balance_qu: i64,
    pub total_deposited_qu: i64,
    pub total_withdrawn_qu: i64,
    pub total_bet_qu: i64,
    pub total_won_qu: i64,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Account {
            address: address.into(),
            display_name: None,
            balance_qu: 0,
            total_deposited_qu: 0,
            total_withdrawn_qu: 0,
            total_bet_qu: 0,
            total_won_qu: 0,
        }
    }
}
