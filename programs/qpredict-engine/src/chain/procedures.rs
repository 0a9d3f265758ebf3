//! Fixed-size little-endian procedure payloads for the Quottery smart
//! contract (spec.md §4.5). Each `encode` produces exactly the byte
//! count named in the spec; field order matches the listed layout.

use super::date::pack_date;
use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Utc};

pub const ISSUE_BET_SIZE: usize = 600;
pub const JOIN_BET_SIZE: usize = 12;
pub const PUBLISH_RESULT_SIZE: usize = 8;
pub const CANCEL_BET_SIZE: usize = 4;

/// Lowercase ASCII, left-padded into 32 bytes, null-terminated.
pub fn encode_id32(id: &str) -> EngineResult<[u8; 32]> {
    let lower = id.to_ascii_lowercase();
    if lower.len() >= 32 || !lower.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(EngineError::InvalidMarketParams(format!(
            "id '{id}' does not fit the 32-byte encoded field"
        )));
    }
    let mut buf = [0u8; 32];
    let padded_start = 32 - 1 - lower.len();
    buf[padded_start..padded_start + lower.len()].copy_from_slice(lower.as_bytes());
    Ok(buf)
}

pub struct IssueBetParams<'a> {
    pub bet_id: &'a str,
    pub option_ids: [&'a str; 8],
    pub oracle_public_keys: [[u8; 32]; 8],
    pub oracle_fees: [u32; 8],
    pub close_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount_per_slot: i64,
    pub max_slots: u32,
    pub option_count: u32,
}

pub fn encode_issue_bet(params: &IssueBetParams) -> EngineResult<[u8; ISSUE_BET_SIZE]> {
    let mut buf = [0u8; ISSUE_BET_SIZE];
    let mut offset = 0usize;

    buf[offset..offset + 32].copy_from_slice(&encode_id32(params.bet_id)?);
    offset += 32;

    for option_id in params.option_ids.iter() {
        buf[offset..offset + 32].copy_from_slice(&encode_id32(option_id)?);
        offset += 32;
    }

    for key in params.oracle_public_keys.iter() {
        buf[offset..offset + 32].copy_from_slice(key);
        offset += 32;
    }

    for fee in params.oracle_fees.iter() {
        buf[offset..offset + 4].copy_from_slice(&fee.to_le_bytes());
        offset += 4;
    }

    buf[offset..offset + 4].copy_from_slice(&pack_date(params.close_date)?.to_le_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&pack_date(params.end_date)?.to_le_bytes());
    offset += 4;
    buf[offset..offset + 8].copy_from_slice(&params.amount_per_slot.to_le_bytes());
    offset += 8;
    buf[offset..offset + 4].copy_from_slice(&params.max_slots.to_le_bytes());
    offset += 4;
    buf[offset..offset + 4].copy_from_slice(&params.option_count.to_le_bytes());
    offset += 4;

    debug_assert_eq!(offset, ISSUE_BET_SIZE);
    Ok(buf)
}

pub fn encode_join_bet(bet_id: u32, slot_count: u32, option: u32) -> [u8; JOIN_BET_SIZE] {
    let mut buf = [0u8; JOIN_BET_SIZE];
    buf[0..4].copy_from_slice(&bet_id.to_le_bytes());
    buf[4..8].copy_from_slice(&slot_count.to_le_bytes());
    buf[8..12].copy_from_slice(&option.to_le_bytes());
    buf
}

pub fn encode_publish_result(bet_id: u32, winning_option: u32) -> [u8; PUBLISH_RESULT_SIZE] {
    let mut buf = [0u8; PUBLISH_RESULT_SIZE];
    buf[0..4].copy_from_slice(&bet_id.to_le_bytes());
    buf[4..8].copy_from_slice(&winning_option.to_le_bytes());
    buf
}

pub fn encode_cancel_bet(bet_id: u32) -> [u8; CANCEL_BET_SIZE] {
    bet_id.to_le_bytes()
}

/// Parsed `getBetInfo` response. The wire struct is ~692 bytes; the
/// fields a caller actually needs are pulled out here while preserving
/// the field offsets documented below so future fields can be added
/// without reshuffling existing ones.
#[derive(Debug, Clone)]
pub struct BetInfo {
    pub bet_id: u32,
    pub creator: [u8; 32],
    pub description: String,
    pub option_count: u32,
    pub max_slots: u32,
    pub close_date: u32,
    pub end_date: u32,
    pub current_option_slots: [u32; 8],
}

const OFFSET_BET_ID: usize = 0;
const OFFSET_CREATOR: usize = 4;
const OFFSET_DESCRIPTION: usize = 36;
const DESCRIPTION_LEN: usize = 32;
const OFFSET_OPTION_COUNT: usize = OFFSET_DESCRIPTION + DESCRIPTION_LEN;
const OFFSET_MAX_SLOTS: usize = OFFSET_OPTION_COUNT + 4;
const OFFSET_CLOSE_DATE: usize = OFFSET_MAX_SLOTS + 4;
const OFFSET_END_DATE: usize = OFFSET_CLOSE_DATE + 4;
const OFFSET_OPTION_SLOTS: usize = OFFSET_END_DATE + 4;
pub const BET_INFO_SIZE: usize = OFFSET_OPTION_SLOTS + 8 * 4;

pub fn parse_bet_info(buf: &[u8]) -> EngineResult<BetInfo> {
    if buf.len() < BET_INFO_SIZE {
        return Err(EngineError::RpcDecode(format!(
            "getBetInfo response too short: {} < {BET_INFO_SIZE}",
            buf.len()
        )));
    }

    let bet_id = u32::from_le_bytes(buf[OFFSET_BET_ID..OFFSET_BET_ID + 4].try_into().unwrap());
    let mut creator = [0u8; 32];
    creator.copy_from_slice(&buf[OFFSET_CREATOR..OFFSET_CREATOR + 32]);

    let raw_desc = &buf[OFFSET_DESCRIPTION..OFFSET_DESCRIPTION + DESCRIPTION_LEN];
    let nul = raw_desc.iter().position(|&b| b == 0).unwrap_or(raw_desc.len());
    let description = String::from_utf8_lossy(&raw_desc[..nul]).to_string();

    let option_count = u32::from_le_bytes(
        buf[OFFSET_OPTION_COUNT..OFFSET_OPTION_COUNT + 4]
            .try_into()
            .unwrap(),
    );
    let max_slots = u32::from_le_bytes(buf[OFFSET_MAX_SLOTS..OFFSET_MAX_SLOTS + 4].try_into().unwrap());
    let close_date = u32::from_le_bytes(
        buf[OFFSET_CLOSE_DATE..OFFSET_CLOSE_DATE + 4]
            .try_into()
            .unwrap(),
    );
    let end_date = u32::from_le_bytes(buf[OFFSET_END_DATE..OFFSET_END_DATE + 4].try_into().unwrap());

    let mut current_option_slots = [0u32; 8];
    for (i, slot) in current_option_slots.iter_mut().enumerate() {
        let start = OFFSET_OPTION_SLOTS + i * 4;
        *slot = u32::from_le_bytes(buf[start..start + 4].try_into().unwrap());
    }

    Ok(BetInfo {
        bet_id,
        creator,
        description,
        option_count,
        max_slots,
        close_date,
        end_date,
        current_option_slots,
    })
}

/// Result of a broadcast send (spec.md §4.5 send pipeline).
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_id: String,
    pub target_tick: u32,
    pub tx_size: usize,
}

/// `getActiveBet`: `u32` count followed by `count * u32` ids.
pub fn parse_active_bet_ids(buf: &[u8]) -> EngineResult<Vec<u32>> {
    if buf.len() < 4 {
        return Err(EngineError::RpcDecode("getActiveBet response too short".into()));
    }
    let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let expected_len = 4 + count * 4;
    if buf.len() < expected_len {
        return Err(EngineError::RpcDecode(
            "getActiveBet response truncated".into(),
        ));
    }
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let start = 4 + i * 4;
        ids.push(u32::from_le_bytes(buf[start..start + 4].try_into().unwrap()));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_bet_is_12_bytes_in_order() {
        let buf = encode_join_bet(7, 3, 1);
        assert_eq!(buf.len(), JOIN_BET_SIZE);
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 7);
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 1);
    }

    #[test]
    fn id32_is_padded_and_null_terminated() {
        let encoded = encode_id32("btc").unwrap();
        assert_eq!(encoded[31], 0);
        assert_eq!(&encoded[32 - 1 - 3..32 - 1], b"btc");
    }

    #[test]
    fn active_bet_ids_round_trip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_le_bytes());
        for id in [10u32, 20, 30] {
            buf.extend_from_slice(&id.to_le_bytes());
        }
        assert_eq!(parse_active_bet_ids(&buf).unwrap(), vec![10, 20, 30]);
    }
}
