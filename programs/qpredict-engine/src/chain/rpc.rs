use super::breaker::CircuitBreaker;
use super::identity::derive_public_address;
use super::procedures::{
    encode_cancel_bet, encode_issue_bet, encode_join_bet, encode_publish_result,
    parse_active_bet_ids, parse_bet_info, BetInfo, IssueBetParams, TxReceipt,
};
use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FEE_PER_SLOT_PER_HOUR: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeInfo {
    pub current_tick: u32,
    pub current_epoch: u32,
    pub fee_per_slot_per_hour: Option<i64>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    contract_index: u32,
    input_type: u16,
    payload_hex: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    response_hex: String,
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    source_identity: &'a str,
    destination_identity: &'a str,
    amount: i64,
    tick: u32,
    input_type: u16,
    payload_hex: &'a str,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    tx_id: String,
}

/// Typed client over the Quottery smart contract (spec.md §4.5), with
/// endpoint failover and circuit-breaker integration.
pub struct ChainClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    sticky: AtomicUsize,
    pub breaker: CircuitBreaker,
}

impl ChainClient {
    pub fn new(endpoints: Vec<String>) -> Self {
        ChainClient {
            http: reqwest::Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
            endpoints,
            sticky: AtomicUsize::new(0),
            breaker: CircuitBreaker::new(),
        }
    }

    fn ring_len(&self) -> usize {
        self.endpoints.len().max(1)
    }

    /// Tries each endpoint starting at the sticky pointer; on success the
    /// sticky pointer is updated to that endpoint (spec.md §4.5 endpoint
    /// failover).
    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> EngineResult<R> {
        if !self.breaker.is_healthy() {
            return Err(EngineError::CircuitOpen);
        }
        if self.endpoints.is_empty() {
            return Err(EngineError::NoHealthyEndpoint);
        }

        let start = self.sticky.load(Ordering::SeqCst) % self.ring_len();
        let mut last_err = None;

        for offset in 0..self.ring_len() {
            let idx = (start + offset) % self.ring_len();
            let base = &self.endpoints[idx];
            let url = format!("{base}{path}");
            match self.http.post(&url).json(body).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.json::<R>().await {
                        Ok(parsed) => {
                            self.sticky.store(idx, Ordering::SeqCst);
                            self.breaker.record_success();
                            return Ok(parsed);
                        }
                        Err(e) => {
                            last_err = Some(EngineError::RpcDecode(e.to_string()));
                        }
                    },
                    Err(e) => {
                        last_err = Some(EngineError::RpcTransient {
                            endpoint: base.clone(),
                            source: e,
                        });
                    }
                },
                Err(e) => {
                    warn!(endpoint = %base, error = %e, "rpc call failed, trying next endpoint");
                    last_err = Some(EngineError::RpcTransient {
                        endpoint: base.clone(),
                        source: e,
                    });
                }
            }
        }

        if self.breaker.record_failure() {
            warn!("circuit breaker tripped open after consecutive RPC failures");
        }
        Err(last_err.unwrap_or(EngineError::NoHealthyEndpoint))
    }

    pub async fn get_node_info(&self) -> EngineResult<NodeInfo> {
        self.post_json("/v1/node-info", &serde_json::json!({})).await
    }

    pub async fn current_tick(&self) -> EngineResult<u32> {
        Ok(self.get_node_info().await?.current_tick)
    }

    /// Falls back to a conservative default fee when `getNodeInfo` fails
    /// (spec.md §4.5 issue-fee computation).
    pub async fn fee_per_slot_per_hour(&self) -> i64 {
        match self.get_node_info().await {
            Ok(info) => info.fee_per_slot_per_hour.unwrap_or(DEFAULT_FEE_PER_SLOT_PER_HOUR),
            Err(_) => DEFAULT_FEE_PER_SLOT_PER_HOUR,
        }
    }

    pub async fn get_balance(&self, address: &str) -> EngineResult<i64> {
        #[derive(Serialize)]
        struct Req<'a> {
            identity: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            balance: i64,
        }
        let resp: Resp = self
            .post_json("/v1/balance", &Req { identity: address })
            .await?;
        Ok(resp.balance)
    }

    async fn query_contract(&self, input_type: u16, payload: &[u8]) -> EngineResult<Vec<u8>> {
        let req = QueryRequest {
            contract_index: super::QUOTTERY_CONTRACT_INDEX,
            input_type,
            payload_hex: &hex::encode(payload),
        };
        let resp: QueryResponse = self.post_json("/v1/contract-query", &req).await?;
        hex::decode(&resp.response_hex).map_err(|e| EngineError::RpcDecode(e.to_string()))
    }

    pub async fn get_active_bet(&self) -> EngineResult<Vec<u32>> {
        let raw = self.query_contract(2, &[]).await?;
        parse_active_bet_ids(&raw)
    }

    pub async fn get_bet_info(&self, bet_id: u32) -> EngineResult<BetInfo> {
        let raw = self.query_contract(1, &bet_id.to_le_bytes()).await?;
        parse_bet_info(&raw)
    }

    pub async fn get_bet_by_creator(&self, creator_address: &str) -> EngineResult<Vec<u32>> {
        let raw = self
            .query_contract(3, creator_address.as_bytes())
            .await?;
        parse_active_bet_ids(&raw)
    }

    /// Bet-id discovery: scans `getActiveBet` newest-first, matching by
    /// case-insensitive exact equality on the description (spec.md §4.5).
    pub async fn discover_bet_id(&self, description: &str) -> EngineResult<Option<u32>> {
        let mut ids = self.get_active_bet().await?;
        ids.sort_unstable_by(|a, b| b.cmp(a));
        for id in ids {
            match self.get_bet_info(id).await {
                Ok(info) => {
                    if info.description.eq_ignore_ascii_case(description) {
                        return Ok(Some(id));
                    }
                }
                Err(e) => debug!(bet_id = id, error = %e, "getBetInfo failed during discovery"),
            }
        }
        Ok(None)
    }

    async fn broadcast(
        &self,
        seed: &str,
        destination: &str,
        amount: i64,
        input_type: u16,
        payload: &[u8],
    ) -> EngineResult<TxReceipt> {
        let source = derive_public_address(seed);
        let tick = self.current_tick().await?;
        let target_tick = tick + 5;

        let req = BroadcastRequest {
            source_identity: &source,
            destination_identity: destination,
            amount,
            tick: target_tick,
            input_type,
            payload_hex: &hex::encode(payload),
        };
        let resp: BroadcastResponse = self.post_json("/v1/broadcast-transaction", &req).await?;

        Ok(TxReceipt {
            tx_id: resp.tx_id,
            target_tick,
            tx_size: payload.len(),
        })
    }

    pub async fn send_issue_bet(
        &self,
        seed: &str,
        params: &IssueBetParams<'_>,
        amount: i64,
    ) -> EngineResult<TxReceipt> {
        let payload = encode_issue_bet(params)?;
        self.broadcast(
            seed,
            &hex::encode(super::quottery_destination()),
            amount,
            0,
            &payload,
        )
        .await
    }

    pub async fn send_join_bet(
        &self,
        seed: &str,
        amount: i64,
        bet_id: u32,
        slots: u32,
        option: u32,
    ) -> EngineResult<TxReceipt> {
        let payload = encode_join_bet(bet_id, slots, option);
        self.broadcast(
            seed,
            &hex::encode(super::quottery_destination()),
            amount,
            1,
            &payload,
        )
        .await
    }

    pub async fn send_publish_result(
        &self,
        seed: &str,
        bet_id: u32,
        winning_option: u32,
    ) -> EngineResult<TxReceipt> {
        let payload = encode_publish_result(bet_id, winning_option);
        self.broadcast(
            seed,
            &hex::encode(super::quottery_destination()),
            0,
            2,
            &payload,
        )
        .await
    }

    pub async fn send_cancel_bet(&self, seed: &str, bet_id: u32) -> EngineResult<TxReceipt> {
        let payload = encode_cancel_bet(bet_id);
        self.broadcast(
            seed,
            &hex::encode(super::quottery_destination()),
            0,
            3,
            &payload,
        )
        .await
    }

    /// Plain QU transfer, used by the escrow sweep/refund paths.
    pub async fn send_transfer(
        &self,
        seed: &str,
        destination: &str,
        amount: i64,
    ) -> EngineResult<TxReceipt> {
        self.broadcast(seed, destination, amount, u16::MAX, &[]).await
    }
}

/// `max_slots * option_count * fee_per_slot_per_hour * ceil(hours_until_end)`
/// (spec.md §4.5).
pub fn compute_issue_fee(
    max_slots: u32,
    option_count: u32,
    fee_per_slot_per_hour: i64,
    hours_until_end: f64,
) -> i64 {
    let hours = hours_until_end.ceil().max(0.0) as i64;
    (max_slots as i64) * (option_count as i64) * fee_per_slot_per_hour * hours
}
