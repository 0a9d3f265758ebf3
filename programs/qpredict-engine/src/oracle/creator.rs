use super::{OracleAdapter, OracleResult};
use crate::errors::EngineResult;
use crate::state::market::Market;
use async_trait::async_trait;

/// Custom/creator markets never auto-resolve: the creator is expected
/// to submit an attested result through the operator tooling outside
/// this dispatcher. If nobody ever does, `auto_refund_at` (end_date +
/// 48h, set at market creation) is the only way out, handled by the
/// recovery subsystem rather than here (spec.md §6, §9).
pub struct CreatorAdapter;

impl CreatorAdapter {
    pub fn new() -> Self {
        CreatorAdapter
    }
}

#[async_trait]
impl OracleAdapter for CreatorAdapter {
    async fn can_resolve(&self, _market: &Market) -> bool {
        false
    }

    async fn fetch_result(&self, _market: &Market) -> EngineResult<Option<OracleResult>> {
        Ok(None)
    }
}
