//! Running-balance recomputation after a bulk transaction delete.
//!
//! Deleting a document's transactions leaves every later entry on the
//! affected accounts with a stale `running_balance`. This worker re-walks
//! each account's history from the earliest deleted entry's timestamp,
//! recomputing the cumulative balance. It is a tracked, retryable unit of
//! work: serialized per account so concurrent recomputations over
//! overlapping ranges cannot interleave, and idempotent because it writes
//! absolute recomputed values.

use std::sync::Arc;

use dashmap::DashMap;
use ledger_core::retry::{retry_op, RetryConfig};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::RebalanceSeed;
use crate::store::LedgerStore;

use super::metrics::REBALANCE_RUNS_TOTAL;

pub struct Rebalancer<S> {
    store: Arc<S>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    retry: RetryConfig,
}

impl<S: LedgerStore> Rebalancer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Recompute one account's running balances from the seed onwards.
    /// Returns the number of rows whose stored balance changed.
    #[instrument(skip(self, seed), fields(organization = %organization, account_id = %seed.account_id))]
    pub async fn run(
        &self,
        organization: Uuid,
        seed: &RebalanceSeed,
    ) -> Result<u64, LedgerError> {
        let lock = {
            let entry = self.locks.entry(seed.account_id).or_default();
            Arc::clone(entry.value())
        };
        let _guard = lock.lock().await;

        let result = retry_op(&self.retry, "rebalance_account", || {
            self.recompute_once(organization, seed)
        })
        .await;

        match &result {
            Ok(_) => {
                REBALANCE_RUNS_TOTAL.with_label_values(&["ok"]).inc();
            }
            Err(e) => {
                REBALANCE_RUNS_TOTAL.with_label_values(&["error"]).inc();
                warn!(
                    account_id = %seed.account_id,
                    error = %e,
                    "running-balance recomputation failed after retries"
                );
            }
        }

        result
    }

    async fn recompute_once(
        &self,
        organization: Uuid,
        seed: &RebalanceSeed,
    ) -> Result<u64, LedgerError> {
        let account = self
            .store
            .get_account(organization, seed.account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account does not exist"))?;

        let mut running = self
            .store
            .last_running_balance_before(organization, seed.account_id, seed.since)
            .await?
            .unwrap_or(Decimal::ZERO);

        let transactions = self
            .store
            .transactions_for_account_since(organization, seed.account_id, seed.since)
            .await?;

        let mut updated = 0;
        for transaction in &transactions {
            running += transaction.signed_delta(account.account_type);
            if transaction.running_balance != running {
                self.store
                    .set_running_balance(organization, transaction.transaction_id, running)
                    .await?;
                updated += 1;
            }
        }

        Ok(updated)
    }
}
