//! Immutable ledger entry rows and the store-level posting instruction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::account::{AccountType, is_debit_normal};
use super::document::DocumentKind;

/// One ledger entry line. Exactly one of `debit`/`credit` is non-zero.
///
/// Created only by the posting engine; deleted only by the reversal
/// engine, in bulk by source document.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub account: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Snapshot of the account's `amount` immediately after this entry
    /// was applied.
    pub running_balance: Decimal,
    /// Human reference of the source document (e.g. `JV-001`).
    pub reference: String,
    pub document_id: Uuid,
    pub kind: DocumentKind,
    pub created_utc: DateTime<Utc>,
}

impl Transaction {
    /// Signed contribution of this entry to the account's balance under
    /// the natural-balance sign rule.
    pub fn signed_delta(&self, account_type: AccountType) -> Decimal {
        if is_debit_normal(account_type) {
            self.debit - self.credit
        } else {
            self.credit - self.debit
        }
    }
}

/// Store-level instruction for one account mutation within a document
/// posting. The store applies `debit`/`credit` to the account's lifetime
/// totals, `amount_delta` to its balance (as an atomic increment), and
/// records a transaction row capturing the post-increment balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Signed balance change, already translated through the account's
    /// natural-balance sign by the engine.
    pub amount_delta: Decimal,
}

impl Movement {
    /// Movement for a debit against the given account.
    pub fn debit(account_id: Uuid, amount: Decimal, debit_normal: bool) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
            amount_delta: if debit_normal { amount } else { -amount },
        }
    }

    /// Movement for a credit against the given account.
    pub fn credit(account_id: Uuid, amount: Decimal, debit_normal: bool) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
            amount_delta: if debit_normal { -amount } else { amount },
        }
    }

    /// The exact inverse of this movement, used by the reversal engine.
    pub fn inverse(&self) -> Self {
        Self {
            account_id: self.account_id,
            debit: -self.debit,
            credit: -self.credit,
            amount_delta: -self.amount_delta,
        }
    }
}

/// Starting point for a running-balance recomputation on one account,
/// produced when transactions are bulk-deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceSeed {
    pub account_id: Uuid,
    /// Creation time of the earliest deleted entry; recomputation walks
    /// every remaining entry at or after this instant.
    pub since: DateTime<Utc>,
}
