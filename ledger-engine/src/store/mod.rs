//! Ledger Store: durable Account, ParentAccount, Transaction, Document
//! and CostCenter records behind one tenant-scoped contract.
//!
//! Two implementations share the contract: [`PgLedgerStore`] (Postgres,
//! the durable deployment) and [`MemoryLedgerStore`] (hermetic, used by
//! the integration tests and embedded scenarios). Balance mutation is an
//! atomic increment at the store, never read-modify-write from a stale
//! snapshot, and everything one document posts or reverts is applied
//! all-or-nothing.

mod memory;
mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Account, AccountStatus, AccountType, ApprovalStatus, CostCenter, CostCenterEntry,
    CreateAccount, CreateCostCenter, CreateDocument, CreateParentAccount, Document, DocumentKind,
    Movement, ParentAccount, RebalanceSeed, Transaction, WellKnownAccount, WellKnownParent,
};

/// Filters for account listing queries.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub account_types: Option<Vec<AccountType>>,
    pub status: Option<AccountStatus>,
    pub cost_center: Option<Uuid>,
}

impl AccountFilter {
    pub fn active() -> Self {
        Self {
            status: Some(AccountStatus::Active),
            ..Default::default()
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        if let Some(status) = self.status {
            if account.status != status {
                return false;
            }
        }
        if let Some(types) = &self.account_types {
            if !types.contains(&account.account_type) {
                return false;
            }
        }
        if let Some(cc) = self.cost_center {
            if account.cost_center != Some(cc) {
                return false;
            }
        }
        true
    }
}

/// Durable create/read/update for the ledger records. Every query is
/// scoped by organization; rows additionally carry the company they
/// belong to.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError>;

    async fn get_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, LedgerError>;

    /// Resolve a singleton account by role (Input VAT, Drawings, ...).
    async fn find_well_known(
        &self,
        organization: Uuid,
        kind: WellKnownAccount,
    ) -> Result<Option<Account>, LedgerError>;

    async fn list_accounts(
        &self,
        organization: Uuid,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError>;

    async fn set_account_status(
        &self,
        organization: Uuid,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, LedgerError>;

    /// Refuses to delete `fixed` accounts and accounts with posted
    /// transactions.
    async fn delete_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<(), LedgerError>;

    // -------------------------------------------------------------------------
    // Parent accounts
    // -------------------------------------------------------------------------

    async fn create_parent_account(
        &self,
        input: &CreateParentAccount,
    ) -> Result<ParentAccount, LedgerError>;

    async fn get_parent_account(
        &self,
        organization: Uuid,
        parent_id: Uuid,
    ) -> Result<Option<ParentAccount>, LedgerError>;

    async fn find_well_known_parent(
        &self,
        organization: Uuid,
        kind: WellKnownParent,
    ) -> Result<Option<ParentAccount>, LedgerError>;

    async fn list_parent_accounts(
        &self,
        organization: Uuid,
    ) -> Result<Vec<ParentAccount>, LedgerError>;

    /// Append an account to the parent's ordered child list.
    async fn append_child(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        account_id: Uuid,
    ) -> Result<ParentAccount, LedgerError>;

    /// Party sub-accounts under AR/AP are looked up by display name.
    async fn find_child_by_name(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        name: &str,
    ) -> Result<Option<Account>, LedgerError>;

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    async fn insert_document(
        &self,
        input: &CreateDocument,
        approval: ApprovalStatus,
    ) -> Result<Document, LedgerError>;

    async fn get_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Option<Document>, LedgerError>;

    async fn update_document(&self, document: &Document) -> Result<(), LedgerError>;

    // -------------------------------------------------------------------------
    // Postings
    // -------------------------------------------------------------------------

    /// Apply one document's movements atomically: for every movement,
    /// increment the account's lifetime `debit`/`credit` and running
    /// `amount`, and insert a transaction row whose `running_balance` is
    /// the post-increment amount. All increments and inserts succeed or
    /// none do.
    async fn apply_movements(
        &self,
        organization: Uuid,
        company: Option<Uuid>,
        reference: &str,
        document_id: Uuid,
        kind: DocumentKind,
        movements: &[Movement],
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Revert one document atomically: apply the given (already negated)
    /// movements as increments without inserting rows, then bulk-delete
    /// every transaction carrying the document id. Returns one rebalance
    /// seed per affected account, at the earliest deleted entry's
    /// timestamp.
    async fn revert_movements(
        &self,
        organization: Uuid,
        document_id: Uuid,
        movements: &[Movement],
    ) -> Result<Vec<RebalanceSeed>, LedgerError>;

    // -------------------------------------------------------------------------
    // Transactions / running-balance recomputation
    // -------------------------------------------------------------------------

    async fn transactions_for_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// All of an account's transactions at or after `since`, in creation
    /// order.
    async fn transactions_for_account_since(
        &self,
        organization: Uuid,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Running balance of the account's last transaction strictly before
    /// `ts`, if any.
    async fn last_running_balance_before(
        &self,
        organization: Uuid,
        account_id: Uuid,
        ts: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LedgerError>;

    async fn set_running_balance(
        &self,
        organization: Uuid,
        transaction_id: Uuid,
        value: Decimal,
    ) -> Result<(), LedgerError>;

    // -------------------------------------------------------------------------
    // Cost centers
    // -------------------------------------------------------------------------

    async fn create_cost_center(
        &self,
        input: &CreateCostCenter,
    ) -> Result<CostCenter, LedgerError>;

    async fn get_cost_center(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
    ) -> Result<Option<CostCenter>, LedgerError>;

    /// Mirror a document's income/expense postings into the side ledger
    /// and bump the running totals.
    async fn cost_center_apply(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        expense: &[CostCenterEntry],
        income: &[CostCenterEntry],
    ) -> Result<(), LedgerError>;

    /// Remove a document's mirrored entries and roll the totals back.
    async fn cost_center_revert(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        document_id: Uuid,
    ) -> Result<(), LedgerError>;
}
