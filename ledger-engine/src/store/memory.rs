//! In-memory Ledger Store: the same contract as the Postgres store over
//! a single guarded state, for hermetic tests and embedded use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Account, AccountStatus, ApprovalStatus, CostCenter, CostCenterEntry, CreateAccount,
    CreateCostCenter, CreateDocument, CreateParentAccount, Document, DocumentKind, Movement,
    ParentAccount, RebalanceSeed, Transaction, WellKnownAccount, WellKnownParent,
};

use super::{AccountFilter, LedgerStore};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    parents: HashMap<Uuid, ParentAccount>,
    documents: HashMap<Uuid, Document>,
    transactions: Vec<Transaction>,
    cost_centers: HashMap<Uuid, CostCenter>,
    /// Monotonic tick so transactions inserted in one batch still have
    /// strictly increasing timestamps.
    clock_ns: i64,
}

impl State {
    fn next_instant(&mut self) -> DateTime<Utc> {
        self.clock_ns += 1;
        Utc::now() + Duration::nanoseconds(self.clock_ns)
    }
}

/// Hermetic [`LedgerStore`]: every batch commits under one lock, which
/// gives the same all-or-nothing and increment-serialization guarantees
/// the Postgres store gets from its transactions.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<State>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Internal(anyhow::anyhow!("store lock poisoned")))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        let mut state = self.state()?;
        let now = Utc::now();
        let account = Account {
            account_id: Uuid::new_v4(),
            organization: input.organization,
            company: input.company,
            account_type: input.account_type,
            account_name: input.account_name.clone(),
            account_code: input.account_code.clone(),
            amount: Decimal::ZERO,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            status: AccountStatus::Active,
            fixed: input.fixed,
            cost_center: input.cost_center,
            group_account: input.group_account,
            well_known: input.well_known,
            created_utc: now,
            updated_utc: now,
        };
        if let Some(kind) = input.well_known {
            let duplicate = state.accounts.values().any(|a| {
                a.organization == input.organization && a.well_known == Some(kind)
            });
            if duplicate {
                return Err(LedgerError::conflict(format!(
                    "well-known account {} already exists for organization",
                    kind.as_str()
                )));
            }
        }
        state.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn get_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .accounts
            .get(&account_id)
            .filter(|a| a.organization == organization)
            .cloned())
    }

    async fn find_well_known(
        &self,
        organization: Uuid,
        kind: WellKnownAccount,
    ) -> Result<Option<Account>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .accounts
            .values()
            .find(|a| a.organization == organization && a.well_known == Some(kind))
            .cloned())
    }

    async fn list_accounts(
        &self,
        organization: Uuid,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError> {
        let state = self.state()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.organization == organization && filter.matches(a))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        Ok(accounts)
    }

    async fn set_account_status(
        &self,
        organization: Uuid,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, LedgerError> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .filter(|a| a.organization == organization)
            .ok_or_else(|| LedgerError::not_found("account does not exist"))?;
        account.status = status;
        account.updated_utc = Utc::now();
        Ok(account.clone())
    }

    async fn delete_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get(&account_id)
            .filter(|a| a.organization == organization)
            .ok_or_else(|| LedgerError::not_found("account does not exist"))?;
        if account.fixed {
            return Err(LedgerError::invariant("account is locked from deletion"));
        }
        if state.transactions.iter().any(|t| t.account == account_id) {
            return Err(LedgerError::invariant(
                "account has posted transactions and cannot be deleted",
            ));
        }
        state.accounts.remove(&account_id);
        Ok(())
    }

    async fn create_parent_account(
        &self,
        input: &CreateParentAccount,
    ) -> Result<ParentAccount, LedgerError> {
        let mut state = self.state()?;
        let parent = ParentAccount {
            parent_id: Uuid::new_v4(),
            organization: input.organization,
            company: input.company,
            name: input.name.clone(),
            account_type: input.account_type,
            code: input.code.clone(),
            child_accounts: Vec::new(),
            well_known: input.well_known,
            created_utc: Utc::now(),
        };
        state.parents.insert(parent.parent_id, parent.clone());
        Ok(parent)
    }

    async fn get_parent_account(
        &self,
        organization: Uuid,
        parent_id: Uuid,
    ) -> Result<Option<ParentAccount>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .parents
            .get(&parent_id)
            .filter(|p| p.organization == organization)
            .cloned())
    }

    async fn find_well_known_parent(
        &self,
        organization: Uuid,
        kind: WellKnownParent,
    ) -> Result<Option<ParentAccount>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .parents
            .values()
            .find(|p| p.organization == organization && p.well_known == Some(kind))
            .cloned())
    }

    async fn list_parent_accounts(
        &self,
        organization: Uuid,
    ) -> Result<Vec<ParentAccount>, LedgerError> {
        let state = self.state()?;
        let mut parents: Vec<ParentAccount> = state
            .parents
            .values()
            .filter(|p| p.organization == organization)
            .cloned()
            .collect();
        parents.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(parents)
    }

    async fn append_child(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        account_id: Uuid,
    ) -> Result<ParentAccount, LedgerError> {
        let mut state = self.state()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::not_found("child account does not exist"));
        }
        let parent = state
            .parents
            .get_mut(&parent_id)
            .filter(|p| p.organization == organization)
            .ok_or_else(|| LedgerError::not_found("parent account does not exist"))?;
        if !parent.child_accounts.contains(&account_id) {
            parent.child_accounts.push(account_id);
        }
        let parent = parent.clone();
        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.group_account = Some(parent_id);
        }
        Ok(parent)
    }

    async fn find_child_by_name(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        name: &str,
    ) -> Result<Option<Account>, LedgerError> {
        let state = self.state()?;
        let parent = state
            .parents
            .get(&parent_id)
            .filter(|p| p.organization == organization)
            .ok_or_else(|| LedgerError::not_found("parent account does not exist"))?;
        for child_id in &parent.child_accounts {
            if let Some(account) = state.accounts.get(child_id) {
                if account.account_name == name {
                    return Ok(Some(account.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn insert_document(
        &self,
        input: &CreateDocument,
        approval: ApprovalStatus,
    ) -> Result<Document, LedgerError> {
        let mut state = self.state()?;
        let now = Utc::now();
        let document = Document {
            document_id: Uuid::new_v4(),
            organization: input.organization,
            company: input.company,
            reference: input.reference.clone(),
            kind: input.kind,
            approval,
            valid: true,
            items: input.items.clone(),
            transaction_ids: Vec::new(),
            cost_center: input.cost_center,
            party_kind: input.party_kind,
            party_name: input.party_name.clone(),
            subtotal: input.subtotal,
            tax_rate: input.tax_rate,
            shipping_fee: input.shipping_fee,
            late_fee: input.late_fee,
            reviewed_by: None,
            reviewed_utc: None,
            verified_by: None,
            verified_utc: None,
            acknowledged_by: None,
            acknowledged_utc: None,
            approved_by1: None,
            approved_utc1: None,
            approved_by2: None,
            approved_utc2: None,
            approval_comment: None,
            created_utc: now,
            updated_utc: now,
        };
        state.documents.insert(document.document_id, document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Option<Document>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .documents
            .get(&document_id)
            .filter(|d| d.organization == organization)
            .cloned())
    }

    async fn update_document(&self, document: &Document) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        if !state.documents.contains_key(&document.document_id) {
            return Err(LedgerError::not_found("document does not exist"));
        }
        let mut updated = document.clone();
        updated.updated_utc = Utc::now();
        state.documents.insert(document.document_id, updated);
        Ok(())
    }

    async fn apply_movements(
        &self,
        organization: Uuid,
        company: Option<Uuid>,
        reference: &str,
        document_id: Uuid,
        kind: DocumentKind,
        movements: &[Movement],
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut state = self.state()?;

        // Everything is checked before the first mutation so the batch
        // is all-or-nothing under the single lock.
        for movement in movements {
            let account = state
                .accounts
                .get(&movement.account_id)
                .filter(|a| a.organization == organization);
            if account.is_none() {
                return Err(LedgerError::not_found(format!(
                    "account {} does not exist or belongs to another organization",
                    movement.account_id
                )));
            }
        }

        let mut inserted = Vec::with_capacity(movements.len());
        for movement in movements {
            let created_utc = state.next_instant();
            let account = state
                .accounts
                .get_mut(&movement.account_id)
                .ok_or_else(|| LedgerError::not_found("account vanished mid-batch"))?;
            account.debit += movement.debit;
            account.credit += movement.credit;
            account.amount += movement.amount_delta;
            account.updated_utc = created_utc;
            let running_balance = account.amount;

            let transaction = Transaction {
                transaction_id: Uuid::new_v4(),
                organization,
                company,
                account: movement.account_id,
                debit: movement.debit,
                credit: movement.credit,
                running_balance,
                reference: reference.to_string(),
                document_id,
                kind,
                created_utc,
            };
            state.transactions.push(transaction.clone());
            inserted.push(transaction);
        }
        Ok(inserted)
    }

    async fn revert_movements(
        &self,
        organization: Uuid,
        document_id: Uuid,
        movements: &[Movement],
    ) -> Result<Vec<RebalanceSeed>, LedgerError> {
        let mut state = self.state()?;

        for movement in movements {
            let exists = state
                .accounts
                .get(&movement.account_id)
                .map(|a| a.organization == organization)
                .unwrap_or(false);
            if !exists {
                return Err(LedgerError::not_found(format!(
                    "account {} does not exist or belongs to another organization",
                    movement.account_id
                )));
            }
        }

        for movement in movements {
            let now = state.next_instant();
            let account = state
                .accounts
                .get_mut(&movement.account_id)
                .ok_or_else(|| LedgerError::not_found("account vanished mid-batch"))?;
            account.debit += movement.debit;
            account.credit += movement.credit;
            account.amount += movement.amount_delta;
            account.updated_utc = now;
        }

        let mut earliest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        state.transactions.retain(|t| {
            if t.document_id == document_id && t.organization == organization {
                earliest
                    .entry(t.account)
                    .and_modify(|ts| *ts = (*ts).min(t.created_utc))
                    .or_insert(t.created_utc);
                false
            } else {
                true
            }
        });

        Ok(earliest
            .into_iter()
            .map(|(account_id, since)| RebalanceSeed { account_id, since })
            .collect())
    }

    async fn transactions_for_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.organization == organization && t.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn transactions_for_account_since(
        &self,
        organization: Uuid,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state()?;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| {
                t.organization == organization
                    && t.account == account_id
                    && t.created_utc >= since
            })
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.created_utc);
        Ok(transactions)
    }

    async fn last_running_balance_before(
        &self,
        organization: Uuid,
        account_id: Uuid,
        ts: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                t.organization == organization && t.account == account_id && t.created_utc < ts
            })
            .max_by_key(|t| t.created_utc)
            .map(|t| t.running_balance))
    }

    async fn set_running_balance(
        &self,
        organization: Uuid,
        transaction_id: Uuid,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let transaction = state
            .transactions
            .iter_mut()
            .find(|t| t.organization == organization && t.transaction_id == transaction_id)
            .ok_or_else(|| LedgerError::not_found("transaction does not exist"))?;
        transaction.running_balance = value;
        Ok(())
    }

    async fn create_cost_center(
        &self,
        input: &CreateCostCenter,
    ) -> Result<CostCenter, LedgerError> {
        let mut state = self.state()?;
        let cost_center = CostCenter {
            cost_center_id: Uuid::new_v4(),
            organization: input.organization,
            company: input.company,
            name: input.name.clone(),
            expense: Vec::new(),
            income: Vec::new(),
            total_expense: Decimal::ZERO,
            total_income: Decimal::ZERO,
            created_utc: Utc::now(),
        };
        state
            .cost_centers
            .insert(cost_center.cost_center_id, cost_center.clone());
        Ok(cost_center)
    }

    async fn get_cost_center(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
    ) -> Result<Option<CostCenter>, LedgerError> {
        let state = self.state()?;
        Ok(state
            .cost_centers
            .get(&cost_center_id)
            .filter(|c| c.organization == organization)
            .cloned())
    }

    async fn cost_center_apply(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        expense: &[CostCenterEntry],
        income: &[CostCenterEntry],
    ) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let cost_center = state
            .cost_centers
            .get_mut(&cost_center_id)
            .filter(|c| c.organization == organization)
            .ok_or_else(|| LedgerError::not_found("cost center does not exist"))?;
        for entry in expense {
            cost_center.total_expense += entry.amount;
            cost_center.expense.push(entry.clone());
        }
        for entry in income {
            cost_center.total_income += entry.amount;
            cost_center.income.push(entry.clone());
        }
        Ok(())
    }

    async fn cost_center_revert(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        document_id: Uuid,
    ) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let cost_center = state
            .cost_centers
            .get_mut(&cost_center_id)
            .filter(|c| c.organization == organization)
            .ok_or_else(|| LedgerError::not_found("cost center does not exist"))?;
        let removed_expense: Decimal = cost_center
            .expense
            .iter()
            .filter(|e| e.document_id == document_id)
            .map(|e| e.amount)
            .sum();
        let removed_income: Decimal = cost_center
            .income
            .iter()
            .filter(|e| e.document_id == document_id)
            .map(|e| e.amount)
            .sum();
        cost_center.expense.retain(|e| e.document_id != document_id);
        cost_center.income.retain(|e| e.document_id != document_id);
        cost_center.total_expense -= removed_expense;
        cost_center.total_income -= removed_income;
        Ok(())
    }
}
