//! Balance Aggregator: read-side views over the ledger. Never mutates
//! stored state.

use std::sync::Arc;

use ledger_core::LedgerError;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    Account, AccountType, MasterCategory, ParentAccount, WellKnownAccount,
};
use crate::store::{AccountFilter, LedgerStore};

/// A parent account with the children present in the queried set and
/// their live sum.
#[derive(Debug, Clone, Serialize)]
pub struct ParentGroup {
    pub parent: ParentAccount,
    pub accounts: Vec<Account>,
    pub total: Decimal,
}

/// One account type's slice of the hierarchy: parent groups, standalone
/// accounts, and the combined total. An account that is a declared child
/// of a parent contributes only through the parent's sum, never again
/// through `others`.
#[derive(Debug, Clone, Serialize)]
pub struct TypeBucket {
    pub account_type: AccountType,
    pub parents: Vec<ParentGroup>,
    pub others: Vec<Account>,
    pub total_amount: Decimal,
}

/// Hierarchy for one master category.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyReport {
    pub category: MasterCategory,
    pub buckets: Vec<TypeBucket>,
    pub total_amount: Decimal,
}

pub struct BalanceAggregator<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> BalanceAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Accounts of one type, with the VAT patch applied.
    #[instrument(skip(self, filter), fields(organization = %organization))]
    pub async fn accounts_by_type(
        &self,
        organization: Uuid,
        account_type: AccountType,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError> {
        let filter = AccountFilter {
            account_types: Some(vec![account_type]),
            ..filter.clone()
        };
        let mut accounts = self.store.list_accounts(organization, &filter).await?;
        self.patch_vat(organization, &mut accounts).await?;
        Ok(accounts)
    }

    /// The full hierarchy for one master category: account type ->
    /// parent groups + standalone accounts + totals.
    #[instrument(skip(self, filter), fields(organization = %organization))]
    pub async fn account_hierarchy(
        &self,
        organization: Uuid,
        category: MasterCategory,
        filter: &AccountFilter,
    ) -> Result<HierarchyReport, LedgerError> {
        let types = category.account_types();
        let filter = AccountFilter {
            account_types: Some(types.to_vec()),
            ..filter.clone()
        };
        let mut accounts = self.store.list_accounts(organization, &filter).await?;
        self.patch_vat(organization, &mut accounts).await?;

        let parents: Vec<ParentAccount> = self
            .store
            .list_parent_accounts(organization)
            .await?
            .into_iter()
            .filter(|p| types.contains(&p.account_type))
            .collect();

        let mut buckets = Vec::new();
        let mut category_total = Decimal::ZERO;

        for account_type in types {
            let of_type: Vec<&Account> = accounts
                .iter()
                .filter(|a| a.account_type == *account_type)
                .collect();
            if of_type.is_empty() {
                continue;
            }

            let type_parents: Vec<&ParentAccount> = parents
                .iter()
                .filter(|p| p.account_type == *account_type)
                .collect();
            let parent_ids: Vec<Uuid> = type_parents.iter().map(|p| p.parent_id).collect();

            let mut groups = Vec::new();
            let mut total_amount = Decimal::ZERO;

            for parent in &type_parents {
                // Children in the parent's declared order, restricted to
                // the currently-queried set so status/type filters hold.
                let children: Vec<Account> = parent
                    .child_accounts
                    .iter()
                    .filter_map(|child_id| {
                        of_type
                            .iter()
                            .find(|a| a.account_id == *child_id)
                            .map(|a| (*a).clone())
                    })
                    .collect();
                if children.is_empty() {
                    continue;
                }
                let total: Decimal = children.iter().map(|a| a.amount).sum();
                total_amount += total;
                groups.push(ParentGroup {
                    parent: (*parent).clone(),
                    accounts: children,
                    total,
                });
            }

            // Standalone accounts contribute directly; declared children
            // already counted through their parent are excluded.
            let others: Vec<Account> = of_type
                .iter()
                .filter(|a| match a.group_account {
                    Some(parent_id) => !parent_ids.contains(&parent_id),
                    None => true,
                })
                .map(|a| (*a).clone())
                .collect();
            total_amount += others.iter().map(|a| a.amount).sum::<Decimal>();

            category_total += total_amount;
            buckets.push(TypeBucket {
                account_type: *account_type,
                parents: groups,
                others,
                total_amount,
            });
        }

        Ok(HierarchyReport {
            category,
            buckets,
            total_amount: category_total,
        })
    }

    /// Patch the virtual VAT rows: "VAT Payable" always displays
    /// `OutputVat - InputVat` and "VAT Receivable" its negation, computed
    /// live. Neither row ever stores a balance of its own.
    async fn patch_vat(
        &self,
        organization: Uuid,
        accounts: &mut [Account],
    ) -> Result<(), LedgerError> {
        let needs_patch = accounts.iter().any(|a| {
            matches!(
                a.well_known,
                Some(WellKnownAccount::VatPayable) | Some(WellKnownAccount::VatReceivable)
            )
        });
        if !needs_patch {
            return Ok(());
        }

        let input = self
            .store
            .find_well_known(organization, WellKnownAccount::InputVat)
            .await?
            .map(|a| a.amount)
            .unwrap_or(Decimal::ZERO);
        let output = self
            .store
            .find_well_known(organization, WellKnownAccount::OutputVat)
            .await?
            .map(|a| a.amount)
            .unwrap_or(Decimal::ZERO);
        let payable = output - input;

        for account in accounts.iter_mut() {
            match account.well_known {
                Some(WellKnownAccount::VatPayable) => account.amount = payable,
                Some(WellKnownAccount::VatReceivable) => account.amount = -payable,
                _ => {}
            }
        }
        Ok(())
    }
}
