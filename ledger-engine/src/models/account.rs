//! Account model and the natural-balance sign rule.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account categories, one per chart-of-accounts subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    CurrentAsset,
    OtherCurrentAsset,
    Stock,
    CashAndBank,
    FixedAsset,
    Expense,
    CostOfGoodsSold,
    CurrentLiability,
    OtherCurrentLiability,
    LongTermLiability,
    OtherLiability,
    CreditCard,
    OwnersEquity,
    RetainedEarnings,
    Income,
    OtherIncome,
}

impl AccountType {
    /// String representation for the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentAsset => "currentasset",
            Self::OtherCurrentAsset => "othercurrentasset",
            Self::Stock => "stock",
            Self::CashAndBank => "cashandbank",
            Self::FixedAsset => "fixedasset",
            Self::Expense => "expense",
            Self::CostOfGoodsSold => "costofgoodssold",
            Self::CurrentLiability => "currentliability",
            Self::OtherCurrentLiability => "othercurrentliability",
            Self::LongTermLiability => "longtermliability",
            Self::OtherLiability => "otherliability",
            Self::CreditCard => "creditcard",
            Self::OwnersEquity => "ownersequity",
            Self::RetainedEarnings => "retainedearnings",
            Self::Income => "income",
            Self::OtherIncome => "otherincome",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "currentasset" => Some(Self::CurrentAsset),
            "othercurrentasset" => Some(Self::OtherCurrentAsset),
            "stock" => Some(Self::Stock),
            "cashandbank" => Some(Self::CashAndBank),
            "fixedasset" => Some(Self::FixedAsset),
            "expense" => Some(Self::Expense),
            "costofgoodssold" => Some(Self::CostOfGoodsSold),
            "currentliability" => Some(Self::CurrentLiability),
            "othercurrentliability" => Some(Self::OtherCurrentLiability),
            "longtermliability" => Some(Self::LongTermLiability),
            "otherliability" => Some(Self::OtherLiability),
            "creditcard" => Some(Self::CreditCard),
            "ownersequity" => Some(Self::OwnersEquity),
            "retainedearnings" => Some(Self::RetainedEarnings),
            "income" => Some(Self::Income),
            "otherincome" => Some(Self::OtherIncome),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a debit increases this account type's stored balance.
///
/// Every posting and reversal path shares this one predicate; the sign of
/// every balance mutation in the engine is derived from it.
pub fn is_debit_normal(account_type: AccountType) -> bool {
    matches!(
        account_type,
        AccountType::CurrentAsset
            | AccountType::OtherCurrentAsset
            | AccountType::Stock
            | AccountType::CashAndBank
            | AccountType::FixedAsset
            | AccountType::Expense
            | AccountType::CostOfGoodsSold
    )
}

/// Top-level report categories, each expanding to its account types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterCategory {
    Assets,
    Liability,
    Equity,
    Income,
    Expense,
}

impl MasterCategory {
    pub fn account_types(&self) -> &'static [AccountType] {
        match self {
            Self::Assets => &[
                AccountType::CurrentAsset,
                AccountType::OtherCurrentAsset,
                AccountType::Stock,
                AccountType::CashAndBank,
                AccountType::FixedAsset,
            ],
            Self::Liability => &[
                AccountType::CurrentLiability,
                AccountType::OtherCurrentLiability,
                AccountType::LongTermLiability,
                AccountType::OtherLiability,
                AccountType::CreditCard,
            ],
            Self::Equity => &[AccountType::OwnersEquity, AccountType::RetainedEarnings],
            Self::Income => &[AccountType::Income, AccountType::OtherIncome],
            Self::Expense => &[AccountType::Expense, AccountType::CostOfGoodsSold],
        }
    }
}

/// Singleton accounts the engine resolves by role rather than by display
/// name. Assigned once at organization setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WellKnownAccount {
    InputVat,
    OutputVat,
    /// Virtual: displayed amount is always `OutputVat - InputVat`,
    /// patched on read, never stored.
    VatPayable,
    /// Virtual: negation of `VatPayable`.
    VatReceivable,
    OwnersEquity,
    Drawings,
    SalesIncome,
    ShippingCharge,
    LateFee,
}

impl WellKnownAccount {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputVat => "input_vat",
            Self::OutputVat => "output_vat",
            Self::VatPayable => "vat_payable",
            Self::VatReceivable => "vat_receivable",
            Self::OwnersEquity => "owners_equity",
            Self::Drawings => "drawings",
            Self::SalesIncome => "sales_income",
            Self::ShippingCharge => "shipping_charge",
            Self::LateFee => "late_fee",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// Leaf ledger account.
///
/// `amount` is the running balance: the algebraic sum of every posted
/// transaction under the natural-balance sign rule. It is mutated only by
/// the posting and reversal engines, as atomic increments at the store.
/// `debit` and `credit` are cumulative lifetime totals.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub account_type: AccountType,
    pub account_name: String,
    pub account_code: String,
    pub amount: Decimal,
    pub debit: Decimal,
    pub credit: Decimal,
    pub status: AccountStatus,
    /// Locked from deletion (system accounts, VAT accounts, AR/AP parents' children).
    pub fixed: bool,
    pub cost_center: Option<Uuid>,
    /// Owning parent account, when this account is a declared child.
    pub group_account: Option<Uuid>,
    pub well_known: Option<WellKnownAccount>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_debit_normal(&self) -> bool {
        is_debit_normal(self.account_type)
    }
}

/// Input for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub account_type: AccountType,
    pub account_name: String,
    pub account_code: String,
    pub fixed: bool,
    pub cost_center: Option<Uuid>,
    pub group_account: Option<Uuid>,
    pub well_known: Option<WellKnownAccount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_normal_covers_asset_and_expense_types() {
        for t in [
            AccountType::CurrentAsset,
            AccountType::OtherCurrentAsset,
            AccountType::Stock,
            AccountType::CashAndBank,
            AccountType::FixedAsset,
            AccountType::Expense,
            AccountType::CostOfGoodsSold,
        ] {
            assert!(is_debit_normal(t), "{t} should be debit-normal");
        }
    }

    #[test]
    fn credit_normal_covers_liability_equity_income_types() {
        for t in [
            AccountType::CurrentLiability,
            AccountType::OtherCurrentLiability,
            AccountType::LongTermLiability,
            AccountType::OtherLiability,
            AccountType::CreditCard,
            AccountType::OwnersEquity,
            AccountType::RetainedEarnings,
            AccountType::Income,
            AccountType::OtherIncome,
        ] {
            assert!(!is_debit_normal(t), "{t} should be credit-normal");
        }
    }

    #[test]
    fn account_type_round_trips_through_str() {
        for t in [
            AccountType::CurrentAsset,
            AccountType::CostOfGoodsSold,
            AccountType::CreditCard,
            AccountType::OtherIncome,
        ] {
            assert_eq!(AccountType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(AccountType::from_str("nonsense"), None);
    }

    #[test]
    fn master_categories_partition_the_account_types() {
        let mut seen = std::collections::HashSet::new();
        for cat in [
            MasterCategory::Assets,
            MasterCategory::Liability,
            MasterCategory::Equity,
            MasterCategory::Income,
            MasterCategory::Expense,
        ] {
            for t in cat.account_types() {
                assert!(seen.insert(*t), "{t} appears in more than one category");
            }
        }
        assert_eq!(seen.len(), 16);
    }
}
