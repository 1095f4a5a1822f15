//! Cost-center side ledger, mirrored in lock-step with posting/reversal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One mirrored posting in a cost center's income or expense array.
/// Keyed by document so reversal removes exactly what posting added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenterEntry {
    pub document_id: Uuid,
    pub reference: String,
    pub account: Uuid,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Departmental side ledger mirroring the income/expense subset of a
/// document's postings, with running totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCenter {
    pub cost_center_id: Uuid,
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub name: String,
    pub expense: Vec<CostCenterEntry>,
    pub income: Vec<CostCenterEntry>,
    pub total_expense: Decimal,
    pub total_income: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a cost center.
#[derive(Debug, Clone)]
pub struct CreateCostCenter {
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub name: String,
}
