//! Source documents: the unit of posting and reversal.

use chrono::{DateTime, Utc};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source document kinds that produce ledger postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Journal,
    PettyCash,
    InventoryAdjustment,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Journal => "journal",
            Self::PettyCash => "petty_cash",
            Self::InventoryAdjustment => "inventory_adjustment",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approval workflow state. `None` means the organization does not
/// require approval for this document kind and postings apply
/// immediately on create/edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    None,
    Pending,
    Approved1,
    Approved2,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Approved1 => "approved1",
            Self::Approved2 => "approved2",
            Self::Rejected => "rejected",
        }
    }
}

/// Requests against the approval state machine. `Review`, `Verify` and
/// `Acknowledge` move the signature workflow forward without touching
/// postings; `Correction` resets signatures and records a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
    Review,
    Verify,
    Acknowledge,
    Correction { comment: String },
    Invalidate,
}

/// Which side of the books the document's counterparty sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Vendor,
}

/// One document line: a target account and a debit-or-credit amount,
/// optionally linked to an inventory product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub account: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Inventory linkage: posting decrements the product's
    /// quantity-to-be-invoiced by `quantity`; reversal restores it.
    pub product: Option<Uuid>,
    pub quantity: Decimal,
}

impl LineItem {
    pub fn debit(account: Uuid, amount: Decimal) -> Self {
        Self {
            account,
            debit: amount,
            credit: Decimal::ZERO,
            product: None,
            quantity: Decimal::ZERO,
        }
    }

    pub fn credit(account: Uuid, amount: Decimal) -> Self {
        Self {
            account,
            debit: Decimal::ZERO,
            credit: amount,
            product: None,
            quantity: Decimal::ZERO,
        }
    }

    /// Exactly one of debit/credit must be positive; the other zero.
    /// Runs before any mutation begins.
    pub fn validate(&self, index: usize) -> Result<(), LedgerError> {
        if self.debit < Decimal::ZERO || self.credit < Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "line {index}: amounts must be non-negative"
            )));
        }
        if self.debit > Decimal::ZERO && self.credit > Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "line {index}: debit and credit are mutually exclusive"
            )));
        }
        if self.debit == Decimal::ZERO && self.credit == Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "line {index}: either debit or credit must be positive"
            )));
        }
        Ok(())
    }
}

/// A business document with its approval state, line items, and
/// back-references to the transactions it produced. One document's full
/// set of postings is applied or reverted atomically as a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub organization: Uuid,
    pub company: Option<Uuid>,
    /// Human id, e.g. `JV-001`. Revision chaining rewrites this in place
    /// (`JV-001` -> `JV-001-REV1`).
    pub reference: String,
    pub kind: DocumentKind,
    pub approval: ApprovalStatus,
    /// Soft-delete flag. Flipping to `false` reverts live postings and
    /// clears every signature field.
    pub valid: bool,
    pub items: Vec<LineItem>,
    /// Transactions produced by the last posting; empty when not live.
    pub transaction_ids: Vec<Uuid>,
    pub cost_center: Option<Uuid>,

    // Invoice-only money fields.
    pub party_kind: Option<PartyKind>,
    pub party_name: Option<String>,
    pub subtotal: Decimal,
    /// Percentage, e.g. 15 for 15%.
    pub tax_rate: Decimal,
    pub shipping_fee: Decimal,
    pub late_fee: Decimal,

    // Signature workflow.
    pub reviewed_by: Option<String>,
    pub reviewed_utc: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub verified_utc: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_utc: Option<DateTime<Utc>>,
    pub approved_by1: Option<String>,
    pub approved_utc1: Option<DateTime<Utc>>,
    pub approved_by2: Option<String>,
    pub approved_utc2: Option<DateTime<Utc>>,
    pub approval_comment: Option<String>,

    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Document {
    /// Output VAT for an invoice: subtotal × tax / 100.
    pub fn output_vat(&self) -> Decimal {
        self.subtotal * self.tax_rate / Decimal::ONE_HUNDRED
    }

    /// Full receivable/payable for an invoice.
    pub fn invoice_total(&self) -> Decimal {
        self.subtotal + self.output_vat() + self.shipping_fee + self.late_fee
    }

    /// Clear every signature field. Used by invalidation and correction.
    pub fn clear_signatures(&mut self) {
        self.reviewed_by = None;
        self.reviewed_utc = None;
        self.verified_by = None;
        self.verified_utc = None;
        self.acknowledged_by = None;
        self.acknowledged_utc = None;
        self.approved_by1 = None;
        self.approved_utc1 = None;
        self.approved_by2 = None;
        self.approved_utc2 = None;
    }
}

/// Input for creating a document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub reference: String,
    pub kind: DocumentKind,
    pub items: Vec<LineItem>,
    pub cost_center: Option<Uuid>,
    pub party_kind: Option<PartyKind>,
    pub party_name: Option<String>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub shipping_fee: Decimal,
    pub late_fee: Decimal,
}

impl CreateDocument {
    pub fn journal(organization: Uuid, reference: &str, items: Vec<LineItem>) -> Self {
        Self {
            organization,
            company: None,
            reference: reference.to_string(),
            kind: DocumentKind::Journal,
            items,
            cost_center: None,
            party_kind: None,
            party_name: None,
            subtotal: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
            late_fee: Decimal::ZERO,
        }
    }
}

/// Input for editing a document. Unset fields keep their values. Both
/// the edit and revise paths revert live postings before applying this
/// and re-post afterwards.
#[derive(Debug, Clone, Default)]
pub struct UpdateDocument {
    pub items: Option<Vec<LineItem>>,
    pub cost_center: Option<Uuid>,
    pub party_name: Option<String>,
    pub subtotal: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub shipping_fee: Option<Decimal>,
    pub late_fee: Option<Decimal>,
}

impl UpdateDocument {
    pub fn items(items: Vec<LineItem>) -> Self {
        Self {
            items: Some(items),
            ..Default::default()
        }
    }

    /// Fold into an existing document.
    pub fn apply_to(&self, document: &mut Document) {
        if let Some(items) = &self.items {
            document.items = items.clone();
        }
        if let Some(cc) = self.cost_center {
            document.cost_center = Some(cc);
        }
        if let Some(name) = &self.party_name {
            document.party_name = Some(name.clone());
        }
        if let Some(v) = self.subtotal {
            document.subtotal = v;
        }
        if let Some(v) = self.tax_rate {
            document.tax_rate = v;
        }
        if let Some(v) = self.shipping_fee {
            document.shipping_fee = v;
        }
        if let Some(v) = self.late_fee {
            document.late_fee = v;
        }
    }
}

/// Next reference in a revision chain: strip any existing `-REV<n>`
/// suffix, then append the incremented one. `JV-001` -> `JV-001-REV1`,
/// `JV-001-REV1` -> `JV-001-REV2`.
pub fn next_revision_reference(reference: &str) -> String {
    let (base, revision) = match reference.rsplit_once("-REV") {
        Some((base, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
            (base, n.parse::<u32>().unwrap_or(0))
        }
        _ => (reference, 0),
    };
    format!("{base}-REV{}", revision + 1)
}
