//! Interfaces to the collaborators outside this engine's scope.
//!
//! Document controllers hand these in; the engine never reaches around
//! them. Test doubles live here too since the integration tests exercise
//! the same seams the controllers do.

use async_trait::async_trait;
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::DocumentKind;

/// Organization accounting policy lookup.
pub trait OrganizationPolicy: Send + Sync {
    /// Accrual orgs post the income account at invoice time; cash-basis
    /// orgs defer it.
    fn is_accrual_accounting(&self, organization: Uuid) -> bool;

    /// Whether documents of this kind wait for sign-off before their
    /// postings take effect.
    fn approval_required(&self, organization: Uuid, kind: DocumentKind) -> bool;
}

/// Inventory quantity adjustment on Product/Fleet records.
#[async_trait]
pub trait InventoryAdjuster: Send + Sync {
    async fn increment_quantity_to_be_invoiced(
        &self,
        organization: Uuid,
        product: Uuid,
        delta: Decimal,
    ) -> Result<(), LedgerError>;
}

/// Fire-and-forget activity sink. Failures are logged, never propagated.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, organization: Uuid, event: &str, detail: String);
}

/// Fixed policy configuration, set up once per deployment.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    pub accrual: bool,
    pub approval_kinds: HashSet<DocumentKind>,
}

impl StaticPolicy {
    /// Approval required for every document kind.
    pub fn approval_for_all(accrual: bool) -> Self {
        Self {
            accrual,
            approval_kinds: HashSet::from([
                DocumentKind::Invoice,
                DocumentKind::Journal,
                DocumentKind::PettyCash,
                DocumentKind::InventoryAdjustment,
            ]),
        }
    }

    /// No approval workflow; postings apply immediately.
    pub fn no_approval(accrual: bool) -> Self {
        Self {
            accrual,
            approval_kinds: HashSet::new(),
        }
    }
}

impl OrganizationPolicy for StaticPolicy {
    fn is_accrual_accounting(&self, _organization: Uuid) -> bool {
        self.accrual
    }

    fn approval_required(&self, _organization: Uuid, kind: DocumentKind) -> bool {
        self.approval_kinds.contains(&kind)
    }
}

/// Inventory double that records every adjustment.
#[derive(Default)]
pub struct RecordingInventory {
    adjustments: Mutex<Vec<(Uuid, Decimal)>>,
}

impl RecordingInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adjustments(&self) -> Vec<(Uuid, Decimal)> {
        self.adjustments.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Net quantity delta recorded for one product.
    pub fn net_for(&self, product: Uuid) -> Decimal {
        self.adjustments()
            .iter()
            .filter(|(p, _)| *p == product)
            .map(|(_, d)| *d)
            .sum()
    }
}

#[async_trait]
impl InventoryAdjuster for RecordingInventory {
    async fn increment_quantity_to_be_invoiced(
        &self,
        _organization: Uuid,
        product: Uuid,
        delta: Decimal,
    ) -> Result<(), LedgerError> {
        self.adjustments
            .lock()
            .map_err(|_| LedgerError::Internal(anyhow::anyhow!("inventory lock poisoned")))?
            .push((product, delta));
        Ok(())
    }
}

/// Activity sink that only emits tracing events.
#[derive(Debug, Clone, Default)]
pub struct TracingActivityLog;

#[async_trait]
impl ActivityLog for TracingActivityLog {
    async fn record(&self, organization: Uuid, event: &str, detail: String) {
        debug!(organization = %organization, event = event, detail = %detail, "activity");
    }
}
