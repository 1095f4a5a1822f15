//! Reversal Engine: the exact mirror of posting, used before re-posting
//! an edited document and when a document is rejected or invalidated.

use std::sync::Arc;

use ledger_core::LedgerError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    ApprovalStatus, Document, Movement, UpdateDocument, next_revision_reference,
};
use crate::store::LedgerStore;

use super::approval::is_live;
use super::collaborators::ActivityLog;
use super::metrics::{ERRORS_TOTAL, REVERSALS_TOTAL};
use super::posting::PostingEngine;
use super::recompute::Rebalancer;

pub struct ReversalEngine<S> {
    store: Arc<S>,
    posting: PostingEngine<S>,
    rebalancer: Arc<Rebalancer<S>>,
    activity: Arc<dyn ActivityLog>,
}

impl<S> Clone for ReversalEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            posting: self.posting.clone(),
            rebalancer: Arc::clone(&self.rebalancer),
            activity: Arc::clone(&self.activity),
        }
    }
}

impl<S: LedgerStore> ReversalEngine<S> {
    pub fn new(
        store: Arc<S>,
        posting: PostingEngine<S>,
        rebalancer: Arc<Rebalancer<S>>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            posting,
            rebalancer,
            activity,
        }
    }

    /// Undo a document's postings: restore every touched account's
    /// `amount`/`debit`/`credit`, delete its transaction rows, and
    /// recompute running balances for the remaining later entries on
    /// each affected account.
    ///
    /// Guarded: reverting a document whose postings are not live would
    /// incorrectly undo balances and is rejected.
    #[instrument(skip(self), fields(organization = %organization, document_id = %document_id))]
    pub async fn revert_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<(), LedgerError> {
        let mut document = self
            .store
            .get_document(organization, document_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("document does not exist"))?;
        let result = self.revert(&mut document).await;
        match &result {
            Ok(_) => {
                REVERSALS_TOTAL
                    .with_label_values(&[document.kind.as_str(), "ok"])
                    .inc();
            }
            Err(e) => {
                REVERSALS_TOTAL
                    .with_label_values(&[document.kind.as_str(), "error"])
                    .inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            }
        }
        result
    }

    /// Revert an already-loaded document and persist its updated state.
    pub(crate) async fn revert(&self, document: &mut Document) -> Result<(), LedgerError> {
        if !is_live(document.approval) || document.transaction_ids.is_empty() {
            return Err(LedgerError::invariant(
                "document postings are not live; nothing to revert",
            ));
        }

        // The document's fields are unchanged since posting (edits revert
        // first), so rebuilding the plan reproduces the posted movements.
        let plan = self.posting.build_plan(document).await?;
        let inverse: Vec<Movement> = plan.movements.iter().map(Movement::inverse).collect();

        let organization = document.organization;
        let seeds = self
            .store
            .revert_movements(organization, document.document_id, &inverse)
            .await?;

        document.transaction_ids.clear();
        self.store.update_document(document).await?;

        if let Some(cost_center_id) = document.cost_center {
            self.store
                .cost_center_revert(organization, cost_center_id, document.document_id)
                .await?;
        }

        // Restore the inventory quantities the posting claimed.
        for (product, delta) in &plan.inventory {
            self.posting
                .inventory()
                .increment_quantity_to_be_invoiced(organization, *product, -*delta)
                .await?;
        }

        // Every remaining later entry on the touched accounts gets its
        // running balance recomputed; failures surface to the caller
        // after the retry budget instead of being silently dropped.
        for seed in &seeds {
            self.rebalancer.run(organization, seed).await?;
        }

        self.activity
            .record(
                organization,
                "document_reverted",
                format!("{} {}", document.kind, document.reference),
            )
            .await;

        info!(
            document_id = %document.document_id,
            reference = %document.reference,
            affected_accounts = seeds.len(),
            "Document postings reverted"
        );

        Ok(())
    }

    /// Edit a document in place: revert the old postings when live, apply
    /// the changes, and re-enter the approval gate (posting immediately
    /// when the organization requires no approval).
    #[instrument(skip(self, update), fields(organization = %organization, document_id = %document_id))]
    pub async fn edit_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
        update: UpdateDocument,
    ) -> Result<Document, LedgerError> {
        self.replace_document(organization, document_id, update, false)
            .await
    }

    /// Revise a document: like edit, but the reference chains to a new
    /// `-REV<N>` id and the fresh postings carry the new reference, so
    /// the revision history stays readable from the transaction log.
    #[instrument(skip(self, update), fields(organization = %organization, document_id = %document_id))]
    pub async fn revise_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
        update: UpdateDocument,
    ) -> Result<Document, LedgerError> {
        self.replace_document(organization, document_id, update, true)
            .await
    }

    async fn replace_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
        update: UpdateDocument,
        revise: bool,
    ) -> Result<Document, LedgerError> {
        let mut document = self
            .store
            .get_document(organization, document_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("document does not exist"))?;

        if !document.valid {
            return Err(LedgerError::invariant(
                "invalidated document cannot be edited",
            ));
        }

        if let Some(items) = &update.items {
            for (i, item) in items.iter().enumerate() {
                item.validate(i)?;
            }
        }

        if is_live(document.approval) && !document.transaction_ids.is_empty() {
            self.revert(&mut document).await?;
        }

        update.apply_to(&mut document);
        if revise {
            document.reference = next_revision_reference(&document.reference);
        }

        // Fresh approval cycle: prior sign-offs do not carry over to the
        // changed figures.
        document.clear_signatures();
        document.approval = self
            .posting
            .initial_approval(organization, document.kind);
        self.store.update_document(&document).await?;

        if document.approval == ApprovalStatus::None {
            self.posting.post(&mut document).await?;
        }

        Ok(document)
    }
}
