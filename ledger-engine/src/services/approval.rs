//! Approval State Machine: decides when a document's postings go live
//! and when they come back out.

use std::sync::Arc;

use chrono::Utc;
use ledger_core::LedgerError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{ApprovalAction, ApprovalStatus, Document};
use crate::store::LedgerStore;

use super::metrics::APPROVAL_TRANSITIONS_TOTAL;
use super::posting::PostingEngine;
use super::reversal::ReversalEngine;

/// Whether this approval state means the document's postings are in the
/// ledger right now.
pub fn is_live(status: ApprovalStatus) -> bool {
    matches!(
        status,
        ApprovalStatus::None | ApprovalStatus::Approved1 | ApprovalStatus::Approved2
    )
}

/// Postings are (re-)applied exactly when the old value was not yet an
/// approved state and the new value is one. Re-approving an already
/// approved document must not re-post.
pub fn should_post(old: ApprovalStatus, new: ApprovalStatus) -> bool {
    !matches!(
        old,
        ApprovalStatus::Approved1 | ApprovalStatus::Approved2
    ) && matches!(
        new,
        ApprovalStatus::Approved1 | ApprovalStatus::Approved2
    )
}

/// Postings are reverted exactly when they are currently live and the
/// action takes the document out of the ledger.
pub fn should_revert_on(old: ApprovalStatus, action: &ApprovalAction) -> bool {
    is_live(old)
        && matches!(
            action,
            ApprovalAction::Reject | ApprovalAction::Invalidate
        )
}

pub struct ApprovalStateMachine<S> {
    store: Arc<S>,
    posting: PostingEngine<S>,
    reversal: ReversalEngine<S>,
}

impl<S: LedgerStore> ApprovalStateMachine<S> {
    pub fn new(store: Arc<S>, posting: PostingEngine<S>, reversal: ReversalEngine<S>) -> Self {
        Self {
            store,
            posting,
            reversal,
        }
    }

    /// Apply one action from the decision table, posting or reverting as
    /// a side effect. Returns the updated document.
    #[instrument(skip(self, action), fields(organization = %organization, document_id = %document_id, actor = actor))]
    pub async fn transition(
        &self,
        organization: Uuid,
        document_id: Uuid,
        action: ApprovalAction,
        actor: &str,
    ) -> Result<Document, LedgerError> {
        let mut document = self
            .store
            .get_document(organization, document_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("document does not exist"))?;

        if !document.valid {
            return Err(LedgerError::invariant(
                "invalidated document cannot transition",
            ));
        }

        APPROVAL_TRANSITIONS_TOTAL
            .with_label_values(&[action_label(&action)])
            .inc();

        let now = Utc::now();
        let old = document.approval;

        match action {
            ApprovalAction::Approve => {
                let new = match old {
                    ApprovalStatus::Pending => ApprovalStatus::Approved1,
                    ApprovalStatus::Approved1 => ApprovalStatus::Approved2,
                    // Second sign-off already given; nothing changes and
                    // nothing re-posts.
                    ApprovalStatus::Approved2 => return Ok(document),
                    ApprovalStatus::Rejected => {
                        return Err(LedgerError::invariant(
                            "rejected document cannot be approved; edit it first",
                        ));
                    }
                    ApprovalStatus::None => {
                        return Err(LedgerError::invariant(
                            "document kind does not use an approval workflow",
                        ));
                    }
                };

                match new {
                    ApprovalStatus::Approved1 => {
                        document.approved_by1 = Some(actor.to_string());
                        document.approved_utc1 = Some(now);
                    }
                    ApprovalStatus::Approved2 => {
                        document.approved_by2 = Some(actor.to_string());
                        document.approved_utc2 = Some(now);
                    }
                    _ => {}
                }
                document.approval = new;

                if should_post(old, new) {
                    self.posting.post(&mut document).await?;
                } else {
                    self.store.update_document(&document).await?;
                }

                info!(
                    reference = %document.reference,
                    from = old.as_str(),
                    to = new.as_str(),
                    "Approval advanced"
                );
            }
            ApprovalAction::Reject => {
                if should_revert_on(old, &ApprovalAction::Reject)
                    && !document.transaction_ids.is_empty()
                {
                    self.reversal.revert(&mut document).await?;
                }
                document.approval = ApprovalStatus::Rejected;
                self.store.update_document(&document).await?;

                info!(reference = %document.reference, "Document rejected");
            }
            ApprovalAction::Review => {
                document.reviewed_by = Some(actor.to_string());
                document.reviewed_utc = Some(now);
                self.store.update_document(&document).await?;
            }
            ApprovalAction::Verify => {
                document.verified_by = Some(actor.to_string());
                document.verified_utc = Some(now);
                self.store.update_document(&document).await?;
            }
            ApprovalAction::Acknowledge => {
                document.acknowledged_by = Some(actor.to_string());
                document.acknowledged_utc = Some(now);
                self.store.update_document(&document).await?;
            }
            ApprovalAction::Correction { comment } => {
                document.clear_signatures();
                document.approval_comment = Some(comment);
                self.store.update_document(&document).await?;
            }
            ApprovalAction::Invalidate => {
                if should_revert_on(old, &ApprovalAction::Invalidate)
                    && !document.transaction_ids.is_empty()
                {
                    self.reversal.revert(&mut document).await?;
                }
                document.valid = false;
                document.clear_signatures();
                self.store.update_document(&document).await?;

                info!(reference = %document.reference, "Document invalidated");
            }
        }

        Ok(document)
    }
}

fn action_label(action: &ApprovalAction) -> &'static str {
    match action {
        ApprovalAction::Approve => "approve",
        ApprovalAction::Reject => "reject",
        ApprovalAction::Review => "review",
        ApprovalAction::Verify => "verify",
        ApprovalAction::Acknowledge => "acknowledge",
        ApprovalAction::Correction { .. } => "correction",
        ApprovalAction::Invalidate => "invalidate",
    }
}
