//! Approval State Machine integration tests.

mod common;

use common::{balance, customer_invoice, harness, party_account};
use ledger_core::LedgerError;
use ledger_engine::models::{
    ApprovalAction, ApprovalStatus, CreateDocument, LineItem,
};
use ledger_engine::services::collaborators::StaticPolicy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Creating a document in an org requiring approval must not touch any
/// balance until the first approval lands: invoice subtotal 100, tax 15%
/// stays at zero effect while pending, then Output VAT rises by 15 and
/// the customer's receivable by 115.
#[tokio::test]
async fn postings_wait_for_first_approval() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::Pending);
    assert!(doc.transaction_ids.is_empty());
    assert_eq!(balance(&h, h.chart.output_vat).await, Decimal::ZERO);
    assert!(party_account(&h, h.chart.ar_parent, "Acme").await.is_none());

    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::Approved1);
    assert_eq!(doc.approved_by1.as_deref(), Some("mira"));
    assert!(!doc.transaction_ids.is_empty());
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, dec!(115));
}

#[tokio::test]
async fn second_approval_does_not_repost() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await
        .unwrap();
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "noor")
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::Approved2);
    assert_eq!(doc.approved_by2.as_deref(), Some("noor"));
    // The balances moved exactly once.
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, dec!(115));

    // A third approve is a no-op.
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "zed")
        .await
        .unwrap();
    assert_eq!(doc.approval, ApprovalStatus::Approved2);
    assert_eq!(doc.approved_by2.as_deref(), Some("noor"));
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
}

#[tokio::test]
async fn rejecting_a_live_document_reverts_its_postings() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await
        .unwrap();
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Reject, "noor")
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::Rejected);
    assert!(doc.transaction_ids.is_empty());
    assert_eq!(balance(&h, h.chart.output_vat).await, Decimal::ZERO);
    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, Decimal::ZERO);
}

#[tokio::test]
async fn rejecting_a_pending_document_touches_no_balances() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Reject, "noor")
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::Rejected);
    assert_eq!(balance(&h, h.chart.output_vat).await, Decimal::ZERO);
}

#[tokio::test]
async fn rejected_documents_cannot_be_approved() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Reject, "noor")
        .await
        .unwrap();

    let result = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await;
    assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
}

#[tokio::test]
async fn signature_annotations_do_not_touch_postings() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();

    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Review, "rev")
        .await
        .unwrap();
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Verify, "ver")
        .await
        .unwrap();
    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Acknowledge, "ack")
        .await
        .unwrap();

    assert_eq!(doc.reviewed_by.as_deref(), Some("rev"));
    assert_eq!(doc.verified_by.as_deref(), Some("ver"));
    assert_eq!(doc.acknowledged_by.as_deref(), Some("ack"));
    assert!(doc.reviewed_utc.is_some());
    assert_eq!(doc.approval, ApprovalStatus::Pending, "signatures are orthogonal");
    assert_eq!(balance(&h, h.chart.output_vat).await, Decimal::ZERO);
}

#[tokio::test]
async fn correction_resets_signatures_and_keeps_postings() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Review, "rev")
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await
        .unwrap();

    let doc = h
        .approval
        .transition(
            h.org,
            doc.document_id,
            ApprovalAction::Correction {
                comment: "wrong tax code".to_string(),
            },
            "noor",
        )
        .await
        .unwrap();

    assert_eq!(doc.approval_comment.as_deref(), Some("wrong tax code"));
    assert!(doc.reviewed_by.is_none());
    assert!(doc.approved_by1.is_none());
    // Postings stay live: correction alone never reverts.
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
}

#[tokio::test]
async fn invalidation_reverts_and_clears_signatures() {
    let h = harness(StaticPolicy::approval_for_all(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Review, "rev")
        .await
        .unwrap();
    h.approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await
        .unwrap();

    let doc = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Invalidate, "admin")
        .await
        .unwrap();

    assert!(!doc.valid);
    assert!(doc.reviewed_by.is_none());
    assert!(doc.approved_by1.is_none());
    assert!(doc.transaction_ids.is_empty());
    assert_eq!(balance(&h, h.chart.output_vat).await, Decimal::ZERO);

    // Invalidated documents are terminal for the ledger.
    let result = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await;
    assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
}

#[tokio::test]
async fn no_approval_org_posts_immediately_and_skips_the_workflow() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let doc = h
        .posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-001",
            vec![
                LineItem::debit(h.chart.cash, dec!(40)),
                LineItem::credit(h.chart.sales_income, dec!(40)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(doc.approval, ApprovalStatus::None);
    assert_eq!(balance(&h, h.chart.cash).await, dec!(40));

    let result = h
        .approval
        .transition(h.org, doc.document_id, ApprovalAction::Approve, "mira")
        .await;
    assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
}
