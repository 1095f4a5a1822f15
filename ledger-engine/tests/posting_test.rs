//! Posting Engine integration tests.

mod common;

use chrono::{DateTime, Utc};
use common::{account, balance, customer_invoice, harness, party_account, vendor_invoice};
use ledger_core::LedgerError;
use ledger_engine::models::{
    CreateCostCenter, CreateDocument, DocumentKind, LineItem, WellKnownAccount,
};
use ledger_engine::services::collaborators::StaticPolicy;
use ledger_engine::store::LedgerStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn journal_moves_balances_by_natural_sign() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let items = vec![
        LineItem::debit(h.chart.cash, dec!(100)),
        LineItem::credit(h.chart.sales_income, dec!(100)),
    ];
    let doc = h
        .posting
        .create_document(CreateDocument::journal(h.org, "JV-001", items))
        .await
        .unwrap();

    assert_eq!(doc.transaction_ids.len(), 2, "posted immediately");
    // Debit increases the debit-normal cash account, credit increases
    // the credit-normal income account.
    assert_eq!(balance(&h, h.chart.cash).await, dec!(100));
    assert_eq!(balance(&h, h.chart.sales_income).await, dec!(100));

    let cash = account(&h, h.chart.cash).await;
    assert_eq!(cash.debit, dec!(100));
    assert_eq!(cash.credit, Decimal::ZERO);
}

#[tokio::test]
async fn credits_reduce_debit_normal_accounts() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-001",
            vec![
                LineItem::debit(h.chart.cash, dec!(500)),
                LineItem::credit(h.chart.sales_income, dec!(500)),
            ],
        ))
        .await
        .unwrap();
    h.posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-002",
            vec![
                LineItem::debit(h.chart.office_expense, dec!(120)),
                LineItem::credit(h.chart.cash, dec!(120)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(balance(&h, h.chart.cash).await, dec!(380));
    assert_eq!(balance(&h, h.chart.office_expense).await, dec!(120));
}

#[tokio::test]
async fn document_debits_equal_credits() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let doc = h
        .posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();

    let transactions = h
        .store
        .transactions_for_document(h.org, doc.document_id)
        .await
        .unwrap();
    let debits: Decimal = transactions.iter().map(|t| t.debit).sum();
    let credits: Decimal = transactions.iter().map(|t| t.credit).sum();
    assert_eq!(debits, credits, "document posting must conserve debits/credits");
    assert_eq!(debits, dec!(115));
}

#[tokio::test]
async fn running_balance_snapshots_follow_each_posting() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    for (reference, amount) in [("JV-001", dec!(100)), ("JV-002", dec!(200))] {
        h.posting
            .create_document(CreateDocument::journal(
                h.org,
                reference,
                vec![
                    LineItem::debit(h.chart.cash, amount),
                    LineItem::credit(h.chart.sales_income, amount),
                ],
            ))
            .await
            .unwrap();
    }

    let history = h
        .store
        .transactions_for_account_since(h.org, h.chart.cash, DateTime::<Utc>::MIN_UTC)
        .await
        .unwrap();
    let balances: Vec<Decimal> = history.iter().map(|t| t.running_balance).collect();
    assert_eq!(balances, vec![dec!(100), dec!(300)]);
    assert_eq!(balance(&h, h.chart.cash).await, dec!(300));
}

#[tokio::test]
async fn double_post_is_rejected() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let doc = h
        .posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-001",
            vec![
                LineItem::debit(h.chart.cash, dec!(100)),
                LineItem::credit(h.chart.sales_income, dec!(100)),
            ],
        ))
        .await
        .unwrap();

    let result = h.posting.post_document(h.org, doc.document_id).await;
    assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
    // Balances untouched by the rejected re-post.
    assert_eq!(balance(&h, h.chart.cash).await, dec!(100));
}

#[tokio::test]
async fn malformed_items_are_rejected_before_any_mutation() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let both_sides = LineItem {
        account: h.chart.cash,
        debit: dec!(10),
        credit: dec!(10),
        product: None,
        quantity: Decimal::ZERO,
    };
    let result = h
        .posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-BAD",
            vec![both_sides, LineItem::credit(h.chart.sales_income, dec!(10))],
        ))
        .await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));
    assert_eq!(balance(&h, h.chart.cash).await, Decimal::ZERO);
    assert_eq!(balance(&h, h.chart.sales_income).await, Decimal::ZERO);
}

#[tokio::test]
async fn missing_account_aborts_whole_document() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let result = h
        .posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-001",
            vec![
                LineItem::debit(h.chart.cash, dec!(100)),
                LineItem::credit(Uuid::new_v4(), dec!(100)),
            ],
        ))
        .await;
    assert!(matches!(result, Err(LedgerError::NotFound(_))));
    // No partial state: the valid line must not have been applied.
    assert_eq!(balance(&h, h.chart.cash).await, Decimal::ZERO);
}

#[tokio::test]
async fn owners_equity_credit_mirrors_into_drawings() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(CreateDocument::journal(
            h.org,
            "JV-001",
            vec![
                LineItem::debit(h.chart.cash, dec!(250)),
                LineItem::credit(h.chart.owners_equity, dec!(250)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(balance(&h, h.chart.owners_equity).await, dec!(250));

    let drawings = h
        .store
        .find_well_known(h.org, WellKnownAccount::Drawings)
        .await
        .unwrap()
        .expect("Drawings account should be vivified");
    assert_eq!(drawings.amount, dec!(250));
}

#[tokio::test]
async fn customer_invoice_posts_receivable_vat_and_income() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();

    let acme = party_account(&h, h.chart.ar_parent, "Acme")
        .await
        .expect("receivable sub-account should be vivified");
    assert_eq!(acme.account_code, "AC-CL-AR-01");
    assert_eq!(acme.amount, dec!(115));
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
    assert_eq!(balance(&h, h.chart.sales_income).await, dec!(100));
}

#[tokio::test]
async fn second_invoice_reuses_the_party_account() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(0)))
        .await
        .unwrap();
    h.posting
        .create_document(customer_invoice(h.org, "INV-002", "Acme", dec!(50), dec!(0)))
        .await
        .unwrap();

    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, dec!(150));

    let parent = h
        .store
        .get_parent_account(h.org, h.chart.ar_parent)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parent.child_accounts.len(), 1, "no duplicate sub-account");
}

#[tokio::test]
async fn party_sub_account_codes_increment() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(10), dec!(0)))
        .await
        .unwrap();
    h.posting
        .create_document(customer_invoice(h.org, "INV-002", "Globex", dec!(20), dec!(0)))
        .await
        .unwrap();

    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    let globex = party_account(&h, h.chart.ar_parent, "Globex").await.unwrap();
    assert_eq!(acme.account_code, "AC-CL-AR-01");
    assert_eq!(globex.account_code, "AC-CL-AR-02");
}

#[tokio::test]
async fn vendor_invoice_posts_payable_and_input_vat() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    h.posting
        .create_document(vendor_invoice(
            h.org,
            "BILL-001",
            "Initech",
            dec!(200),
            dec!(10),
            vec![LineItem::debit(h.chart.office_expense, dec!(200))],
        ))
        .await
        .unwrap();

    let initech = party_account(&h, h.chart.ap_parent, "Initech")
        .await
        .expect("payable sub-account should be vivified");
    assert_eq!(initech.account_code, "LI-CL-AP-01");
    // Credit-normal payable grows by the full bill.
    assert_eq!(initech.amount, dec!(220));
    assert_eq!(balance(&h, h.chart.input_vat).await, dec!(20));
    assert_eq!(balance(&h, h.chart.office_expense).await, dec!(200));
}

#[tokio::test]
async fn cash_basis_invoice_skips_the_income_posting() {
    let h = harness(StaticPolicy::no_approval(false)).await;

    h.posting
        .create_document(customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(15)))
        .await
        .unwrap();

    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, dec!(115));
    assert_eq!(balance(&h, h.chart.output_vat).await, dec!(15));
    assert_eq!(
        balance(&h, h.chart.sales_income).await,
        Decimal::ZERO,
        "income is deferred under cash-basis accounting"
    );
}

#[tokio::test]
async fn invoice_fees_post_to_their_own_accounts() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let mut input = customer_invoice(h.org, "INV-001", "Acme", dec!(100), dec!(0));
    input.shipping_fee = dec!(12);
    input.late_fee = dec!(8);
    let doc = h.posting.create_document(input).await.unwrap();

    let acme = party_account(&h, h.chart.ar_parent, "Acme").await.unwrap();
    assert_eq!(acme.amount, dec!(120));
    assert_eq!(balance(&h, h.chart.shipping).await, dec!(12));
    assert_eq!(balance(&h, h.chart.late_fee).await, dec!(8));

    // Each fee is its own transaction row sharing the document reference.
    let transactions = h
        .store
        .transactions_for_document(h.org, doc.document_id)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 4);
    assert!(transactions.iter().all(|t| t.reference == "INV-001"));
}

#[tokio::test]
async fn inventory_items_decrement_quantity_to_be_invoiced() {
    let h = harness(StaticPolicy::no_approval(true)).await;
    let product = Uuid::new_v4();

    let mut stock_credit = LineItem::credit(h.chart.stock, dec!(50));
    stock_credit.product = Some(product);
    stock_credit.quantity = dec!(5);

    let mut input = CreateDocument::journal(
        h.org,
        "IA-001",
        vec![LineItem::debit(h.chart.cogs, dec!(50)), stock_credit],
    );
    input.kind = DocumentKind::InventoryAdjustment;
    h.posting.create_document(input).await.unwrap();

    assert_eq!(balance(&h, h.chart.stock).await, dec!(-50));
    assert_eq!(balance(&h, h.chart.cogs).await, dec!(50));
    assert_eq!(h.inventory.net_for(product), dec!(-5));
}

#[tokio::test]
async fn cost_center_mirrors_expense_and_income_postings() {
    let h = harness(StaticPolicy::no_approval(true)).await;

    let cost_center = h
        .store
        .create_cost_center(&CreateCostCenter {
            organization: h.org,
            company: None,
            name: "Operations".to_string(),
        })
        .await
        .unwrap();

    let mut input = CreateDocument::journal(
        h.org,
        "PC-001",
        vec![
            LineItem::debit(h.chart.office_expense, dec!(75)),
            LineItem::credit(h.chart.cash, dec!(75)),
        ],
    );
    input.kind = DocumentKind::PettyCash;
    input.cost_center = Some(cost_center.cost_center_id);
    h.posting.create_document(input).await.unwrap();

    let mirrored = h
        .store
        .get_cost_center(h.org, cost_center.cost_center_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mirrored.total_expense, dec!(75));
    assert_eq!(mirrored.expense.len(), 1);
    assert_eq!(mirrored.expense[0].reference, "PC-001");
    assert_eq!(mirrored.total_income, Decimal::ZERO);
}
