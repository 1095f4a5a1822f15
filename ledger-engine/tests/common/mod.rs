//! Common test utilities for the posting engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

use rust_decimal::Decimal;
use uuid::Uuid;

use ledger_engine::models::{
    Account, AccountType, CreateAccount, CreateDocument, CreateParentAccount, DocumentKind,
    LineItem, PartyKind, WellKnownAccount, WellKnownParent,
};
use ledger_engine::services::collaborators::{RecordingInventory, StaticPolicy, TracingActivityLog};
use ledger_engine::services::{
    ApprovalStateMachine, BalanceAggregator, PostingEngine, Rebalancer, ReversalEngine,
};
use ledger_engine::store::{LedgerStore, MemoryLedgerStore};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        ledger_core::observability::init_test_tracing("info,ledger_engine=debug");
    });
}

/// Well-known chart-of-accounts ids for one test organization.
pub struct Chart {
    pub cash: Uuid,
    pub office_expense: Uuid,
    pub stock: Uuid,
    pub cogs: Uuid,
    pub sales_income: Uuid,
    pub owners_equity: Uuid,
    pub input_vat: Uuid,
    pub output_vat: Uuid,
    pub vat_payable: Uuid,
    pub vat_receivable: Uuid,
    pub shipping: Uuid,
    pub late_fee: Uuid,
    pub ar_parent: Uuid,
    pub ap_parent: Uuid,
}

pub struct Harness {
    pub org: Uuid,
    pub store: Arc<MemoryLedgerStore>,
    pub posting: PostingEngine<MemoryLedgerStore>,
    pub reversal: ReversalEngine<MemoryLedgerStore>,
    pub approval: ApprovalStateMachine<MemoryLedgerStore>,
    pub aggregator: BalanceAggregator<MemoryLedgerStore>,
    pub inventory: Arc<RecordingInventory>,
    pub chart: Chart,
}

/// Build the full engine stack over an in-memory store, with a standard
/// chart of accounts for a fresh organization.
pub async fn harness(policy: StaticPolicy) -> Harness {
    init_tracing();

    let org = Uuid::new_v4();
    let store = Arc::new(MemoryLedgerStore::new());
    let inventory = Arc::new(RecordingInventory::new());
    let activity = Arc::new(TracingActivityLog);

    let posting = PostingEngine::new(
        Arc::clone(&store),
        Arc::new(policy),
        inventory.clone(),
        activity.clone(),
    );
    let rebalancer = Arc::new(Rebalancer::new(Arc::clone(&store)));
    let reversal = ReversalEngine::new(
        Arc::clone(&store),
        posting.clone(),
        rebalancer,
        activity.clone(),
    );
    let approval = ApprovalStateMachine::new(Arc::clone(&store), posting.clone(), reversal.clone());
    let aggregator = BalanceAggregator::new(Arc::clone(&store));

    let chart = setup_chart(&store, org).await;

    Harness {
        org,
        store,
        posting,
        reversal,
        approval,
        aggregator,
        inventory,
        chart,
    }
}

async fn create(
    store: &MemoryLedgerStore,
    org: Uuid,
    account_type: AccountType,
    name: &str,
    code: &str,
    well_known: Option<WellKnownAccount>,
) -> Uuid {
    store
        .create_account(&CreateAccount {
            organization: org,
            company: None,
            account_type,
            account_name: name.to_string(),
            account_code: code.to_string(),
            fixed: well_known.is_some(),
            cost_center: None,
            group_account: None,
            well_known,
        })
        .await
        .expect("Failed to create account")
        .account_id
}

async fn setup_chart(store: &MemoryLedgerStore, org: Uuid) -> Chart {
    let cash = create(store, org, AccountType::CashAndBank, "Cash", "AC-CB-01", None).await;
    let office_expense =
        create(store, org, AccountType::Expense, "Office Expense", "EX-01", None).await;
    let stock = create(store, org, AccountType::Stock, "Inventory", "AC-ST-01", None).await;
    let cogs = create(
        store,
        org,
        AccountType::CostOfGoodsSold,
        "Cost of Goods Sold",
        "EX-COGS",
        None,
    )
    .await;
    let sales_income = create(
        store,
        org,
        AccountType::Income,
        "Sales",
        "IN-01",
        Some(WellKnownAccount::SalesIncome),
    )
    .await;
    let owners_equity = create(
        store,
        org,
        AccountType::OwnersEquity,
        "Owner's Equity",
        "EQ-01",
        Some(WellKnownAccount::OwnersEquity),
    )
    .await;
    let input_vat = create(
        store,
        org,
        AccountType::CurrentAsset,
        "Input VAT",
        "AC-VAT-IN",
        Some(WellKnownAccount::InputVat),
    )
    .await;
    let output_vat = create(
        store,
        org,
        AccountType::CurrentLiability,
        "Output VAT",
        "LI-VAT-OUT",
        Some(WellKnownAccount::OutputVat),
    )
    .await;
    let vat_payable = create(
        store,
        org,
        AccountType::CurrentLiability,
        "VAT Payable",
        "LI-VAT-PAY",
        Some(WellKnownAccount::VatPayable),
    )
    .await;
    let vat_receivable = create(
        store,
        org,
        AccountType::CurrentAsset,
        "VAT Receivable",
        "AC-VAT-REC",
        Some(WellKnownAccount::VatReceivable),
    )
    .await;
    let shipping = create(
        store,
        org,
        AccountType::OtherIncome,
        "Shipping Charges",
        "IN-SHIP",
        Some(WellKnownAccount::ShippingCharge),
    )
    .await;
    let late_fee = create(
        store,
        org,
        AccountType::OtherIncome,
        "Late Fees",
        "IN-LATE",
        Some(WellKnownAccount::LateFee),
    )
    .await;

    let ar_parent = store
        .create_parent_account(&CreateParentAccount {
            organization: org,
            company: None,
            name: "Accounts Receivable".to_string(),
            account_type: AccountType::CurrentAsset,
            code: "AC-CL-AR".to_string(),
            well_known: Some(WellKnownParent::AccountsReceivable),
        })
        .await
        .expect("Failed to create AR parent")
        .parent_id;
    let ap_parent = store
        .create_parent_account(&CreateParentAccount {
            organization: org,
            company: None,
            name: "Accounts Payable".to_string(),
            account_type: AccountType::CurrentLiability,
            code: "LI-CL-AP".to_string(),
            well_known: Some(WellKnownParent::AccountsPayable),
        })
        .await
        .expect("Failed to create AP parent")
        .parent_id;

    Chart {
        cash,
        office_expense,
        stock,
        cogs,
        sales_income,
        owners_equity,
        input_vat,
        output_vat,
        vat_payable,
        vat_receivable,
        shipping,
        late_fee,
        ar_parent,
        ap_parent,
    }
}

/// Current balance of an account.
pub async fn balance(h: &Harness, account_id: Uuid) -> Decimal {
    account(h, account_id).await.amount
}

pub async fn account(h: &Harness, account_id: Uuid) -> Account {
    h.store
        .get_account(h.org, account_id)
        .await
        .expect("Failed to get account")
        .expect("Account should exist")
}

/// A customer invoice document with no inventory line items.
pub fn customer_invoice(
    org: Uuid,
    reference: &str,
    customer: &str,
    subtotal: Decimal,
    tax_rate: Decimal,
) -> CreateDocument {
    CreateDocument {
        organization: org,
        company: None,
        reference: reference.to_string(),
        kind: DocumentKind::Invoice,
        items: vec![],
        cost_center: None,
        party_kind: Some(PartyKind::Customer),
        party_name: Some(customer.to_string()),
        subtotal,
        tax_rate,
        shipping_fee: Decimal::ZERO,
        late_fee: Decimal::ZERO,
    }
}

/// A vendor bill document.
pub fn vendor_invoice(
    org: Uuid,
    reference: &str,
    vendor: &str,
    subtotal: Decimal,
    tax_rate: Decimal,
    items: Vec<LineItem>,
) -> CreateDocument {
    CreateDocument {
        organization: org,
        company: None,
        reference: reference.to_string(),
        kind: DocumentKind::Invoice,
        items,
        cost_center: None,
        party_kind: Some(PartyKind::Vendor),
        party_name: Some(vendor.to_string()),
        subtotal,
        tax_rate,
        shipping_fee: Decimal::ZERO,
        late_fee: Decimal::ZERO,
    }
}

/// The party sub-account auto-created under the AR/AP parent, if any.
pub async fn party_account(h: &Harness, parent_id: Uuid, name: &str) -> Option<Account> {
    h.store
        .find_child_by_name(h.org, parent_id, name)
        .await
        .expect("Failed to look up party account")
}
