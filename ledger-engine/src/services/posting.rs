//! Posting Engine: turns a document and its line items into balanced
//! account movements and transaction rows.

use std::sync::Arc;

use chrono::Utc;
use ledger_core::retry::{retry_op, RetryConfig};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Account, AccountType, ApprovalStatus, CostCenterEntry, CreateAccount, CreateDocument,
    Document, DocumentKind, Movement, PartyKind, WellKnownAccount, WellKnownParent,
    next_child_code,
};
use crate::store::LedgerStore;

use super::collaborators::{ActivityLog, InventoryAdjuster, OrganizationPolicy};
use super::metrics::{ERRORS_TOTAL, POSTINGS_TOTAL};

/// Everything one document posting will do, computed up front so the
/// whole batch can be validated before the first mutation and applied
/// atomically by the store.
pub(crate) struct PostingPlan {
    pub movements: Vec<Movement>,
    /// Product quantity deltas (negative on posting).
    pub inventory: Vec<(Uuid, Decimal)>,
    pub expense_entries: Vec<CostCenterEntry>,
    pub income_entries: Vec<CostCenterEntry>,
}

pub struct PostingEngine<S> {
    store: Arc<S>,
    policy: Arc<dyn OrganizationPolicy>,
    inventory: Arc<dyn InventoryAdjuster>,
    activity: Arc<dyn ActivityLog>,
    retry: RetryConfig,
}

impl<S> Clone for PostingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            inventory: Arc::clone(&self.inventory),
            activity: Arc::clone(&self.activity),
            retry: self.retry.clone(),
        }
    }
}

impl<S: LedgerStore> PostingEngine<S> {
    pub fn new(
        store: Arc<S>,
        policy: Arc<dyn OrganizationPolicy>,
        inventory: Arc<dyn InventoryAdjuster>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            policy,
            inventory,
            activity,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn inventory(&self) -> &Arc<dyn InventoryAdjuster> {
        &self.inventory
    }

    /// Initial approval state for a new or re-posted document.
    pub fn initial_approval(&self, organization: Uuid, kind: DocumentKind) -> ApprovalStatus {
        if self.policy.approval_required(organization, kind) {
            ApprovalStatus::Pending
        } else {
            ApprovalStatus::None
        }
    }

    /// Create a document. When the organization requires no approval for
    /// its kind, postings apply immediately; otherwise the document waits
    /// in `pending` and no balance changes until sign-off.
    #[instrument(skip(self, input), fields(organization = %input.organization, reference = %input.reference, kind = %input.kind))]
    pub async fn create_document(&self, input: CreateDocument) -> Result<Document, LedgerError> {
        for (i, item) in input.items.iter().enumerate() {
            item.validate(i)?;
        }

        let approval = self.initial_approval(input.organization, input.kind);
        let mut document = self.store.insert_document(&input, approval).await?;

        if approval == ApprovalStatus::None {
            self.post(&mut document).await?;
        }

        Ok(document)
    }

    /// Apply a document's postings. Guarded against double-apply: a
    /// document whose transactions are already live is rejected.
    #[instrument(skip(self), fields(organization = %organization, document_id = %document_id))]
    pub async fn post_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Uuid>, LedgerError> {
        let mut document = self
            .store
            .get_document(organization, document_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("document does not exist"))?;
        self.post(&mut document).await
    }

    /// Post an already-loaded document and persist its updated state.
    pub(crate) async fn post(&self, document: &mut Document) -> Result<Vec<Uuid>, LedgerError> {
        let result = self.post_inner(document).await;
        match &result {
            Ok(_) => {
                POSTINGS_TOTAL
                    .with_label_values(&[document.kind.as_str(), "ok"])
                    .inc();
            }
            Err(e) => {
                POSTINGS_TOTAL
                    .with_label_values(&[document.kind.as_str(), "error"])
                    .inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            }
        }
        result
    }

    async fn post_inner(&self, document: &mut Document) -> Result<Vec<Uuid>, LedgerError> {
        if !document.valid {
            return Err(LedgerError::invariant(
                "invalidated document cannot be posted",
            ));
        }
        if !document.transaction_ids.is_empty() {
            return Err(LedgerError::invariant(
                "document postings are already live",
            ));
        }
        for (i, item) in document.items.iter().enumerate() {
            item.validate(i)?;
        }

        let plan = self.build_plan(document).await?;

        let organization = document.organization;
        let company = document.company;
        let reference = document.reference.clone();
        let document_id = document.document_id;
        let kind = document.kind;
        let movements = plan.movements;

        // The whole document retries as a unit on contention; line items
        // are never retried individually.
        let transactions = retry_op(&self.retry, "apply_movements", || {
            self.store.apply_movements(
                organization,
                company,
                &reference,
                document_id,
                kind,
                &movements,
            )
        })
        .await?;

        if let Some(cost_center_id) = document.cost_center {
            self.store
                .cost_center_apply(
                    organization,
                    cost_center_id,
                    &plan.expense_entries,
                    &plan.income_entries,
                )
                .await?;
        }

        for (product, delta) in &plan.inventory {
            self.inventory
                .increment_quantity_to_be_invoiced(organization, *product, *delta)
                .await?;
        }

        document.transaction_ids = transactions.iter().map(|t| t.transaction_id).collect();
        self.store.update_document(document).await?;

        self.activity
            .record(
                organization,
                "document_posted",
                format!("{} {} ({} movements)", kind, reference, movements.len()),
            )
            .await;

        info!(
            document_id = %document_id,
            reference = %reference,
            transaction_count = document.transaction_ids.len(),
            "Document posted"
        );

        Ok(document.transaction_ids.clone())
    }

    /// Compute every movement and side effect for one document. Read-only:
    /// account auto-vivification is the single exception, and it is
    /// find-or-create so re-running the plan never duplicates accounts.
    pub(crate) async fn build_plan(&self, document: &Document) -> Result<PostingPlan, LedgerError> {
        let organization = document.organization;
        let mut movements = Vec::new();
        let mut touched: Vec<Account> = Vec::new();
        let mut inventory = Vec::new();

        for item in &document.items {
            let account = self
                .store
                .get_account(organization, item.account)
                .await?
                .ok_or_else(|| {
                    LedgerError::not_found(format!("account {} does not exist", item.account))
                })?;

            let movement = if item.debit > Decimal::ZERO {
                Movement::debit(account.account_id, item.debit, account.is_debit_normal())
            } else {
                Movement::credit(account.account_id, item.credit, account.is_debit_normal())
            };

            // A credit against an owner's-equity account also grows the
            // Drawings account by the same amount. Explicit rule
            // inherited from the domain; never inferred for other types.
            if item.credit > Decimal::ZERO
                && account.account_type == AccountType::OwnersEquity
                && account.well_known != Some(WellKnownAccount::Drawings)
            {
                let drawings = self.ensure_drawings(organization, document.company).await?;
                movements.push(Movement::credit(
                    drawings.account_id,
                    item.credit,
                    drawings.is_debit_normal(),
                ));
                touched.push(drawings);
            }

            if let Some(product) = item.product {
                if item.quantity != Decimal::ZERO {
                    inventory.push((product, -item.quantity));
                }
            }

            movements.push(movement);
            touched.push(account);
        }

        if document.kind == DocumentKind::Invoice {
            self.extend_invoice_plan(document, &mut movements, &mut touched)
                .await?;
        }

        let (expense_entries, income_entries) = match document.cost_center {
            Some(cost_center_id) => {
                // Resolve before any mutation so a missing cost center
                // aborts the document cleanly.
                self.store
                    .get_cost_center(organization, cost_center_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::not_found(format!(
                            "cost center {cost_center_id} does not exist"
                        ))
                    })?;
                cost_center_entries(document, &movements, &touched)
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(PostingPlan {
            movements,
            inventory,
            expense_entries,
            income_entries,
        })
    }

    /// Invoice document-level movements: the party's receivable/payable
    /// account (lazily vivified), shipping fee, late fee, output VAT, and
    /// the income line for accrual organizations.
    async fn extend_invoice_plan(
        &self,
        document: &Document,
        movements: &mut Vec<Movement>,
        touched: &mut Vec<Account>,
    ) -> Result<(), LedgerError> {
        let organization = document.organization;
        let party_kind = document.party_kind.ok_or_else(|| {
            LedgerError::validation("invoice documents require a customer or vendor")
        })?;
        let party_name = document
            .party_name
            .as_deref()
            .ok_or_else(|| LedgerError::validation("invoice documents require a party name"))?;

        let party_account = self
            .ensure_party_account(organization, document.company, party_kind, party_name)
            .await?;

        let total = document.invoice_total();
        let vat = document.output_vat();

        match party_kind {
            PartyKind::Customer => {
                movements.push(Movement::debit(
                    party_account.account_id,
                    total,
                    party_account.is_debit_normal(),
                ));
                touched.push(party_account);

                if vat > Decimal::ZERO {
                    let output_vat = self
                        .require_well_known(organization, WellKnownAccount::OutputVat)
                        .await?;
                    movements.push(Movement::credit(
                        output_vat.account_id,
                        vat,
                        output_vat.is_debit_normal(),
                    ));
                    touched.push(output_vat);
                }
                if document.shipping_fee > Decimal::ZERO {
                    let shipping = self
                        .require_well_known(organization, WellKnownAccount::ShippingCharge)
                        .await?;
                    movements.push(Movement::credit(
                        shipping.account_id,
                        document.shipping_fee,
                        shipping.is_debit_normal(),
                    ));
                    touched.push(shipping);
                }
                if document.late_fee > Decimal::ZERO {
                    let late_fee = self
                        .require_well_known(organization, WellKnownAccount::LateFee)
                        .await?;
                    movements.push(Movement::credit(
                        late_fee.account_id,
                        document.late_fee,
                        late_fee.is_debit_normal(),
                    ));
                    touched.push(late_fee);
                }
                if document.subtotal > Decimal::ZERO
                    && self.policy.is_accrual_accounting(organization)
                {
                    let income = self
                        .require_well_known(organization, WellKnownAccount::SalesIncome)
                        .await?;
                    movements.push(Movement::credit(
                        income.account_id,
                        document.subtotal,
                        income.is_debit_normal(),
                    ));
                    touched.push(income);
                }
            }
            PartyKind::Vendor => {
                movements.push(Movement::credit(
                    party_account.account_id,
                    total,
                    party_account.is_debit_normal(),
                ));
                touched.push(party_account);

                if vat > Decimal::ZERO {
                    let input_vat = self
                        .require_well_known(organization, WellKnownAccount::InputVat)
                        .await?;
                    movements.push(Movement::debit(
                        input_vat.account_id,
                        vat,
                        input_vat.is_debit_normal(),
                    ));
                    touched.push(input_vat);
                }
            }
        }

        Ok(())
    }

    async fn require_well_known(
        &self,
        organization: Uuid,
        kind: WellKnownAccount,
    ) -> Result<Account, LedgerError> {
        self.store
            .find_well_known(organization, kind)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "{} account is not configured for this organization",
                    kind.as_str()
                ))
            })
    }

    /// Find the party's sub-account under the AR/AP parent, creating it
    /// on first use: named after the party, code incremented from the
    /// parent's last child, appended to the parent's child list.
    pub(crate) async fn ensure_party_account(
        &self,
        organization: Uuid,
        company: Option<Uuid>,
        party_kind: PartyKind,
        party_name: &str,
    ) -> Result<Account, LedgerError> {
        let parent_kind = match party_kind {
            PartyKind::Customer => WellKnownParent::AccountsReceivable,
            PartyKind::Vendor => WellKnownParent::AccountsPayable,
        };
        let parent = self
            .store
            .find_well_known_parent(organization, parent_kind)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "{} parent account is not configured for this organization",
                    parent_kind.as_str()
                ))
            })?;

        if let Some(account) = self
            .store
            .find_child_by_name(organization, parent.parent_id, party_name)
            .await?
        {
            return Ok(account);
        }

        let last_child_code = match parent.child_accounts.last() {
            Some(child_id) => self
                .store
                .get_account(organization, *child_id)
                .await?
                .map(|a| a.account_code),
            None => None,
        };
        let code = next_child_code(&parent.code, last_child_code.as_deref());

        let account = self
            .store
            .create_account(&CreateAccount {
                organization,
                company,
                account_type: parent.account_type,
                account_name: party_name.to_string(),
                account_code: code,
                fixed: false,
                cost_center: None,
                group_account: Some(parent.parent_id),
                well_known: None,
            })
            .await?;
        self.store
            .append_child(organization, parent.parent_id, account.account_id)
            .await?;

        info!(
            account_id = %account.account_id,
            party = party_name,
            "Party sub-account created"
        );

        Ok(account)
    }

    async fn ensure_drawings(
        &self,
        organization: Uuid,
        company: Option<Uuid>,
    ) -> Result<Account, LedgerError> {
        if let Some(account) = self
            .store
            .find_well_known(organization, WellKnownAccount::Drawings)
            .await?
        {
            return Ok(account);
        }
        self.store
            .create_account(&CreateAccount {
                organization,
                company,
                account_type: AccountType::OwnersEquity,
                account_name: "Drawings".to_string(),
                account_code: "EQ-DRW".to_string(),
                fixed: true,
                cost_center: None,
                group_account: None,
                well_known: Some(WellKnownAccount::Drawings),
            })
            .await
    }
}

/// Mirror the income/expense subset of a document's movements into
/// cost-center entries.
fn cost_center_entries(
    document: &Document,
    movements: &[Movement],
    touched: &[Account],
) -> (Vec<CostCenterEntry>, Vec<CostCenterEntry>) {
    let mut expense = Vec::new();
    let mut income = Vec::new();
    let now = Utc::now();

    for movement in movements {
        let Some(account) = touched.iter().find(|a| a.account_id == movement.account_id)
        else {
            continue;
        };
        let entry = |amount: Decimal| CostCenterEntry {
            document_id: document.document_id,
            reference: document.reference.clone(),
            account: movement.account_id,
            amount,
            created_utc: now,
        };
        match account.account_type {
            AccountType::Expense | AccountType::CostOfGoodsSold => {
                let net = movement.debit - movement.credit;
                if net != Decimal::ZERO {
                    expense.push(entry(net));
                }
            }
            AccountType::Income | AccountType::OtherIncome => {
                let net = movement.credit - movement.debit;
                if net != Decimal::ZERO {
                    income.push(entry(net));
                }
            }
            _ => {}
        }
    }

    (expense, income)
}
