//! PostgreSQL Ledger Store.
//!
//! Balance mutations are expressed as atomic `amount = amount + $n`
//! increments so concurrent postings against the same account never lose
//! updates, and every document batch runs inside one database
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::LedgerError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Account, AccountStatus, ApprovalStatus, CostCenter, CostCenterEntry, CreateAccount,
    CreateCostCenter, CreateDocument, CreateParentAccount, Document, DocumentKind, LineItem,
    Movement, ParentAccount, PartyKind, RebalanceSeed, Transaction, WellKnownAccount,
    WellKnownParent,
};
use crate::services::metrics::STORE_OP_DURATION;

use super::{AccountFilter, LedgerStore};

const ACCOUNT_COLUMNS: &str = "account_id, organization, company, account_type, account_name, \
     account_code, amount, debit, credit, status, fixed, cost_center, group_account, well_known, \
     created_utc, updated_utc";

const TRANSACTION_COLUMNS: &str = "transaction_id, organization, company, account, debit, credit, \
     running_balance, reference, document_id, kind, created_utc";

const DOCUMENT_COLUMNS: &str = "document_id, organization, company, reference, kind, approval, \
     valid, items, transaction_ids, cost_center, party_kind, party_name, subtotal, tax_rate, \
     shipping_fee, late_fee, reviewed_by, reviewed_utc, verified_by, verified_utc, \
     acknowledged_by, acknowledged_utc, approved_by1, approved_utc1, approved_by2, approved_utc2, \
     approval_comment, created_utc, updated_utc";

/// Map a sqlx error with context, classifying contention separately so
/// the caller's retry policy can distinguish it.
fn map_db(context: &'static str) -> impl Fn(sqlx::Error) -> LedgerError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LedgerError::ConcurrencyConflict(anyhow::anyhow!("{context}: {e}"))
        }
        // 40001 serialization_failure, 40P01 deadlock_detected
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
        {
            LedgerError::ConcurrencyConflict(anyhow::anyhow!("{context}: {e}"))
        }
        _ => LedgerError::Database(anyhow::anyhow!("{context}: {e}")),
    }
}

/// Raw document row; `items` is stored as JSONB.
#[derive(FromRow)]
struct DocumentRow {
    document_id: Uuid,
    organization: Uuid,
    company: Option<Uuid>,
    reference: String,
    kind: DocumentKind,
    approval: ApprovalStatus,
    valid: bool,
    items: serde_json::Value,
    transaction_ids: Vec<Uuid>,
    cost_center: Option<Uuid>,
    party_kind: Option<PartyKind>,
    party_name: Option<String>,
    subtotal: Decimal,
    tax_rate: Decimal,
    shipping_fee: Decimal,
    late_fee: Decimal,
    reviewed_by: Option<String>,
    reviewed_utc: Option<DateTime<Utc>>,
    verified_by: Option<String>,
    verified_utc: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    acknowledged_utc: Option<DateTime<Utc>>,
    approved_by1: Option<String>,
    approved_utc1: Option<DateTime<Utc>>,
    approved_by2: Option<String>,
    approved_utc2: Option<DateTime<Utc>>,
    approval_comment: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document, LedgerError> {
        let items: Vec<LineItem> = serde_json::from_value(self.items)
            .map_err(|e| LedgerError::Database(anyhow::anyhow!("Malformed document items: {e}")))?;
        Ok(Document {
            document_id: self.document_id,
            organization: self.organization,
            company: self.company,
            reference: self.reference,
            kind: self.kind,
            approval: self.approval,
            valid: self.valid,
            items,
            transaction_ids: self.transaction_ids,
            cost_center: self.cost_center,
            party_kind: self.party_kind,
            party_name: self.party_name,
            subtotal: self.subtotal,
            tax_rate: self.tax_rate,
            shipping_fee: self.shipping_fee,
            late_fee: self.late_fee,
            reviewed_by: self.reviewed_by,
            reviewed_utc: self.reviewed_utc,
            verified_by: self.verified_by,
            verified_utc: self.verified_utc,
            acknowledged_by: self.acknowledged_by,
            acknowledged_utc: self.acknowledged_utc,
            approved_by1: self.approved_by1,
            approved_utc1: self.approved_utc1,
            approved_by2: self.approved_by2,
            approved_utc2: self.approved_utc2,
            approval_comment: self.approval_comment,
            created_utc: self.created_utc,
            updated_utc: self.updated_utc,
        })
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, LedgerError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(map_db("Failed to connect"))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db("Health check failed"))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(anyhow::anyhow!("Migration failed: {e}")))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, input), fields(organization = %input.organization, account_code = %input.account_code))]
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (account_id, organization, company, account_type, account_name,
                                  account_code, fixed, cost_center, group_account, well_known)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ACCOUNT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization)
        .bind(input.company)
        .bind(input.account_type)
        .bind(&input.account_name)
        .bind(&input.account_code)
        .bind(input.fixed)
        .bind(input.cost_center)
        .bind(input.group_account)
        .bind(input.well_known)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db("Failed to create account"))?;

        timer.observe_duration();

        info!(
            account_id = %account.account_id,
            account_type = %account.account_type,
            "Account created"
        );

        Ok(account)
    }

    #[instrument(skip(self), fields(organization = %organization, account_id = %account_id))]
    async fn get_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, LedgerError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE organization = $1 AND account_id = $2
            "#,
        ))
        .bind(organization)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to get account"))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self), fields(organization = %organization))]
    async fn find_well_known(
        &self,
        organization: Uuid,
        kind: WellKnownAccount,
    ) -> Result<Option<Account>, LedgerError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE organization = $1 AND well_known = $2
            "#,
        ))
        .bind(organization)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to find well-known account"))?;

        Ok(account)
    }

    #[instrument(skip(self, filter), fields(organization = %organization))]
    async fn list_accounts(
        &self,
        organization: Uuid,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let types = filter
            .account_types
            .as_ref()
            .map(|ts| ts.iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>());

        let accounts = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE organization = $1
              AND ($2::varchar[] IS NULL OR account_type = ANY($2))
              AND ($3::varchar IS NULL OR status = $3)
              AND ($4::uuid IS NULL OR cost_center = $4)
            ORDER BY account_code
            "#,
        ))
        .bind(organization)
        .bind(types)
        .bind(filter.status.map(|s| match s {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }))
        .bind(filter.cost_center)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db("Failed to list accounts"))?;

        timer.observe_duration();

        Ok(accounts)
    }

    #[instrument(skip(self), fields(organization = %organization, account_id = %account_id))]
    async fn set_account_status(
        &self,
        organization: Uuid,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, LedgerError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET status = $3, updated_utc = now()
            WHERE organization = $1 AND account_id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#,
        ))
        .bind(organization)
        .bind(account_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to set account status"))?
        .ok_or_else(|| LedgerError::not_found("account does not exist"))?;

        Ok(account)
    }

    #[instrument(skip(self), fields(organization = %organization, account_id = %account_id))]
    async fn delete_account(
        &self,
        organization: Uuid,
        account_id: Uuid,
    ) -> Result<(), LedgerError> {
        let account = self
            .get_account(organization, account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("account does not exist"))?;
        if account.fixed {
            return Err(LedgerError::invariant("account is locked from deletion"));
        }

        let posted: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE organization = $1 AND account = $2",
        )
        .bind(organization)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db("Failed to count transactions"))?;

        if posted > 0 {
            return Err(LedgerError::invariant(
                "account has posted transactions and cannot be deleted",
            ));
        }

        sqlx::query("DELETE FROM accounts WHERE organization = $1 AND account_id = $2")
            .bind(organization)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(map_db("Failed to delete account"))?;

        Ok(())
    }

    #[instrument(skip(self, input), fields(organization = %input.organization, code = %input.code))]
    async fn create_parent_account(
        &self,
        input: &CreateParentAccount,
    ) -> Result<ParentAccount, LedgerError> {
        let parent = sqlx::query_as::<_, ParentAccount>(
            r#"
            INSERT INTO parent_accounts (parent_id, organization, company, name, account_type, code, well_known)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING parent_id, organization, company, name, account_type, code, child_accounts, well_known, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization)
        .bind(input.company)
        .bind(&input.name)
        .bind(input.account_type)
        .bind(&input.code)
        .bind(input.well_known)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db("Failed to create parent account"))?;

        Ok(parent)
    }

    #[instrument(skip(self), fields(organization = %organization, parent_id = %parent_id))]
    async fn get_parent_account(
        &self,
        organization: Uuid,
        parent_id: Uuid,
    ) -> Result<Option<ParentAccount>, LedgerError> {
        let parent = sqlx::query_as::<_, ParentAccount>(
            r#"
            SELECT parent_id, organization, company, name, account_type, code, child_accounts, well_known, created_utc
            FROM parent_accounts
            WHERE organization = $1 AND parent_id = $2
            "#,
        )
        .bind(organization)
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to get parent account"))?;

        Ok(parent)
    }

    #[instrument(skip(self), fields(organization = %organization))]
    async fn find_well_known_parent(
        &self,
        organization: Uuid,
        kind: WellKnownParent,
    ) -> Result<Option<ParentAccount>, LedgerError> {
        let parent = sqlx::query_as::<_, ParentAccount>(
            r#"
            SELECT parent_id, organization, company, name, account_type, code, child_accounts, well_known, created_utc
            FROM parent_accounts
            WHERE organization = $1 AND well_known = $2
            "#,
        )
        .bind(organization)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to find well-known parent"))?;

        Ok(parent)
    }

    #[instrument(skip(self), fields(organization = %organization))]
    async fn list_parent_accounts(
        &self,
        organization: Uuid,
    ) -> Result<Vec<ParentAccount>, LedgerError> {
        let parents = sqlx::query_as::<_, ParentAccount>(
            r#"
            SELECT parent_id, organization, company, name, account_type, code, child_accounts, well_known, created_utc
            FROM parent_accounts
            WHERE organization = $1
            ORDER BY code
            "#,
        )
        .bind(organization)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db("Failed to list parent accounts"))?;

        Ok(parents)
    }

    #[instrument(skip(self), fields(organization = %organization, parent_id = %parent_id, account_id = %account_id))]
    async fn append_child(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        account_id: Uuid,
    ) -> Result<ParentAccount, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_db("Failed to begin transaction"))?;

        let parent = sqlx::query_as::<_, ParentAccount>(
            r#"
            UPDATE parent_accounts
            SET child_accounts = array_append(child_accounts, $3)
            WHERE organization = $1 AND parent_id = $2 AND NOT (child_accounts @> ARRAY[$3]::uuid[])
            RETURNING parent_id, organization, company, name, account_type, code, child_accounts, well_known, created_utc
            "#,
        )
        .bind(organization)
        .bind(parent_id)
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db("Failed to append child"))?;

        let parent = match parent {
            Some(p) => p,
            // Already a child, or the parent is missing; re-read to tell.
            None => self
                .get_parent_account(organization, parent_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("parent account does not exist"))?,
        };

        sqlx::query(
            "UPDATE accounts SET group_account = $3, updated_utc = now() WHERE organization = $1 AND account_id = $2",
        )
        .bind(organization)
        .bind(account_id)
        .bind(parent_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db("Failed to link child account"))?;

        tx.commit()
            .await
            .map_err(map_db("Failed to commit transaction"))?;

        Ok(parent)
    }

    #[instrument(skip(self), fields(organization = %organization, parent_id = %parent_id))]
    async fn find_child_by_name(
        &self,
        organization: Uuid,
        parent_id: Uuid,
        name: &str,
    ) -> Result<Option<Account>, LedgerError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE organization = $1 AND group_account = $2 AND account_name = $3
            "#,
        ))
        .bind(organization)
        .bind(parent_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to find child account"))?;

        Ok(account)
    }

    #[instrument(skip(self, input), fields(organization = %input.organization, reference = %input.reference))]
    async fn insert_document(
        &self,
        input: &CreateDocument,
        approval: ApprovalStatus,
    ) -> Result<Document, LedgerError> {
        let items = serde_json::to_value(&input.items)
            .map_err(|e| LedgerError::Internal(anyhow::anyhow!("Failed to encode items: {e}")))?;

        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            INSERT INTO documents (document_id, organization, company, reference, kind, approval,
                                   items, cost_center, party_kind, party_name, subtotal, tax_rate,
                                   shipping_fee, late_fee)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {DOCUMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.organization)
        .bind(input.company)
        .bind(&input.reference)
        .bind(input.kind)
        .bind(approval)
        .bind(items)
        .bind(input.cost_center)
        .bind(input.party_kind)
        .bind(&input.party_name)
        .bind(input.subtotal)
        .bind(input.tax_rate)
        .bind(input.shipping_fee)
        .bind(input.late_fee)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db("Failed to insert document"))?;

        row.into_document()
    }

    #[instrument(skip(self), fields(organization = %organization, document_id = %document_id))]
    async fn get_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Option<Document>, LedgerError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM documents
            WHERE organization = $1 AND document_id = $2
            "#,
        ))
        .bind(organization)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to get document"))?;

        row.map(DocumentRow::into_document).transpose()
    }

    #[instrument(skip(self, document), fields(organization = %document.organization, document_id = %document.document_id))]
    async fn update_document(&self, document: &Document) -> Result<(), LedgerError> {
        let items = serde_json::to_value(&document.items)
            .map_err(|e| LedgerError::Internal(anyhow::anyhow!("Failed to encode items: {e}")))?;

        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET reference = $3, approval = $4, valid = $5, items = $6, transaction_ids = $7,
                cost_center = $8, party_kind = $9, party_name = $10, subtotal = $11,
                tax_rate = $12, shipping_fee = $13, late_fee = $14,
                reviewed_by = $15, reviewed_utc = $16, verified_by = $17, verified_utc = $18,
                acknowledged_by = $19, acknowledged_utc = $20,
                approved_by1 = $21, approved_utc1 = $22, approved_by2 = $23, approved_utc2 = $24,
                approval_comment = $25, updated_utc = now()
            WHERE organization = $1 AND document_id = $2
            "#,
        )
        .bind(document.organization)
        .bind(document.document_id)
        .bind(&document.reference)
        .bind(document.approval)
        .bind(document.valid)
        .bind(items)
        .bind(&document.transaction_ids)
        .bind(document.cost_center)
        .bind(document.party_kind)
        .bind(&document.party_name)
        .bind(document.subtotal)
        .bind(document.tax_rate)
        .bind(document.shipping_fee)
        .bind(document.late_fee)
        .bind(&document.reviewed_by)
        .bind(document.reviewed_utc)
        .bind(&document.verified_by)
        .bind(document.verified_utc)
        .bind(&document.acknowledged_by)
        .bind(document.acknowledged_utc)
        .bind(&document.approved_by1)
        .bind(document.approved_utc1)
        .bind(&document.approved_by2)
        .bind(document.approved_utc2)
        .bind(&document.approval_comment)
        .execute(&self.pool)
        .await
        .map_err(map_db("Failed to update document"))?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::not_found("document does not exist"));
        }
        Ok(())
    }

    #[instrument(skip(self, movements), fields(organization = %organization, document_id = %document_id, movement_count = movements.len()))]
    async fn apply_movements(
        &self,
        organization: Uuid,
        company: Option<Uuid>,
        reference: &str,
        document_id: Uuid,
        kind: DocumentKind,
        movements: &[Movement],
    ) -> Result<Vec<Transaction>, LedgerError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["apply_movements"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_db("Failed to begin transaction"))?;

        let mut inserted = Vec::with_capacity(movements.len());
        for movement in movements {
            // Atomic increment; RETURNING gives the post-increment
            // balance the transaction row snapshots.
            let amount: Option<Decimal> = sqlx::query_scalar(
                r#"
                UPDATE accounts
                SET debit = debit + $3, credit = credit + $4, amount = amount + $5,
                    updated_utc = now()
                WHERE organization = $1 AND account_id = $2
                RETURNING amount
                "#,
            )
            .bind(organization)
            .bind(movement.account_id)
            .bind(movement.debit)
            .bind(movement.credit)
            .bind(movement.amount_delta)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db("Failed to increment account"))?;

            let running_balance = amount.ok_or_else(|| {
                LedgerError::not_found(format!(
                    "account {} does not exist or belongs to another organization",
                    movement.account_id
                ))
            })?;

            let transaction = sqlx::query_as::<_, Transaction>(&format!(
                r#"
                INSERT INTO transactions (transaction_id, organization, company, account, debit,
                                          credit, running_balance, reference, document_id, kind,
                                          created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, clock_timestamp())
                RETURNING {TRANSACTION_COLUMNS}
                "#,
            ))
            .bind(Uuid::new_v4())
            .bind(organization)
            .bind(company)
            .bind(movement.account_id)
            .bind(movement.debit)
            .bind(movement.credit)
            .bind(running_balance)
            .bind(reference)
            .bind(document_id)
            .bind(kind)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db("Failed to insert transaction"))?;

            inserted.push(transaction);
        }

        tx.commit()
            .await
            .map_err(map_db("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(
            document_id = %document_id,
            movement_count = movements.len(),
            "Document posted"
        );

        Ok(inserted)
    }

    #[instrument(skip(self, movements), fields(organization = %organization, document_id = %document_id))]
    async fn revert_movements(
        &self,
        organization: Uuid,
        document_id: Uuid,
        movements: &[Movement],
    ) -> Result<Vec<RebalanceSeed>, LedgerError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["revert_movements"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_db("Failed to begin transaction"))?;

        for movement in movements {
            let updated = sqlx::query(
                r#"
                UPDATE accounts
                SET debit = debit + $3, credit = credit + $4, amount = amount + $5,
                    updated_utc = now()
                WHERE organization = $1 AND account_id = $2
                "#,
            )
            .bind(organization)
            .bind(movement.account_id)
            .bind(movement.debit)
            .bind(movement.credit)
            .bind(movement.amount_delta)
            .execute(&mut *tx)
            .await
            .map_err(map_db("Failed to revert account increment"))?;

            if updated.rows_affected() == 0 {
                return Err(LedgerError::not_found(format!(
                    "account {} does not exist or belongs to another organization",
                    movement.account_id
                )));
            }
        }

        let deleted: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            DELETE FROM transactions
            WHERE organization = $1 AND document_id = $2
            RETURNING account, created_utc
            "#,
        )
        .bind(organization)
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db("Failed to delete transactions"))?;

        tx.commit()
            .await
            .map_err(map_db("Failed to commit transaction"))?;

        timer.observe_duration();

        let mut earliest: std::collections::HashMap<Uuid, DateTime<Utc>> =
            std::collections::HashMap::new();
        for (account_id, created_utc) in deleted {
            earliest
                .entry(account_id)
                .and_modify(|ts| *ts = (*ts).min(created_utc))
                .or_insert(created_utc);
        }

        info!(
            document_id = %document_id,
            affected_accounts = earliest.len(),
            "Document reverted"
        );

        Ok(earliest
            .into_iter()
            .map(|(account_id, since)| RebalanceSeed { account_id, since })
            .collect())
    }

    #[instrument(skip(self), fields(organization = %organization, document_id = %document_id))]
    async fn transactions_for_document(
        &self,
        organization: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE organization = $1 AND document_id = $2
            ORDER BY created_utc
            "#,
        ))
        .bind(organization)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db("Failed to get transactions"))?;

        Ok(transactions)
    }

    #[instrument(skip(self), fields(organization = %organization, account_id = %account_id))]
    async fn transactions_for_account_since(
        &self,
        organization: Uuid,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE organization = $1 AND account = $2 AND created_utc >= $3
            ORDER BY created_utc
            "#,
        ))
        .bind(organization)
        .bind(account_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db("Failed to get account transactions"))?;

        Ok(transactions)
    }

    #[instrument(skip(self), fields(organization = %organization, account_id = %account_id))]
    async fn last_running_balance_before(
        &self,
        organization: Uuid,
        account_id: Uuid,
        ts: DateTime<Utc>,
    ) -> Result<Option<Decimal>, LedgerError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT running_balance
            FROM transactions
            WHERE organization = $1 AND account = $2 AND created_utc < $3
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(organization)
        .bind(account_id)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db("Failed to get last running balance"))?;

        Ok(balance)
    }

    #[instrument(skip(self), fields(organization = %organization, transaction_id = %transaction_id))]
    async fn set_running_balance(
        &self,
        organization: Uuid,
        transaction_id: Uuid,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            r#"
            UPDATE transactions
            SET running_balance = $3
            WHERE organization = $1 AND transaction_id = $2
            "#,
        )
        .bind(organization)
        .bind(transaction_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_db("Failed to set running balance"))?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::not_found("transaction does not exist"));
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(organization = %input.organization, name = %input.name))]
    async fn create_cost_center(
        &self,
        input: &CreateCostCenter,
    ) -> Result<CostCenter, LedgerError> {
        let (cost_center_id, created_utc): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO cost_centers (cost_center_id, organization, company, name)
            VALUES ($1, $2, $3, $4)
            RETURNING cost_center_id, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization)
        .bind(input.company)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db("Failed to create cost center"))?;

        Ok(CostCenter {
            cost_center_id,
            organization: input.organization,
            company: input.company,
            name: input.name.clone(),
            expense: Vec::new(),
            income: Vec::new(),
            total_expense: Decimal::ZERO,
            total_income: Decimal::ZERO,
            created_utc,
        })
    }

    #[instrument(skip(self), fields(organization = %organization, cost_center_id = %cost_center_id))]
    async fn get_cost_center(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
    ) -> Result<Option<CostCenter>, LedgerError> {
        let header: Option<(Uuid, Option<Uuid>, String, Decimal, Decimal, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT organization, company, name, total_expense, total_income, created_utc
                FROM cost_centers
                WHERE organization = $1 AND cost_center_id = $2
                "#,
            )
            .bind(organization)
            .bind(cost_center_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db("Failed to get cost center"))?;

        let (organization, company, name, total_expense, total_income, created_utc) = match header {
            Some(h) => h,
            None => return Ok(None),
        };

        let entries: Vec<(String, Uuid, String, Uuid, Decimal, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT side, document_id, reference, account, amount, created_utc
            FROM cost_center_entries
            WHERE organization = $1 AND cost_center_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(organization)
        .bind(cost_center_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db("Failed to get cost center entries"))?;

        let mut expense = Vec::new();
        let mut income = Vec::new();
        for (side, document_id, reference, account, amount, entry_utc) in entries {
            let entry = CostCenterEntry {
                document_id,
                reference,
                account,
                amount,
                created_utc: entry_utc,
            };
            if side == "expense" {
                expense.push(entry);
            } else {
                income.push(entry);
            }
        }

        Ok(Some(CostCenter {
            cost_center_id,
            organization,
            company,
            name,
            expense,
            income,
            total_expense,
            total_income,
            created_utc,
        }))
    }

    #[instrument(skip(self, expense, income), fields(organization = %organization, cost_center_id = %cost_center_id))]
    async fn cost_center_apply(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        expense: &[CostCenterEntry],
        income: &[CostCenterEntry],
    ) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_db("Failed to begin transaction"))?;

        for (side, entries) in [("expense", expense), ("income", income)] {
            for entry in entries {
                sqlx::query(
                    r#"
                    INSERT INTO cost_center_entries (entry_id, cost_center_id, organization, side,
                                                     document_id, reference, account, amount)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(cost_center_id)
                .bind(organization)
                .bind(side)
                .bind(entry.document_id)
                .bind(&entry.reference)
                .bind(entry.account)
                .bind(entry.amount)
                .execute(&mut *tx)
                .await
                .map_err(map_db("Failed to insert cost center entry"))?;
            }
        }

        let expense_total: Decimal = expense.iter().map(|e| e.amount).sum();
        let income_total: Decimal = income.iter().map(|e| e.amount).sum();

        let updated = sqlx::query(
            r#"
            UPDATE cost_centers
            SET total_expense = total_expense + $3, total_income = total_income + $4
            WHERE organization = $1 AND cost_center_id = $2
            "#,
        )
        .bind(organization)
        .bind(cost_center_id)
        .bind(expense_total)
        .bind(income_total)
        .execute(&mut *tx)
        .await
        .map_err(map_db("Failed to update cost center totals"))?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::not_found("cost center does not exist"));
        }

        tx.commit()
            .await
            .map_err(map_db("Failed to commit transaction"))?;

        Ok(())
    }

    #[instrument(skip(self), fields(organization = %organization, cost_center_id = %cost_center_id, document_id = %document_id))]
    async fn cost_center_revert(
        &self,
        organization: Uuid,
        cost_center_id: Uuid,
        document_id: Uuid,
    ) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_db("Failed to begin transaction"))?;

        let removed: Vec<(String, Decimal)> = sqlx::query_as(
            r#"
            DELETE FROM cost_center_entries
            WHERE organization = $1 AND cost_center_id = $2 AND document_id = $3
            RETURNING side, amount
            "#,
        )
        .bind(organization)
        .bind(cost_center_id)
        .bind(document_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db("Failed to delete cost center entries"))?;

        let mut expense_total = Decimal::ZERO;
        let mut income_total = Decimal::ZERO;
        for (side, amount) in removed {
            if side == "expense" {
                expense_total += amount;
            } else {
                income_total += amount;
            }
        }

        sqlx::query(
            r#"
            UPDATE cost_centers
            SET total_expense = total_expense - $3, total_income = total_income - $4
            WHERE organization = $1 AND cost_center_id = $2
            "#,
        )
        .bind(organization)
        .bind(cost_center_id)
        .bind(expense_total)
        .bind(income_total)
        .execute(&mut *tx)
        .await
        .map_err(map_db("Failed to update cost center totals"))?;

        tx.commit()
            .await
            .map_err(map_db("Failed to commit transaction"))?;

        Ok(())
    }
}
