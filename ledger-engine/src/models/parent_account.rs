//! Grouping nodes for the account hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::account::AccountType;

/// Parent roles the engine resolves by role instead of display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WellKnownParent {
    AccountsReceivable,
    AccountsPayable,
}

impl WellKnownParent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountsReceivable => "accounts_receivable",
            Self::AccountsPayable => "accounts_payable",
        }
    }
}

/// Grouping node owning an ordered list of child accounts.
///
/// A parent's displayed balance is always the live sum of its children's
/// `amount`; it is never stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ParentAccount {
    pub parent_id: Uuid,
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub name: String,
    pub account_type: AccountType,
    pub code: String,
    pub child_accounts: Vec<Uuid>,
    pub well_known: Option<WellKnownParent>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a parent account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParentAccount {
    pub organization: Uuid,
    pub company: Option<Uuid>,
    pub name: String,
    pub account_type: AccountType,
    pub code: String,
    pub well_known: Option<WellKnownParent>,
}

/// Next child code under a parent: the last child's code with its numeric
/// suffix incremented, width preserved (`AC-CL-AR-03` -> `AC-CL-AR-04`).
/// With no children yet, the parent's own code gets a `-01` suffix.
pub fn next_child_code(parent_code: &str, last_child_code: Option<&str>) -> String {
    match last_child_code {
        None => format!("{parent_code}-01"),
        Some(code) => match code.rsplit_once('-') {
            Some((prefix, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => {
                let next = suffix.parse::<u32>().unwrap_or(0) + 1;
                format!("{prefix}-{next:0width$}", width = suffix.len())
            }
            _ => format!("{code}-01"),
        },
    }
}
