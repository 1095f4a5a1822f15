//! Domain models for the posting engine.

mod account;
mod cost_center;
mod document;
mod parent_account;
mod transaction;

pub use account::{
    Account, AccountStatus, AccountType, CreateAccount, MasterCategory, WellKnownAccount,
    is_debit_normal,
};
pub use cost_center::{CostCenter, CostCenterEntry, CreateCostCenter};
pub use document::{
    ApprovalAction, ApprovalStatus, CreateDocument, Document, DocumentKind, LineItem, PartyKind,
    UpdateDocument, next_revision_reference,
};
pub use parent_account::{CreateParentAccount, ParentAccount, WellKnownParent, next_child_code};
pub use transaction::{Movement, RebalanceSeed, Transaction};
