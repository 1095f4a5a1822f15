//! ledger-core: Shared infrastructure for the ledger posting engine.
pub mod config;
pub mod error;
pub mod observability;
pub mod retry;

pub use error::LedgerError;
