//! Ledger Engine - approval-gated double-entry posting for business documents.
//!
//! Turns source documents (invoices, journals, petty-cash requests,
//! inventory adjustments) into balanced account movements, maintains
//! running balances, and supports reversal and re-posting behind a
//! multi-step approval workflow. Document controllers (HTTP/gRPC) live
//! outside this crate and call in through [`services`].

pub mod config;
pub mod models;
pub mod services;
pub mod store;
