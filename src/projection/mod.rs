//! Projection module
//!
//! Read models derived from the ledger store. Nothing here is cached: every
//! query re-reads the store.

mod service;

pub use service::{BalanceDrift, LedgerAudit, ProjectionService, ZeroSumViolation};
