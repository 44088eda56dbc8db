//! Opportunity reconciliation: maps each parsed message onto at most one
//! open CRM deal per user, absorbing search-index lag with a short-lived
//! recency cache and remote dual-search.

pub mod cache;
pub mod engine;

pub use cache::{CachedDeal, RecencyCache};
pub use engine::{ReconcileAction, ReconcileOutcome, ReconcileRequest, ReconciliationEngine};
