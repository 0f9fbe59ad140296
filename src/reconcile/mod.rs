//! Snapshot reconciliation: drift audits and keyed patching
//!
//! - [`audit`] compares a stored snapshot against the live listing
//! - [`patch`] folds rescraped records back into a snapshot by key

pub mod audit;
pub mod patch;

pub use audit::run_audit;
pub use patch::{apply_patch, PatchOutcome};
