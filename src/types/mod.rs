//! Type definitions for the fraud pipeline

pub mod record;
pub mod transaction;

pub use record::{CustomerProfile, MergedRecord, MergedSet};
pub use transaction::TransactionRequest;
