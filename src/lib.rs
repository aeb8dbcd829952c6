//! Domain balance engine for curated document corpora.
//!
//! Tracks per-domain document counts against target allocations, plans
//! classifications, moves and collection quotas that bring a corpus back
//! to target, and applies those plans on a background worker.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod infrastructure;
pub mod worker;

pub use config::{BalanceConfig, BalanceMethod, DomainTarget};
pub use engine::{BalanceEngine, CorpusReport};
pub use error::{ConfigError, ExecutionItemError, OracleError, PlanningError, StorageError};
