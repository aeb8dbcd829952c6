use serde::{Deserialize, Serialize};

use super::document::{build_snapshots, DocumentRecord, DomainSnapshot};
use crate::core::domain::Domain;
use crate::error::{OracleError, StorageError};

/// Read side of the corpus
pub trait SnapshotProvider {
    /// Full document inventory, classified or not
    fn documents(&self) -> Result<Vec<DocumentRecord>, StorageError>;

    /// Fresh per-domain composition, one entry per registered domain
    fn snapshot(&self, domains: &[Domain]) -> Result<Vec<DomainSnapshot>, StorageError> {
        Ok(build_snapshots(domains, &self.documents()?))
    }
}

/// Write side of the corpus. Each call is atomic: it either fully applies or
/// leaves the document where it was.
pub trait StorageMutator: Send + Sync {
    /// Relabel (and relocate, if the backend stores by domain) one document
    fn move_document(&self, document_id: &str, from: &str, to: &str) -> Result<(), StorageError>;

    /// Give an unclassified document its first domain label
    fn assign_document(&self, document_id: &str, domain: &str) -> Result<(), StorageError>;
}

/// Predicted domain for a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub domain: String,
    /// 0..=1
    pub confidence: f32,
}

impl Classification {
    pub fn new(domain: impl Into<String>, confidence: f32) -> Self {
        Self {
            domain: domain.into(),
            confidence,
        }
    }
}

pub trait ClassificationOracle {
    fn classify(&self, document: &DocumentRecord) -> Result<Classification, OracleError>;
}
