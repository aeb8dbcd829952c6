use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::core::corpus::{DocumentRecord, SnapshotProvider, StorageMutator};
use crate::core::domain::Domain;
use crate::error::StorageError;

/// Document counts of the demo corpus, keyed by the default domain names
const SAMPLE_COUNTS: &[(&str, usize)] = &[
    ("Crypto Derivatives", 320),
    ("High Frequency Trading", 180),
    ("Risk Management", 175),
    ("Market Microstructure", 160),
    ("DeFi", 200),
    ("Portfolio Construction", 100),
    ("Valuation Models", 75),
    ("Regulation & Compliance", 40),
];

const SAMPLE_UNCLASSIFIED: usize = 30;

/// In-memory corpus. Moves only relabel.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    documents: Mutex<BTreeMap<String, DocumentRecord>>,
}

impl MemoryCorpus {
    pub fn new(documents: impl IntoIterator<Item = DocumentRecord>) -> Self {
        Self {
            documents: Mutex::new(documents.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    /// Seeded demo corpus skewed toward derivatives and DeFi, with a batch
    /// of unclassified documents whose titles name their domain.
    pub fn sample(domains: &[Domain], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut docs = Vec::new();

        for domain in domains {
            let count = SAMPLE_COUNTS
                .iter()
                .find(|(name, _)| *name == domain.name)
                .map(|(_, c)| *c)
                .unwrap_or(100);
            for i in 0..count {
                docs.push(
                    DocumentRecord::new(
                        format!("{}-{:04}", domain.slug(), i),
                        Some(&domain.name),
                        rng.gen_range(0.4..1.0),
                    )
                    .with_title(format!("{} paper {}", domain.name, i))
                    .assigned(rng.gen_bool(0.5)),
                );
            }
        }

        if !domains.is_empty() {
            for i in 0..SAMPLE_UNCLASSIFIED {
                let domain = &domains[rng.gen_range(0..domains.len())];
                docs.push(
                    DocumentRecord::new(format!("inbox-{:04}", i), None, rng.gen_range(0.4..1.0))
                        .with_title(format!("Notes on {}", domain.name)),
                );
            }
        }

        info!("Generated sample corpus with {} documents", docs.len());
        Self::new(docs)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, DocumentRecord>>, StorageError> {
        self.documents.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.lock().ok()?.get(id).cloned()
    }

    pub fn insert(&self, document: DocumentRecord) -> Result<(), StorageError> {
        self.lock()?.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotProvider for MemoryCorpus {
    fn documents(&self) -> Result<Vec<DocumentRecord>, StorageError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

impl StorageMutator for MemoryCorpus {
    fn move_document(&self, document_id: &str, from: &str, to: &str) -> Result<(), StorageError> {
        let mut docs = self.lock()?;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))?;

        match doc.domain.as_deref() {
            Some(current) if current == from => {
                doc.domain = Some(to.to_string());
                doc.explicitly_assigned = false;
                Ok(())
            }
            other => Err(StorageError::WrongDomain {
                id: document_id.to_string(),
                expected: from.to_string(),
                actual: other.unwrap_or("unclassified").to_string(),
            }),
        }
    }

    fn assign_document(&self, document_id: &str, domain: &str) -> Result<(), StorageError> {
        let mut docs = self.lock()?;
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))?;

        if let Some(current) = &doc.domain {
            return Err(StorageError::WrongDomain {
                id: document_id.to_string(),
                expected: "unclassified".to_string(),
                actual: current.clone(),
            });
        }
        doc.domain = Some(domain.to_string());
        Ok(())
    }
}
