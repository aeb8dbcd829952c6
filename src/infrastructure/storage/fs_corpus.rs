use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::corpus::{DocumentRecord, SnapshotProvider, StorageMutator};
use crate::core::domain::Domain;
use crate::core::operations::{move_with_sidecar, sidecar_path_for, SIDECAR_SUFFIX};
use crate::error::StorageError;

/// Directory holding documents that carry no domain label yet
pub const UNCLASSIFIED_DIR: &str = "_unclassified";

/// Contents of a `<file>.meta.json` sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMeta {
    pub quality: f32,
    /// `None`: a file filed into a domain directory counts as explicitly
    /// assigned, one in `_unclassified/` does not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicitly_assigned: Option<bool>,
    pub title: Option<String>,
}

impl Default for DocumentMeta {
    fn default() -> Self {
        // Unscored documents are never filtered out by quality
        Self {
            quality: 1.0,
            explicitly_assigned: None,
            title: None,
        }
    }
}

/// Corpus laid out as one directory per domain under a root:
///
/// ```text
/// root/
///   crypto_derivatives/paper.pdf
///   crypto_derivatives/paper.pdf.meta.json
///   _unclassified/notes.txt
/// ```
///
/// A document's id is its file name, so it must be unique across the corpus.
#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
    /// Domain name -> directory name
    dirs: BTreeMap<String, String>,
}

impl FsCorpus {
    /// Open a corpus root, creating it and the per-domain directories if needed
    pub fn open(root: impl Into<PathBuf>, domains: &[Domain]) -> Result<Self, StorageError> {
        let root = root.into();
        let dirs: BTreeMap<String, String> = domains
            .iter()
            .map(|d| (d.name.clone(), d.slug()))
            .collect();

        fs::create_dir_all(root.join(UNCLASSIFIED_DIR))?;
        for dir in dirs.values() {
            fs::create_dir_all(root.join(dir))?;
        }
        info!("Opened corpus at {:?} with {} domain directories", root, dirs.len());

        Ok(Self { root, dirs })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn domain_dir(&self, domain: &str) -> Result<PathBuf, StorageError> {
        self.dirs
            .get(domain)
            .map(|dir| self.root.join(dir))
            .ok_or_else(|| StorageError::UnknownDomain(domain.to_string()))
    }

    fn unclassified_dir(&self) -> PathBuf {
        self.root.join(UNCLASSIFIED_DIR)
    }

    pub fn read_meta(document: &Path) -> Result<DocumentMeta, StorageError> {
        let sidecar = sidecar_path_for(document);
        if !sidecar.exists() {
            return Ok(DocumentMeta::default());
        }
        let content = fs::read_to_string(&sidecar)?;
        serde_json::from_str(&content).map_err(|e| StorageError::Metadata {
            path: sidecar,
            message: e.to_string(),
        })
    }

    pub fn write_meta(document: &Path, meta: &DocumentMeta) -> Result<(), StorageError> {
        let sidecar = sidecar_path_for(document);
        let json = serde_json::to_string_pretty(meta).map_err(|e| StorageError::Metadata {
            path: sidecar.clone(),
            message: e.to_string(),
        })?;
        fs::write(&sidecar, json)?;
        Ok(())
    }

    /// Document files directly inside `dir`, sorted by name. Sidecars,
    /// hidden files and subdirectories are skipped.
    fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping non UTF-8 file name in {:?}", dir);
                continue;
            };
            if name.starts_with('.') || name.ends_with(SIDECAR_SUFFIX) {
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    fn record_for(path: &Path, domain: Option<&str>) -> Result<DocumentRecord, StorageError> {
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::DocumentNotFound(path.display().to_string()))?;
        let meta = Self::read_meta(path)?;
        let record = DocumentRecord::new(id, domain, meta.quality.clamp(0.0, 1.0))
            .assigned(meta.explicitly_assigned.unwrap_or(domain.is_some()));
        Ok(match meta.title {
            Some(title) => record.with_title(title),
            None => record,
        })
    }

    fn relocate(&self, document: &Path, dest_dir: &Path) -> Result<PathBuf, StorageError> {
        if !document.is_file() {
            let id = document
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(StorageError::DocumentNotFound(id));
        }
        let moved = move_with_sidecar(document, dest_dir)?;
        debug!("Relocated {:?} -> {:?}", document, moved);
        Ok(moved)
    }

    /// Record that the balancer, not a user, placed `document` in its
    /// directory. The file has already moved, so a failure here only warns.
    fn mark_inferred(document: &Path) {
        let result = Self::read_meta(document).and_then(|mut meta| {
            if meta.explicitly_assigned == Some(false) {
                return Ok(());
            }
            meta.explicitly_assigned = Some(false);
            Self::write_meta(document, &meta)
        });
        if let Err(e) = result {
            warn!("Moved {:?} but could not update its metadata: {}", document, e);
        }
    }

    /// Name of the domain directory currently holding `document_id`, if any
    fn find_domain_of(&self, document_id: &str) -> Option<&str> {
        self.dirs
            .iter()
            .find(|(_, dir)| self.root.join(dir).join(document_id).is_file())
            .map(|(name, _)| name.as_str())
    }
}

impl SnapshotProvider for FsCorpus {
    fn documents(&self) -> Result<Vec<DocumentRecord>, StorageError> {
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        let labelled = self
            .dirs
            .iter()
            .map(|(name, dir)| (Some(name.as_str()), self.root.join(dir)));
        let sources = labelled.chain(std::iter::once((None, self.unclassified_dir())));

        for (domain, dir) in sources {
            for path in Self::scan_dir(&dir)? {
                let record = match Self::record_for(&path, domain) {
                    Ok(record) => record,
                    Err(StorageError::Metadata { path, message }) => {
                        warn!("Skipping document with bad metadata {:?}: {}", path, message);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !seen.insert(record.id.clone()) {
                    warn!("Duplicate document id '{}' in {:?}, skipping", record.id, dir);
                    continue;
                }
                documents.push(record);
            }
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Scanned {} documents under {:?}", documents.len(), self.root);
        Ok(documents)
    }
}

impl StorageMutator for FsCorpus {
    fn move_document(&self, document_id: &str, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.domain_dir(from)?.join(document_id);
        let dest_dir = self.domain_dir(to)?;

        if !source.is_file() {
            if let Some(actual) = self.find_domain_of(document_id) {
                return Err(StorageError::WrongDomain {
                    id: document_id.to_string(),
                    expected: from.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let moved = self.relocate(&source, &dest_dir)?;
        Self::mark_inferred(&moved);
        Ok(())
    }

    fn assign_document(&self, document_id: &str, domain: &str) -> Result<(), StorageError> {
        let dest_dir = self.domain_dir(domain)?;
        let source = self.unclassified_dir().join(document_id);

        if !source.is_file() {
            if let Some(actual) = self.find_domain_of(document_id) {
                return Err(StorageError::WrongDomain {
                    id: document_id.to_string(),
                    expected: UNCLASSIFIED_DIR.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let moved = self.relocate(&source, &dest_dir)?;
        Self::mark_inferred(&moved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<Domain> {
        vec![Domain::new("DeFi", 0.5), Domain::new("Risk Management", 0.5)]
    }

    fn write_doc(dir: &Path, name: &str, meta: Option<&DocumentMeta>) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        if let Some(meta) = meta {
            FsCorpus::write_meta(&path, meta).unwrap();
        }
        path
    }

    #[test]
    fn test_open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("corpus");
        let corpus = FsCorpus::open(&root, &domains()).unwrap();

        assert!(root.join(UNCLASSIFIED_DIR).is_dir());
        assert!(root.join("defi").is_dir());
        assert!(root.join("risk_management").is_dir());
        assert!(matches!(
            corpus.domain_dir("Nope"),
            Err(StorageError::UnknownDomain(_))
        ));
    }

    #[test]
    fn test_scan_reads_sidecars_and_skips_noise() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::open(tmp.path(), &domains()).unwrap();
        let defi = corpus.domain_dir("DeFi").unwrap();

        let meta = DocumentMeta {
            quality: 0.42,
            explicitly_assigned: Some(false),
            title: Some("AMM design".to_string()),
        };
        write_doc(&defi, "amm.pdf", Some(&meta));
        write_doc(&defi, ".hidden", None);
        write_doc(&tmp.path().join(UNCLASSIFIED_DIR), "inbox.txt", None);

        let docs = corpus.documents().unwrap();
        assert_eq!(docs.len(), 2);

        let amm = &docs[0];
        assert_eq!(amm.id, "amm.pdf");
        assert_eq!(amm.domain.as_deref(), Some("DeFi"));
        assert_eq!(amm.title, "AMM design");
        assert!(!amm.explicitly_assigned);
        assert!((amm.quality - 0.42).abs() < 1e-6);

        let inbox = &docs[1];
        assert_eq!(inbox.domain, None);
        assert!(!inbox.explicitly_assigned);
        assert_eq!(inbox.quality, 1.0);

        let snapshots = corpus.snapshot(&domains()).unwrap();
        assert_eq!(snapshots[0].document_count, 1);
        assert_eq!(snapshots[1].document_count, 0);
    }

    #[test]
    fn test_move_relocates_file_and_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::open(tmp.path(), &domains()).unwrap();
        let meta = DocumentMeta {
            quality: 0.9,
            explicitly_assigned: Some(true),
            title: None,
        };
        write_doc(&corpus.domain_dir("DeFi").unwrap(), "a.pdf", Some(&meta));

        corpus.move_document("a.pdf", "DeFi", "Risk Management").unwrap();

        let moved = corpus.domain_dir("Risk Management").unwrap().join("a.pdf");
        assert!(moved.is_file());
        assert!(!corpus.domain_dir("DeFi").unwrap().join("a.pdf").exists());
        assert_eq!(
            FsCorpus::read_meta(&moved).unwrap().explicitly_assigned,
            Some(false)
        );

        let err = corpus.move_document("a.pdf", "DeFi", "Risk Management");
        assert!(matches!(err, Err(StorageError::WrongDomain { .. })));
        assert!(matches!(
            corpus.move_document("ghost.pdf", "DeFi", "Risk Management"),
            Err(StorageError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_assign_moves_out_of_unclassified() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::open(tmp.path(), &domains()).unwrap();
        write_doc(&tmp.path().join(UNCLASSIFIED_DIR), "n.txt", None);

        corpus.assign_document("n.txt", "DeFi").unwrap();
        assert!(corpus.domain_dir("DeFi").unwrap().join("n.txt").is_file());

        let docs = corpus.documents().unwrap();
        assert_eq!(docs[0].domain.as_deref(), Some("DeFi"));
        assert!(!docs[0].explicitly_assigned);
        assert!(corpus.assign_document("n.txt", "Risk Management").is_err());
    }

    #[test]
    fn test_move_succeeds_when_metadata_cannot_be_updated() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::open(tmp.path(), &domains()).unwrap();
        let doc = write_doc(&corpus.domain_dir("DeFi").unwrap(), "c.pdf", None);
        fs::write(sidecar_path_for(&doc), "{ not json").unwrap();

        corpus.move_document("c.pdf", "DeFi", "Risk Management").unwrap();
        assert!(corpus
            .domain_dir("Risk Management")
            .unwrap()
            .join("c.pdf")
            .is_file());
    }

    #[test]
    fn test_filed_documents_default_to_explicit() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::open(tmp.path(), &domains()).unwrap();
        let defi = corpus.domain_dir("DeFi").unwrap();
        write_doc(&defi, "filed.pdf", None);
        write_doc(
            &defi,
            "loose.pdf",
            Some(&DocumentMeta {
                explicitly_assigned: Some(false),
                ..DocumentMeta::default()
            }),
        );

        let docs = corpus.documents().unwrap();
        assert!(docs[0].explicitly_assigned);
        assert_eq!(docs[1].id, "loose.pdf");
        assert!(!docs[1].explicitly_assigned);
    }

    #[test]
    fn test_preserve_existing_keeps_filed_documents() {
        use crate::config::{BalanceConfig, DomainTarget};
        use crate::engine::BalanceEngine;
        use std::sync::Arc;

        let tmp = tempfile::tempdir().unwrap();
        let domains = vec![Domain::new("A", 0.6), Domain::new("B", 0.4)];
        let corpus = Arc::new(FsCorpus::open(tmp.path(), &domains).unwrap());
        for i in 0..100 {
            let domain = if i < 80 { "A" } else { "B" };
            write_doc(&corpus.domain_dir(domain).unwrap(), &format!("doc-{:03}.txt", i), None);
        }
        let config = BalanceConfig {
            domain_targets: vec![DomainTarget::new("A", 60.0), DomainTarget::new("B", 40.0)],
            ..BalanceConfig::default()
        };
        let engine = BalanceEngine::new(config.clone(), corpus.clone()).unwrap();
        assert!(config.preserve_existing);
        assert_eq!(config.quality_threshold, 70);

        let plan = engine.plan(corpus.as_ref(), None).unwrap();
        assert!(plan.moves.is_empty());
        assert_eq!(plan.collection_quotas.get("B"), Some(&20));

        let mut engine = engine;
        engine
            .reconfigure(BalanceConfig {
                preserve_existing: false,
                ..config
            })
            .unwrap();
        assert_eq!(engine.plan(corpus.as_ref(), None).unwrap().moves.len(), 20);
    }
}
