use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::core::domain::Domain;

/// One corpus document as seen by the balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    /// Current domain label; `None` means unclassified
    pub domain: Option<String>,
    /// Quality score in 0..=1
    pub quality: f32,
    /// Label was set explicitly rather than inferred by a classifier
    pub explicitly_assigned: bool,
    /// Human-readable title, used by keyword classification
    pub title: String,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, domain: Option<&str>, quality: f32) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            domain: domain.map(str::to_string),
            quality,
            explicitly_assigned: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn assigned(mut self, explicitly_assigned: bool) -> Self {
        self.explicitly_assigned = explicitly_assigned;
        self
    }

    pub fn is_classified(&self) -> bool {
        self.domain.is_some()
    }
}

/// Point-in-time composition of one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub domain: Domain,
    pub document_count: usize,
    /// `document_count / total`, 0 when the corpus is empty
    pub current_allocation: f64,
    /// Mean quality of the domain's documents, 0 when it has none
    pub average_quality: f32,
}

/// Derive one snapshot per registered domain, in registry order.
///
/// Domains without documents still appear with a zero count. Unclassified
/// documents are not counted; labels naming an unregistered domain are
/// logged and skipped.
pub fn build_snapshots(domains: &[Domain], documents: &[DocumentRecord]) -> Vec<DomainSnapshot> {
    let mut counts: HashMap<&str, (usize, f64)> = HashMap::new();
    for domain in domains {
        counts.insert(domain.name.as_str(), (0, 0.0));
    }

    let mut unknown = 0usize;
    for doc in documents {
        let Some(label) = doc.domain.as_deref() else {
            continue;
        };
        match counts.get_mut(label) {
            Some((count, quality_sum)) => {
                *count += 1;
                *quality_sum += doc.quality as f64;
            }
            None => unknown += 1,
        }
    }
    if unknown > 0 {
        warn!("{} documents carry an unregistered domain label", unknown);
    }

    let total: usize = counts.values().map(|(c, _)| c).sum();

    domains
        .iter()
        .map(|domain| {
            let (count, quality_sum) = counts
                .get(domain.name.as_str())
                .copied()
                .unwrap_or((0, 0.0));
            DomainSnapshot {
                domain: domain.clone(),
                document_count: count,
                current_allocation: if total > 0 {
                    count as f64 / total as f64
                } else {
                    0.0
                },
                average_quality: if count > 0 {
                    (quality_sum / count as f64) as f32
                } else {
                    0.0
                },
            }
        })
        .collect()
}
