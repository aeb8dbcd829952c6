use std::collections::HashSet;
use tracing::debug;

use super::document::DocumentRecord;
use super::traits::{Classification, ClassificationOracle};
use crate::core::domain::Domain;
use crate::error::OracleError;

/// Deterministic title-keyword classifier.
///
/// Each domain's keywords start as the words of its name; confidence is the
/// fraction of a domain's keywords found in the document title. Ties go to
/// the domain registered first.
#[derive(Debug, Clone)]
pub struct KeywordOracle {
    domains: Vec<(String, Vec<String>)>,
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
}

impl KeywordOracle {
    pub fn new(domains: &[Domain]) -> Self {
        Self {
            domains: domains
                .iter()
                .map(|d| (d.name.clone(), words(&d.name).collect()))
                .collect(),
        }
    }

    /// Replace the keyword list of `domain`
    pub fn with_keywords(mut self, domain: &str, keywords: &[&str]) -> Self {
        if let Some((_, kw)) = self.domains.iter_mut().find(|(name, _)| name == domain) {
            *kw = keywords.iter().map(|k| k.to_lowercase()).collect();
        }
        self
    }
}

impl ClassificationOracle for KeywordOracle {
    fn classify(&self, document: &DocumentRecord) -> Result<Classification, OracleError> {
        if self.domains.is_empty() {
            return Err(OracleError::Unavailable("no domains to classify into".into()));
        }

        let title: HashSet<String> = words(&document.title).collect();
        let mut best = Classification::new(self.domains[0].0.clone(), 0.0);

        for (name, keywords) in &self.domains {
            if keywords.is_empty() {
                continue;
            }
            let hits = keywords.iter().filter(|k| title.contains(*k)).count();
            let confidence = hits as f32 / keywords.len() as f32;
            if confidence > best.confidence {
                best = Classification::new(name.clone(), confidence);
            }
        }

        debug!(
            "Classified {:?} as {:?} ({:.2})",
            document.id, best.domain, best.confidence
        );
        Ok(best)
    }
}
