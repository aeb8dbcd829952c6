use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::{BalanceConfig, DomainTarget};
use crate::error::ConfigError;

/// Allowed distance of the summed target allocations from 1.0
pub const ALLOCATION_TOLERANCE: f64 = 0.01;

/// A topical category with its target share of the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    /// Fraction of the corpus this domain should hold (0..=1)
    pub target_allocation: f64,
}

impl Domain {
    pub fn new(name: impl Into<String>, target_allocation: f64) -> Self {
        Self {
            name: name.into(),
            target_allocation,
        }
    }

    /// Directory-safe form of the name
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Lowercase, alphanumerics kept, every other run collapsed into one `_`.
/// "Regulation & Compliance" -> "regulation_compliance"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Validated, read-only set of domains in configuration order.
///
/// Reconfiguration builds a new registry through [`DomainRegistry::load`];
/// there is no mutation API.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRegistry {
    domains: Vec<Domain>,
}

impl DomainRegistry {
    pub fn load(config: &BalanceConfig) -> Result<Self, ConfigError> {
        Self::from_targets(&config.domain_targets)
    }

    /// Build from percent targets (0..=100), converting to fractions
    pub fn from_targets(targets: &[DomainTarget]) -> Result<Self, ConfigError> {
        let domains = targets
            .iter()
            .map(|t| Domain::new(t.name.trim(), t.percent / 100.0))
            .collect();
        Self::from_domains(domains)
    }

    /// Build from fractional targets, validating the allocation invariants
    pub fn from_domains(domains: Vec<Domain>) -> Result<Self, ConfigError> {
        if domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }

        let mut seen = HashSet::new();
        // Slug -> first domain using it; each domain needs its own directory
        let mut slugs: HashMap<String, &str> = HashMap::new();
        for (index, domain) in domains.iter().enumerate() {
            if domain.name.trim().is_empty() {
                return Err(ConfigError::BlankName { index });
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::DuplicateDomain(domain.name.clone()));
            }
            let slug = domain.slug();
            if slug.is_empty() {
                return Err(ConfigError::EmptySlug(domain.name.clone()));
            }
            if let Some(first) = slugs.get(&slug) {
                return Err(ConfigError::SlugCollision {
                    first: first.to_string(),
                    second: domain.name.clone(),
                    slug,
                });
            }
            slugs.insert(slug, domain.name.as_str());
            if domain.target_allocation < 0.0 || domain.target_allocation.is_nan() {
                return Err(ConfigError::NegativeTarget {
                    domain: domain.name.clone(),
                    target: domain.target_allocation,
                });
            }
            debug!(
                "Domain {:?} target {:.3}",
                domain.name, domain.target_allocation
            );
        }

        let sum: f64 = domains.iter().map(|d| d.target_allocation).sum();
        if (sum - 1.0).abs() > ALLOCATION_TOLERANCE {
            return Err(ConfigError::AllocationSum {
                sum,
                tolerance: ALLOCATION_TOLERANCE,
            });
        }

        info!("Domain registry loaded: {} domains", domains.len());
        Ok(Self { domains })
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
