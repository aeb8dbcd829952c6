use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;

/// How the planner derives per-domain targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMethod {
    /// Use the registry's target allocations
    #[default]
    TargetPercentage,
    /// Every domain gets `1 / num_domains`, registry untouched
    EqualDistribution,
    /// Absolute per-domain document counts from `count_targets`
    DocumentCountTargets,
}

impl BalanceMethod {
    pub fn as_str(&self) -> &str {
        match self {
            BalanceMethod::TargetPercentage => "Target Percentage",
            BalanceMethod::EqualDistribution => "Equal Distribution",
            BalanceMethod::DocumentCountTargets => "Document Count Targets",
        }
    }
}

/// A configured domain and its target share in percent (0..=100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTarget {
    pub name: String,
    pub percent: f64,
}

impl DomainTarget {
    pub fn new(name: impl Into<String>, percent: f64) -> Self {
        Self {
            name: name.into(),
            percent,
        }
    }
}

/// Balancing configuration passed explicitly into the engine.
///
/// Loaded from JSON; any field missing from the file takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Ordered domain targets; order is preserved in every report
    pub domain_targets: Vec<DomainTarget>,

    /// Minimum document quality (percent) for a document to be moved
    pub quality_threshold: u32,

    pub method: BalanceMethod,

    /// Run unclassified documents through the classifier before planning
    pub auto_classify: bool,

    /// Never move documents whose domain was assigned explicitly
    pub preserve_existing: bool,

    /// Classifier predictions below this confidence leave a document unclassified
    pub confidence_floor: f32,

    /// Absolute targets used by `BalanceMethod::DocumentCountTargets`
    pub count_targets: BTreeMap<String, usize>,

    /// Root directory of a directory-backed corpus
    pub corpus_root: Option<PathBuf>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            domain_targets: vec![
                DomainTarget::new("Crypto Derivatives", 20.0),
                DomainTarget::new("High Frequency Trading", 15.0),
                DomainTarget::new("Risk Management", 15.0),
                DomainTarget::new("Market Microstructure", 15.0),
                DomainTarget::new("DeFi", 12.0),
                DomainTarget::new("Portfolio Construction", 10.0),
                DomainTarget::new("Valuation Models", 8.0),
                DomainTarget::new("Regulation & Compliance", 5.0),
            ],
            quality_threshold: 70,
            method: BalanceMethod::TargetPercentage,
            auto_classify: true,
            preserve_existing: true,
            confidence_floor: 0.6,
            count_targets: BTreeMap::new(),
            corpus_root: None,
        }
    }
}

impl BalanceConfig {
    /// Platform config location, e.g. `~/.config/corpus-balancer/balance.json`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "corpus-balancer")
            .map(|dirs| dirs.config_dir().join("balance.json"))
    }

    /// Load from `path`. A missing file yields the defaults; an unreadable
    /// or malformed file is an error so a bad config is never silently ignored.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading balance config from: {:?}", path);

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file found. Using defaults.");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        let config: BalanceConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;

        info!(
            "Loaded config with {} domains, method {}",
            config.domain_targets.len(),
            config.method.as_str()
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, json).map_err(|e| write_err(e.to_string()))?;

        info!("Config saved to: {:?}", path);
        Ok(())
    }

    /// Option-range checks. Domain target validation lives in the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality_threshold > 100 {
            return Err(ConfigError::QualityThreshold(self.quality_threshold));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::ConfidenceFloor(self.confidence_floor));
        }
        if self.method == BalanceMethod::DocumentCountTargets && self.count_targets.is_empty() {
            warn!("Document count targets selected but none are configured");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_eight_domains() {
        let config = BalanceConfig::default();
        assert_eq!(config.domain_targets.len(), 8);
        let total: f64 = config.domain_targets.iter().map(|t| t.percent).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert_eq!(config.quality_threshold, 70);
        assert!(config.auto_classify);
        assert!(config.preserve_existing);
        assert_eq!(config.method, BalanceMethod::TargetPercentage);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BalanceConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, BalanceConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.json");
        fs::write(
            &path,
            r#"{"quality_threshold": 40, "method": "equal_distribution"}"#,
        )
        .unwrap();

        let config = BalanceConfig::load_from(&path).unwrap();
        assert_eq!(config.quality_threshold, 40);
        assert_eq!(config.method, BalanceMethod::EqualDistribution);
        assert_eq!(config.domain_targets.len(), 8);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            BalanceConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("balance.json");
        let mut config = BalanceConfig::default();
        config.preserve_existing = false;
        config.count_targets.insert("DeFi".to_string(), 120);

        config.save_to(&path).unwrap();
        let loaded = BalanceConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = BalanceConfig {
            quality_threshold: 101,
            ..BalanceConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::QualityThreshold(101)));
    }
}
