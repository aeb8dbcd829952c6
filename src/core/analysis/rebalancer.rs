//! Rebalance planning.
//!
//! Turns an imbalance report into a concrete plan: first labels for
//! unclassified documents, moves from over- to under-represented domains,
//! and collection quotas for every under-represented domain.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::config::{BalanceConfig, BalanceMethod};
use crate::core::corpus::{ClassificationOracle, DocumentRecord};
use crate::error::PlanningError;

use super::balance_analyzer::{BalanceStatus, ImbalanceEntry};

/// Relabel one document from an over- to an under-represented domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAction {
    pub document_id: String,
    pub from_domain: String,
    pub to_domain: String,
    pub reason: String,
}

/// First domain label for a previously unclassified document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyAction {
    pub document_id: String,
    pub domain: String,
    pub confidence: f32,
}

/// A complete rebalance plan. Built once per balance request, consumed by
/// the executor, then discarded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RebalancePlan {
    /// Minimum quality (0..=1) a document needed to be moved
    pub quality_threshold: f32,
    pub method: BalanceMethod,
    /// Applied before `moves`
    pub classifications: Vec<ClassifyAction>,
    pub moves: Vec<MoveAction>,
    /// Full deficit of each under-represented domain, `ceil(|excess|)`
    pub collection_quotas: BTreeMap<String, usize>,
    /// Part of each quota the planned moves leave uncovered
    pub residual_quotas: BTreeMap<String, usize>,
    pub classify_unclassified: bool,
    pub preserve_existing: bool,
    /// Classified documents counted by the plan
    pub total_documents: usize,
    /// Per-domain counts once the plan has been applied
    pub projected_counts: BTreeMap<String, usize>,
}

impl RebalancePlan {
    /// Nothing to apply (quotas are advisory and not executed)
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.classifications.is_empty()
    }

    /// Number of executable items
    pub fn len(&self) -> usize {
        self.moves.len() + self.classifications.len()
    }

    pub fn total_quota(&self) -> usize {
        self.collection_quotas.values().sum()
    }

    pub fn total_residual(&self) -> usize {
        self.residual_quotas.values().sum()
    }
}

/// Planner inputs taken from the balance configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    /// Percent, 0..=100
    pub quality_threshold: u32,
    pub method: BalanceMethod,
    pub classify_unclassified: bool,
    pub preserve_existing: bool,
    pub confidence_floor: f32,
    pub count_targets: BTreeMap<String, usize>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self::from_config(&BalanceConfig::default())
    }
}

impl PlanOptions {
    pub fn from_config(config: &BalanceConfig) -> Self {
        Self {
            quality_threshold: config.quality_threshold,
            method: config.method,
            classify_unclassified: config.auto_classify,
            preserve_existing: config.preserve_existing,
            confidence_floor: config.confidence_floor,
            count_targets: config.count_targets.clone(),
        }
    }

    fn quality_fraction(&self) -> f32 {
        self.quality_threshold.min(100) as f32 / 100.0
    }
}

/// Per-domain position under the selected method
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDemand {
    pub domain: String,
    pub count: usize,
    pub target_count: f64,
    /// Positive: documents to shed. Negative: documents missing.
    pub excess: i64,
    pub deviation: f64,
    pub status: BalanceStatus,
}

/// Compute each domain's excess or deficit for `method`.
///
/// `counts` must be in registry order and include every domain. Fraction
/// methods round `(current - target) * total`; count targets compare counts
/// directly.
pub fn calculate_demand(
    entries: &[ImbalanceEntry],
    counts: &[(String, usize)],
    options: &PlanOptions,
) -> Result<Vec<DomainDemand>, PlanningError> {
    let total: usize = counts.iter().map(|(_, c)| c).sum();
    let registry_target: HashMap<&str, f64> = entries
        .iter()
        .map(|e| (e.domain.as_str(), e.target_allocation))
        .collect();
    let num_domains = counts.len().max(1) as f64;

    counts
        .iter()
        .map(|(domain, count)| {
            let (target_count, target_allocation) = match options.method {
                BalanceMethod::TargetPercentage => {
                    let fraction = registry_target.get(domain.as_str()).copied().unwrap_or(0.0);
                    (fraction * total as f64, fraction)
                }
                BalanceMethod::EqualDistribution => {
                    (total as f64 / num_domains, 1.0 / num_domains)
                }
                BalanceMethod::DocumentCountTargets => {
                    let target = *options
                        .count_targets
                        .get(domain)
                        .ok_or_else(|| PlanningError::MissingCountTarget(domain.clone()))?
                        as f64;
                    let fraction = if total > 0 {
                        target / total as f64
                    } else if target > 0.0 {
                        1.0
                    } else {
                        0.0
                    };
                    (target, fraction)
                }
            };

            let current = if total > 0 {
                *count as f64 / total as f64
            } else {
                0.0
            };
            let deviation = current - target_allocation;
            Ok(DomainDemand {
                domain: domain.clone(),
                count: *count,
                target_count,
                excess: (*count as f64 - target_count).round() as i64,
                deviation,
                status: BalanceStatus::from_deviation(deviation),
            })
        })
        .collect()
}

/// Build a rebalance plan.
///
/// `entries` come from the imbalance analyzer for the current snapshot;
/// `documents` is the inventory behind that snapshot. Given identical inputs
/// and oracle answers the resulting plan is identical.
pub fn calculate_rebalance_plan(
    entries: &[ImbalanceEntry],
    documents: &[DocumentRecord],
    options: &PlanOptions,
    oracle: Option<&dyn ClassificationOracle>,
) -> Result<RebalancePlan, PlanningError> {
    let mut plan = RebalancePlan {
        quality_threshold: options.quality_fraction(),
        method: options.method,
        classify_unclassified: options.classify_unclassified,
        preserve_existing: options.preserve_existing,
        ..RebalancePlan::default()
    };

    // Name order keeps everything below independent of the analyzer's ranking
    let mut counts: BTreeMap<String, usize> = entries
        .iter()
        .map(|e| (e.domain.clone(), e.document_count))
        .collect();

    // Candidate pool: classified documents in registered domains, by id
    let mut pool: Vec<DocumentRecord> = documents
        .iter()
        .filter(|d| {
            d.domain
                .as_deref()
                .is_some_and(|name| counts.contains_key(name))
        })
        .cloned()
        .collect();

    if options.classify_unclassified {
        let mut unclassified: Vec<&DocumentRecord> =
            documents.iter().filter(|d| !d.is_classified()).collect();
        unclassified.sort_by(|a, b| a.id.cmp(&b.id));

        if !unclassified.is_empty() {
            let oracle = oracle.ok_or(PlanningError::NoOracle)?;
            for doc in unclassified {
                let prediction = oracle.classify(doc)?;
                let Some(count) = counts.get_mut(&prediction.domain) else {
                    debug!(
                        "Leaving {:?} unclassified: unknown domain {:?}",
                        doc.id, prediction.domain
                    );
                    continue;
                };
                if prediction.confidence < options.confidence_floor {
                    debug!(
                        "Leaving {:?} unclassified: confidence {:.2} below floor {:.2}",
                        doc.id, prediction.confidence, options.confidence_floor
                    );
                    continue;
                }

                *count += 1;
                plan.classifications.push(ClassifyAction {
                    document_id: doc.id.clone(),
                    domain: prediction.domain.clone(),
                    confidence: prediction.confidence,
                });
                let mut labelled = doc.clone();
                labelled.domain = Some(prediction.domain);
                labelled.explicitly_assigned = false;
                pool.push(labelled);
            }
        }
    }
    pool.sort_by(|a, b| a.id.cmp(&b.id));

    let ordered_counts: Vec<(String, usize)> = counts.into_iter().collect();
    plan.total_documents = ordered_counts.iter().map(|(_, c)| c).sum();
    let demand = calculate_demand(entries, &ordered_counts, options)?;

    let mut over: Vec<&DomainDemand> = demand
        .iter()
        .filter(|d| d.status == BalanceStatus::Over && d.excess > 0)
        .collect();
    over.sort_by(|a, b| b.excess.cmp(&a.excess).then_with(|| a.domain.cmp(&b.domain)));

    let mut deficits: Vec<(&DomainDemand, usize)> = demand
        .iter()
        .filter(|d| d.status == BalanceStatus::Under && d.excess < 0)
        .map(|d| (d, d.excess.unsigned_abs() as usize))
        .collect();
    for (demand, need) in &deficits {
        plan.collection_quotas.insert(demand.domain.clone(), *need);
    }

    let mut projected: BTreeMap<String, usize> = ordered_counts.iter().cloned().collect();
    let mut skipped_quality = 0usize;
    let mut skipped_preserved = 0usize;

    for source in over {
        let mut remaining_excess = source.excess as usize;
        let candidates = pool
            .iter()
            .filter(|d| d.domain.as_deref() == Some(source.domain.as_str()));

        for doc in candidates {
            if remaining_excess == 0 {
                break;
            }
            if options.preserve_existing && doc.explicitly_assigned {
                skipped_preserved += 1;
                continue;
            }
            if doc.quality < plan.quality_threshold {
                skipped_quality += 1;
                continue;
            }
            // Greedy: the most deficient domain takes the next document
            let Some((target, need)) = deficits
                .iter_mut()
                .filter(|(_, need)| *need > 0)
                .min_by(|(a, na), (b, nb)| nb.cmp(na).then_with(|| a.domain.cmp(&b.domain)))
            else {
                break;
            };

            *need -= 1;
            remaining_excess -= 1;
            plan.moves.push(MoveAction {
                document_id: doc.id.clone(),
                from_domain: source.domain.clone(),
                to_domain: target.domain.clone(),
                reason: format!(
                    "{} is {:+.1}% from target, {} is {:+.1}%",
                    source.domain,
                    source.deviation * 100.0,
                    target.domain,
                    target.deviation * 100.0
                ),
            });
            if let Some(c) = projected.get_mut(&source.domain) {
                *c = c.saturating_sub(1);
            }
            if let Some(c) = projected.get_mut(&target.domain) {
                *c += 1;
            }
        }
    }

    for (demand, need) in &deficits {
        if *need > 0 {
            plan.residual_quotas.insert(demand.domain.clone(), *need);
        }
    }
    plan.projected_counts = projected;

    info!(
        "Rebalance plan ({}): {} classifications, {} moves, {} documents to collect, \
         {} uncovered by moves ({} skipped below quality, {} preserved)",
        options.method.as_str(),
        plan.classifications.len(),
        plan.moves.len(),
        plan.total_quota(),
        plan.total_residual(),
        skipped_quality,
        skipped_preserved
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::analyze_imbalance;
    use crate::core::corpus::{build_snapshots, Classification};
    use crate::core::domain::Domain;
    use crate::error::OracleError;

    fn corpus(counts: &[(&str, usize)], quality: f32) -> Vec<DocumentRecord> {
        let mut docs = Vec::new();
        for (domain, count) in counts {
            for i in 0..*count {
                docs.push(DocumentRecord::new(
                    format!("{}-{:03}", domain.to_lowercase(), i),
                    Some(domain),
                    quality,
                ));
            }
        }
        docs
    }

    fn entries_for(domains: &[Domain], docs: &[DocumentRecord]) -> Vec<ImbalanceEntry> {
        analyze_imbalance(&build_snapshots(domains, docs))
    }

    fn options(method: BalanceMethod) -> PlanOptions {
        PlanOptions {
            quality_threshold: 50,
            method,
            classify_unclassified: false,
            preserve_existing: false,
            confidence_floor: 0.6,
            count_targets: BTreeMap::new(),
        }
    }

    struct MapOracle(HashMap<String, Classification>);

    impl ClassificationOracle for MapOracle {
        fn classify(&self, doc: &DocumentRecord) -> Result<Classification, OracleError> {
            self.0
                .get(&doc.id)
                .cloned()
                .ok_or_else(|| OracleError::Unavailable(format!("no answer for {}", doc.id)))
        }
    }

    fn two_domains() -> Vec<Domain> {
        vec![Domain::new("A", 0.6), Domain::new("B", 0.4)]
    }

    #[test]
    fn test_target_percentage_moves_excess() {
        let domains = two_domains();
        let docs = corpus(&[("A", 80), ("B", 20)], 0.9);
        let entries = entries_for(&domains, &docs);

        let plan = calculate_rebalance_plan(
            &entries,
            &docs,
            &options(BalanceMethod::TargetPercentage),
            None,
        )
        .unwrap();

        assert_eq!(plan.moves.len(), 20);
        assert!(plan
            .moves
            .iter()
            .all(|m| m.from_domain == "A" && m.to_domain == "B"));
        assert_eq!(plan.moves[0].document_id, "a-000");
        // Quota is the full deficit of B, even though moves cover all of it
        assert_eq!(plan.collection_quotas.get("B"), Some(&20));
        assert!(!plan.collection_quotas.contains_key("A"));
        assert!(plan.residual_quotas.is_empty());
        assert_eq!(plan.projected_counts["A"], 60);
        assert_eq!(plan.projected_counts["B"], 40);
    }

    #[test]
    fn test_quota_is_rounded_deficit_of_each_under_domain() {
        let domains = vec![
            Domain::new("A", 0.5),
            Domain::new("B", 0.3),
            Domain::new("C", 0.2),
        ];
        // 72 docs: B target 21.6 -> 22 missing, C target 14.4 -> 13 missing
        let mut docs = corpus(&[("A", 71), ("C", 1)], 0.9);
        for doc in docs.iter_mut() {
            doc.explicitly_assigned = true;
        }
        let entries = entries_for(&domains, &docs);
        let mut opts = options(BalanceMethod::TargetPercentage);
        opts.preserve_existing = true;

        let plan = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap();
        assert!(plan.moves.is_empty());
        assert_eq!(plan.collection_quotas.get("B"), Some(&22));
        assert_eq!(plan.collection_quotas.get("C"), Some(&13));
        assert_eq!(plan.residual_quotas, plan.collection_quotas);
        assert_eq!(plan.total_quota(), 35);
    }

    #[test]
    fn test_low_quality_documents_are_not_moved() {
        let domains = two_domains();
        let mut docs = corpus(&[("A", 80), ("B", 20)], 0.9);
        // First 70 documents of A fall below the 50% threshold
        for doc in docs.iter_mut().take(70) {
            doc.quality = 0.3;
        }
        let entries = entries_for(&domains, &docs);

        let plan = calculate_rebalance_plan(
            &entries,
            &docs,
            &options(BalanceMethod::TargetPercentage),
            None,
        )
        .unwrap();

        assert_eq!(plan.moves.len(), 10);
        assert_eq!(plan.moves[0].document_id, "a-070");
        assert_eq!(plan.collection_quotas.get("B"), Some(&20));
        assert_eq!(plan.residual_quotas.get("B"), Some(&10));
    }

    #[test]
    fn test_preserve_existing_skips_explicit_assignments() {
        let domains = two_domains();
        let mut docs = corpus(&[("A", 80), ("B", 20)], 0.9);
        for doc in docs.iter_mut().take(75) {
            doc.explicitly_assigned = true;
        }
        let entries = entries_for(&domains, &docs);
        let mut opts = options(BalanceMethod::TargetPercentage);
        opts.preserve_existing = true;

        let plan = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap();
        assert_eq!(plan.moves.len(), 5);
        assert_eq!(plan.collection_quotas.get("B"), Some(&20));
        assert_eq!(plan.residual_quotas.get("B"), Some(&15));
    }

    #[test]
    fn test_greedy_fills_largest_deficit_first() {
        let domains = vec![
            Domain::new("A", 0.4),
            Domain::new("B", 0.3),
            Domain::new("C", 0.3),
        ];
        // A +30, B -20, C -10
        let docs = corpus(&[("A", 70), ("B", 10), ("C", 20)], 0.9);
        let entries = entries_for(&domains, &docs);

        let plan = calculate_rebalance_plan(
            &entries,
            &docs,
            &options(BalanceMethod::TargetPercentage),
            None,
        )
        .unwrap();

        assert_eq!(plan.moves.len(), 30);
        // B takes documents until its remaining need ties C, then name order breaks ties
        let first_ten: Vec<&str> = plan.moves[..10].iter().map(|m| m.to_domain.as_str()).collect();
        assert!(first_ten.iter().all(|d| *d == "B"));
        assert_eq!(plan.moves[10].to_domain, "B");
        assert_eq!(plan.moves[11].to_domain, "C");
        assert_eq!(plan.moves.iter().filter(|m| m.to_domain == "B").count(), 20);
        assert_eq!(plan.moves.iter().filter(|m| m.to_domain == "C").count(), 10);
    }

    #[test]
    fn test_equal_distribution_ignores_registry_targets() {
        let domains = two_domains();
        let docs = corpus(&[("A", 60), ("B", 40)], 0.9);
        let entries = entries_for(&domains, &docs);

        // On target under the registry, but 10 over under equal split
        let plan = calculate_rebalance_plan(
            &entries,
            &docs,
            &options(BalanceMethod::EqualDistribution),
            None,
        )
        .unwrap();
        assert_eq!(plan.moves.len(), 10);
        assert_eq!(domains[0].target_allocation, 0.6);
    }

    #[test]
    fn test_document_count_targets() {
        let domains = two_domains();
        let docs = corpus(&[("A", 50), ("B", 10)], 0.9);
        let entries = entries_for(&domains, &docs);
        let mut opts = options(BalanceMethod::DocumentCountTargets);
        opts.count_targets.insert("A".into(), 40);
        opts.count_targets.insert("B".into(), 50);

        let plan = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap();
        assert_eq!(plan.moves.len(), 10);
        // B needs 40, 10 come from A, 30 remain uncovered
        assert_eq!(plan.collection_quotas.get("B"), Some(&40));
        assert_eq!(plan.residual_quotas.get("B"), Some(&30));

        opts.count_targets.remove("B");
        let err = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap_err();
        assert!(matches!(err, PlanningError::MissingCountTarget(ref d) if d == "B"));
    }

    #[test]
    fn test_classification_counts_toward_domains() {
        let domains = two_domains();
        let mut docs = corpus(&[("A", 50), ("B", 20)], 0.9);
        docs.push(DocumentRecord::new("u-1", None, 0.9));
        docs.push(DocumentRecord::new("u-2", None, 0.9));
        docs.push(DocumentRecord::new("u-3", None, 0.9));
        let entries = entries_for(&domains, &docs);

        let oracle = MapOracle(HashMap::from([
            ("u-1".to_string(), Classification::new("B", 0.9)),
            ("u-2".to_string(), Classification::new("A", 0.4)),
            ("u-3".to_string(), Classification::new("Nowhere", 0.99)),
        ]));
        let mut opts = options(BalanceMethod::TargetPercentage);
        opts.classify_unclassified = true;

        let plan = calculate_rebalance_plan(&entries, &docs, &opts, Some(&oracle)).unwrap();
        assert_eq!(
            plan.classifications,
            vec![ClassifyAction {
                document_id: "u-1".into(),
                domain: "B".into(),
                confidence: 0.9
            }]
        );
        assert_eq!(plan.total_documents, 71);
        assert!(plan.moves.iter().all(|m| !m.document_id.starts_with('u')));
    }

    #[test]
    fn test_oracle_failure_aborts_planning() {
        let domains = two_domains();
        let mut docs = corpus(&[("A", 50), ("B", 20)], 0.9);
        docs.push(DocumentRecord::new("u-1", None, 0.9));
        let entries = entries_for(&domains, &docs);
        let mut opts = options(BalanceMethod::TargetPercentage);
        opts.classify_unclassified = true;

        let oracle = MapOracle(HashMap::new());
        let err = calculate_rebalance_plan(&entries, &docs, &opts, Some(&oracle)).unwrap_err();
        assert!(matches!(err, PlanningError::OracleUnavailable(_)));

        let err = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap_err();
        assert!(matches!(err, PlanningError::NoOracle));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let domains = vec![
            Domain::new("A", 0.25),
            Domain::new("B", 0.25),
            Domain::new("C", 0.25),
            Domain::new("D", 0.25),
        ];
        let mut docs = corpus(&[("A", 50), ("B", 30), ("C", 10), ("D", 10)], 0.8);
        docs.reverse();
        let entries = entries_for(&domains, &docs);
        let opts = options(BalanceMethod::TargetPercentage);

        let first = calculate_rebalance_plan(&entries, &docs, &opts, None).unwrap();
        let mut shuffled = docs.clone();
        shuffled.rotate_left(37);
        let second = calculate_rebalance_plan(&entries, &shuffled, &opts, None).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(!first.moves.is_empty());
    }

    #[test]
    fn test_balanced_corpus_yields_empty_plan() {
        let domains = two_domains();
        let docs = corpus(&[("A", 61), ("B", 39)], 0.9);
        let entries = entries_for(&domains, &docs);
        let plan = calculate_rebalance_plan(
            &entries,
            &docs,
            &options(BalanceMethod::TargetPercentage),
            None,
        )
        .unwrap();
        assert!(plan.is_empty());
        assert!(plan.collection_quotas.is_empty());
        assert!(plan.residual_quotas.is_empty());
    }
}
