use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::corpus::DomainSnapshot;

/// Half-width of the on-target band around each target allocation (±2%)
pub const ON_TARGET_BAND: f64 = 0.02;

// Absorbs float noise so that e.g. 0.62 - 0.60 still counts as on target.
const BAND_EPSILON: f64 = 1e-9;

/// Where a domain sits relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    OnTarget,
    Under,
    Over,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BalanceStatus::OnTarget => "On Target",
            BalanceStatus::Under => "Under",
            BalanceStatus::Over => "Over",
        }
    }

    /// Band rule: |deviation| <= 2% is on target, otherwise the sign decides
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation.abs() <= ON_TARGET_BAND + BAND_EPSILON {
            BalanceStatus::OnTarget
        } else if deviation > 0.0 {
            BalanceStatus::Over
        } else {
            BalanceStatus::Under
        }
    }
}

/// Deviation of one domain from its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceEntry {
    pub domain: String,
    pub document_count: usize,
    pub current_allocation: f64,
    pub target_allocation: f64,
    /// `current_allocation - target_allocation`
    pub deviation: f64,
    pub status: BalanceStatus,
}

/// Rank domains by how far they are from target.
///
/// Sorted by descending `|deviation|`, ties by domain name. With an empty
/// corpus every allocation is 0, so every domain with a non-zero target is
/// under.
pub fn analyze_imbalance(snapshots: &[DomainSnapshot]) -> Vec<ImbalanceEntry> {
    let total: usize = snapshots.iter().map(|s| s.document_count).sum();

    let mut entries: Vec<ImbalanceEntry> = snapshots
        .iter()
        .map(|s| {
            let current = if total > 0 {
                s.document_count as f64 / total as f64
            } else {
                0.0
            };
            let deviation = current - s.domain.target_allocation;
            ImbalanceEntry {
                domain: s.domain.name.clone(),
                document_count: s.document_count,
                current_allocation: current,
                target_allocation: s.domain.target_allocation,
                deviation,
                status: BalanceStatus::from_deviation(deviation),
            }
        })
        .collect();

    sort_by_magnitude(&mut entries);

    let over = entries.iter().filter(|e| e.status == BalanceStatus::Over).count();
    let under = entries.iter().filter(|e| e.status == BalanceStatus::Under).count();
    info!(
        "Imbalance analysis: {} documents, {} over, {} under, {} on target",
        total,
        over,
        under,
        entries.len() - over - under
    );

    entries
}

// Deviations are compared at 1e-9 resolution so float noise cannot break
// a tie that the name order should decide.
fn magnitude_key(deviation: f64) -> i64 {
    (deviation.abs() * 1e9).round() as i64
}

fn sort_by_magnitude(entries: &mut [ImbalanceEntry]) {
    entries.sort_by(|a, b| {
        magnitude_key(b.deviation)
            .cmp(&magnitude_key(a.deviation))
            .then_with(|| a.domain.cmp(&b.domain))
    });
}

/// "Corpus contains N documents across K domains"
pub fn corpus_summary(snapshots: &[DomainSnapshot]) -> String {
    let total: usize = snapshots.iter().map(|s| s.document_count).sum();
    format!(
        "Corpus contains {} documents across {} domains",
        total,
        snapshots.len()
    )
}

/// Human-readable guidance for manual balancing
pub fn get_recommendations(entries: &[ImbalanceEntry]) -> Vec<String> {
    let mut recommendations = Vec::new();
    let total: usize = entries.iter().map(|e| e.document_count).sum();

    if total == 0 {
        recommendations.push("No documents found in corpus.".to_string());
        return recommendations;
    }

    let over: Vec<&ImbalanceEntry> = entries
        .iter()
        .filter(|e| e.status == BalanceStatus::Over)
        .collect();
    let under: Vec<&ImbalanceEntry> = entries
        .iter()
        .filter(|e| e.status == BalanceStatus::Under)
        .collect();

    if over.is_empty() && under.is_empty() {
        recommendations.push(format!(
            "✓ All {} domains are within ±{:.0}% of target",
            entries.len(),
            ON_TARGET_BAND * 100.0
        ));
        return recommendations;
    }

    let describe = |list: &[&ImbalanceEntry]| {
        list.iter()
            .map(|e| format!("{} ({:+.1}%)", e.domain, e.deviation * 100.0))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !over.is_empty() {
        recommendations.push(format!("Overrepresented domains: {}", describe(&over)));
    }
    if !under.is_empty() {
        recommendations.push(format!("Underrepresented domains: {}", describe(&under)));
    }

    for entry in &under {
        let needed = (-entry.deviation * total as f64).round() as i64;
        recommendations.push(format!(
            "📈 Collect {} more documents in {} (currently {:.1}%, target {:.1}%)",
            needed,
            entry.domain,
            entry.current_allocation * 100.0,
            entry.target_allocation * 100.0
        ));
    }
    for entry in &over {
        let excess = (entry.deviation * total as f64).round() as i64;
        recommendations.push(format!(
            "📉 Consider moving {} documents from {} to underrepresented domains",
            excess, entry.domain
        ));
    }

    recommendations
}
