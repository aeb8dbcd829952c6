//! Explicit context tying configuration, registry and the rebalance worker together.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::BalanceConfig;
use crate::core::analysis::{
    analyze_imbalance, calculate_rebalance_plan, corpus_summary, get_recommendations,
    ExecutionSummary, ImbalanceEntry, PlanOptions, RebalanceExecutor, RebalancePlan,
    RebalanceProgressMessage,
};
use crate::core::corpus::{
    build_snapshots, ClassificationOracle, DomainSnapshot, SnapshotProvider, StorageMutator,
};
use crate::core::domain::DomainRegistry;
use crate::error::{ConfigError, PlanningError, StorageError};
use crate::worker::{StartStatus, TaskRunner};

/// Result of one analysis pass
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub summary: String,
    pub snapshots: Vec<DomainSnapshot>,
    pub entries: Vec<ImbalanceEntry>,
    pub recommendations: Vec<String>,
}

pub struct BalanceEngine {
    config: BalanceConfig,
    registry: DomainRegistry,
    runner: TaskRunner<RebalanceExecutor>,
}

impl BalanceEngine {
    pub fn new(config: BalanceConfig, storage: Arc<dyn StorageMutator>) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = DomainRegistry::load(&config)?;
        Ok(Self {
            config,
            registry,
            runner: TaskRunner::new(RebalanceExecutor::new(storage)),
        })
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Swap in a new configuration. On error the previous one stays active.
    pub fn reconfigure(&mut self, config: BalanceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let registry = match DomainRegistry::load(&config) {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Rejected new configuration: {}", e);
                return Err(e);
            }
        };
        info!("Configuration replaced: {} domains", registry.len());
        self.config = config;
        self.registry = registry;
        Ok(())
    }

    pub fn snapshot(&self, provider: &dyn SnapshotProvider) -> Result<Vec<DomainSnapshot>, StorageError> {
        provider.snapshot(self.registry.domains())
    }

    pub fn analyze(&self, provider: &dyn SnapshotProvider) -> Result<CorpusReport, StorageError> {
        let snapshots = self.snapshot(provider)?;
        let entries = analyze_imbalance(&snapshots);
        let recommendations = get_recommendations(&entries);
        Ok(CorpusReport {
            summary: corpus_summary(&snapshots),
            snapshots,
            entries,
            recommendations,
        })
    }

    /// Snapshot the corpus and plan against it
    pub fn plan(
        &self,
        provider: &dyn SnapshotProvider,
        oracle: Option<&dyn ClassificationOracle>,
    ) -> Result<RebalancePlan, PlanningError> {
        let documents = provider.documents()?;
        let snapshots = build_snapshots(self.registry.domains(), &documents);
        let entries = analyze_imbalance(&snapshots);
        let options = PlanOptions::from_config(&self.config);

        let plan = calculate_rebalance_plan(&entries, &documents, &options, oracle)?;
        info!(
            "Planned {} classifications, {} moves, {} documents to collect",
            plan.classifications.len(),
            plan.moves.len(),
            plan.total_quota()
        );
        Ok(plan)
    }

    pub fn start_rebalance(&self, plan: RebalancePlan) -> StartStatus<RebalanceProgressMessage> {
        self.runner.start(plan)
    }

    pub fn cancel(&self) -> bool {
        self.runner.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Block until the active rebalance finishes
    pub fn wait(&self) -> Option<ExecutionSummary> {
        self.runner.wait()
    }
}
