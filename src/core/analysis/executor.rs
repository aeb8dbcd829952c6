//! Applying a rebalance plan against corpus storage.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::corpus::StorageMutator;
use crate::error::ExecutionItemError;
use crate::worker::{Task, TaskContext};

use super::rebalancer::RebalancePlan;

/// Progress message for rebalance execution
#[derive(Debug, Clone)]
pub enum RebalanceProgressMessage {
    Progress {
        completed: usize,
        total: usize,
        current_item: String,
    },
    Complete(ExecutionSummary),
    Cancelled(ExecutionSummary),
}

/// Receives execution progress, in attempt order
pub trait ProgressSink {
    fn on_progress(&self, completed: usize, total: usize, message: &str);
    fn on_complete(&self, summary: &ExecutionSummary);
}

impl ProgressSink for Sender<RebalanceProgressMessage> {
    fn on_progress(&self, completed: usize, total: usize, message: &str) {
        let _ = self.send(RebalanceProgressMessage::Progress {
            completed,
            total,
            current_item: message.to_string(),
        });
    }

    fn on_complete(&self, summary: &ExecutionSummary) {
        let message = if summary.cancelled {
            RebalanceProgressMessage::Cancelled(summary.clone())
        } else {
            RebalanceProgressMessage::Complete(summary.clone())
        };
        let _ = self.send(message);
    }
}

impl ProgressSink for TaskContext<RebalanceProgressMessage> {
    fn on_progress(&self, completed: usize, total: usize, message: &str) {
        self.report(RebalanceProgressMessage::Progress {
            completed,
            total,
            current_item: message.to_string(),
        });
    }

    fn on_complete(&self, summary: &ExecutionSummary) {
        self.report(if summary.cancelled {
            RebalanceProgressMessage::Cancelled(summary.clone())
        } else {
            RebalanceProgressMessage::Complete(summary.clone())
        });
    }
}

/// Sink that drops everything, for synchronous callers that only want the summary
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _completed: usize, _total: usize, _message: &str) {}
    fn on_complete(&self, _summary: &ExecutionSummary) {}
}

/// Result of one attempted plan item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub document_id: String,
    pub success: bool,
    pub error: Option<ExecutionItemError>,
}

/// Terminal report of an execution run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub moved_count: usize,
    pub failed_count: usize,
    pub classified_count: usize,
    /// Items attempted before finishing or cancelling
    pub completed: usize,
    pub total: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub outcomes: Vec<ItemOutcome>,
}

impl ExecutionSummary {
    pub fn errors(&self) -> impl Iterator<Item = &ExecutionItemError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref())
    }
}

/// Apply `plan`: classifications first, then moves, each in plan order.
///
/// Items are independent; a failure is recorded and the run continues. The
/// cancellation flag is checked before every item and already-applied items
/// are left in place.
pub fn execute_rebalance_plan(
    plan: &RebalancePlan,
    storage: &dyn StorageMutator,
    sink: &dyn ProgressSink,
    cancel_flag: &AtomicBool,
) -> ExecutionSummary {
    let total = plan.len();
    let mut summary = ExecutionSummary {
        total,
        ..ExecutionSummary::default()
    };

    info!(
        "Executing rebalance plan: {} classifications, {} moves",
        plan.classifications.len(),
        plan.moves.len()
    );

    for (idx, action) in plan.classifications.iter().enumerate() {
        if cancel_flag.load(Ordering::Relaxed) {
            warn!("Rebalance cancelled at {}/{}", idx, total);
            summary.cancelled = true;
            break;
        }

        let message = match storage.assign_document(&action.document_id, &action.domain) {
            Ok(()) => {
                debug!("Classified {:?} as {:?}", action.document_id, action.domain);
                summary.classified_count += 1;
                summary.outcomes.push(ItemOutcome {
                    document_id: action.document_id.clone(),
                    success: true,
                    error: None,
                });
                format!("Classified {} as {}", action.document_id, action.domain)
            }
            Err(e) => {
                let item_error = ExecutionItemError::Classify {
                    document_id: action.document_id.clone(),
                    domain: action.domain.clone(),
                    message: e.to_string(),
                };
                error!("{}", item_error);
                summary.failed_count += 1;
                summary.outcomes.push(ItemOutcome {
                    document_id: action.document_id.clone(),
                    success: false,
                    error: Some(item_error),
                });
                format!("Failed to classify {}", action.document_id)
            }
        };

        summary.completed += 1;
        sink.on_progress(summary.completed, total, &message);
    }

    if !summary.cancelled {
        for action in &plan.moves {
            if cancel_flag.load(Ordering::Relaxed) {
                warn!("Rebalance cancelled at {}/{}", summary.completed, total);
                summary.cancelled = true;
                break;
            }

            let message = match storage.move_document(
                &action.document_id,
                &action.from_domain,
                &action.to_domain,
            ) {
                Ok(()) => {
                    debug!(
                        "Moved {:?} from {:?} to {:?}",
                        action.document_id, action.from_domain, action.to_domain
                    );
                    summary.moved_count += 1;
                    summary.outcomes.push(ItemOutcome {
                        document_id: action.document_id.clone(),
                        success: true,
                        error: None,
                    });
                    format!(
                        "Moved {} from {} to {}",
                        action.document_id, action.from_domain, action.to_domain
                    )
                }
                Err(e) => {
                    let item_error = ExecutionItemError::Move {
                        document_id: action.document_id.clone(),
                        from: action.from_domain.clone(),
                        to: action.to_domain.clone(),
                        message: e.to_string(),
                    };
                    error!("{}", item_error);
                    summary.failed_count += 1;
                    summary.outcomes.push(ItemOutcome {
                        document_id: action.document_id.clone(),
                        success: false,
                        error: Some(item_error),
                    });
                    format!("Failed to move {}", action.document_id)
                }
            };

            summary.completed += 1;
            sink.on_progress(summary.completed, total, &message);
        }
    }

    info!(
        "Rebalance {}: {} moved, {} classified, {} failed ({}/{} attempted)",
        if summary.cancelled { "cancelled" } else { "complete" },
        summary.moved_count,
        summary.classified_count,
        summary.failed_count,
        summary.completed,
        total
    );

    sink.on_complete(&summary);
    summary
}

/// Executes rebalance plans through the task runner
pub struct RebalanceExecutor {
    storage: Arc<dyn StorageMutator>,
}

impl RebalanceExecutor {
    pub fn new(storage: Arc<dyn StorageMutator>) -> Self {
        Self { storage }
    }
}

impl Task for RebalanceExecutor {
    type Input = RebalancePlan;
    type Output = ExecutionSummary;
    type Progress = RebalanceProgressMessage;

    fn name(&self) -> &str {
        "rebalance"
    }

    fn run(&self, plan: RebalancePlan, ctx: &TaskContext<RebalanceProgressMessage>) -> ExecutionSummary {
        execute_rebalance_plan(&plan, self.storage.as_ref(), ctx, ctx.cancel_flag())
    }
}
