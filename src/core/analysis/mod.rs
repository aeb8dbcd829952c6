mod balance_analyzer;
mod executor;
mod rebalancer;

pub use balance_analyzer::{
    analyze_imbalance, corpus_summary, get_recommendations, BalanceStatus, ImbalanceEntry,
    ON_TARGET_BAND,
};
pub use executor::{
    execute_rebalance_plan, ExecutionSummary, ItemOutcome, NullSink, ProgressSink,
    RebalanceExecutor, RebalanceProgressMessage,
};
pub use rebalancer::{
    calculate_demand, calculate_rebalance_plan, ClassifyAction, DomainDemand, MoveAction,
    PlanOptions, RebalancePlan,
};
