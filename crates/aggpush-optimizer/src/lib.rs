//! Aggregate push-down analysis.
//!
//! [`PushDownAggregateCollector`] walks a logical plan and, for every
//! aggregate that can be partially evaluated below itself, reports the plan
//! nodes where a pre-aggregation should be placed together with the rewritten
//! grouping and aggregate expressions. It does not rewrite the plan.

mod pushdown;
pub mod settings;
pub mod stats;
#[cfg(test)]
mod test_utils;

use aggpush_common::error::Result;
use aggpush_ir::PlanNode;
pub use pushdown::{
    AcceptedResults, CandidateRegistry, CardinalityBucket, CardinalityProfile,
    PushDownAggregateCollector, PushDownContext, PushDownCostModel, PushDownDecision,
    is_pre_aggregable,
};
pub use settings::{CardinalityCoefficients, PushDownAggregateMode, PushDownAggregateSettings};
pub use stats::{PrecomputedStatistics, StatisticsEstimator, StatisticsOverrides};

pub fn collect(root: &PlanNode) -> Result<AcceptedResults<'_>> {
    collect_with_settings(root, &PushDownAggregateSettings::default())
}

pub fn collect_with_settings<'p>(
    root: &'p PlanNode,
    settings: &PushDownAggregateSettings,
) -> Result<AcceptedResults<'p>> {
    PushDownAggregateCollector::with_precomputed_statistics(settings).collect(root)
}
