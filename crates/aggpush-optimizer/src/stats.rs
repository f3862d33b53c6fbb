use std::borrow::Cow;

use aggpush_ir::{NodeId, PlanNode, Statistics};
use rustc_hash::FxHashMap;

/// Source of row count and NDV estimates for a plan node. Implementations
/// must be side-effect free; the analysis may ask for the same node repeatedly.
///
/// Both the cost model and the small broadcast join test read through the
/// estimator. A node whose estimate has no row count is never a small
/// broadcast side.
pub trait StatisticsEstimator {
    fn estimate<'a>(&'a self, node: &'a PlanNode) -> Cow<'a, Statistics>;
}

/// Uses the statistics attached to the node, or unknown statistics when the
/// upstream planner did not derive any.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedStatistics;

impl StatisticsEstimator for PrecomputedStatistics {
    fn estimate<'a>(&'a self, node: &'a PlanNode) -> Cow<'a, Statistics> {
        match &node.statistics {
            Some(statistics) => Cow::Borrowed(statistics),
            None => Cow::Owned(Statistics::unknown()),
        }
    }
}

/// Pins statistics per node id, falling back to the node's own statistics.
#[derive(Debug, Clone, Default)]
pub struct StatisticsOverrides {
    by_node: FxHashMap<NodeId, Statistics>,
}

impl StatisticsOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, node: NodeId, statistics: Statistics) -> Self {
        self.by_node.insert(node, statistics);
        self
    }

    pub fn insert(&mut self, node: NodeId, statistics: Statistics) {
        self.by_node.insert(node, statistics);
    }
}

impl StatisticsEstimator for StatisticsOverrides {
    fn estimate<'a>(&'a self, node: &'a PlanNode) -> Cow<'a, Statistics> {
        match self.by_node.get(&node.id) {
            Some(statistics) => Cow::Borrowed(statistics),
            None => PrecomputedStatistics.estimate(node),
        }
    }
}
