mod collector;
mod context;
mod cost;
mod registry;

pub use collector::PushDownAggregateCollector;
pub use context::PushDownContext;
pub use cost::{CardinalityBucket, CardinalityProfile, PushDownCostModel};
pub use registry::{AcceptedResults, CandidateRegistry, PushDownDecision, is_pre_aggregable};
