use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use aggpush_common::error::{Error, Result};
use aggpush_ir::{CallExpr, NodeId, functions};
use serde::Serialize;

use super::context::PushDownContext;

const PRE_AGGREGABLE_FUNCTIONS: [&str; 6] = [
    functions::MAX,
    functions::MIN,
    functions::SUM,
    functions::HLL_UNION,
    functions::BITMAP_UNION,
    functions::PERCENTILE_UNION,
];

/// Whether partial results of `call` can be re-combined after the push.
pub fn is_pre_aggregable(call: &CallExpr) -> bool {
    !call.distinct
        && PRE_AGGREGABLE_FUNCTIONS
            .iter()
            .any(|name| call.is_function(name))
}

/// Candidate contexts recorded during descent, per aggregate and per
/// root-to-leaf path, in top-to-bottom order.
#[derive(Debug, Default)]
pub struct CandidateRegistry<'p> {
    candidates: BTreeMap<NodeId, BTreeMap<usize, Vec<PushDownContext<'p>>>>,
}

impl<'p> CandidateRegistry<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts without an originating aggregate are ignored.
    pub fn record(&mut self, context: PushDownContext<'p>) {
        let Some(aggregate) = context.origin_aggregate_id() else {
            return;
        };
        self.candidates
            .entry(aggregate)
            .or_default()
            .entry(context.root_to_leaf_path_index())
            .or_default()
            .push(context);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn into_paths(self) -> impl Iterator<Item = (NodeId, usize, Vec<PushDownContext<'p>>)> {
        self.candidates.into_iter().flat_map(|(aggregate, paths)| {
            paths
                .into_iter()
                .map(move |(path, contexts)| (aggregate, path, contexts))
        })
    }
}

/// Accepted push-down targets, keyed by the aggregate they were derived from.
#[derive(Debug, Clone, Default)]
pub struct AcceptedResults<'p> {
    by_aggregate: BTreeMap<NodeId, Vec<PushDownContext<'p>>>,
}

impl<'p> AcceptedResults<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, aggregate: NodeId) -> Option<&[PushDownContext<'p>]> {
        self.by_aggregate.get(&aggregate).map(Vec::as_slice)
    }

    pub fn contains(&self, aggregate: NodeId) -> bool {
        self.by_aggregate.contains_key(&aggregate)
    }

    pub fn is_empty(&self) -> bool {
        self.by_aggregate.is_empty()
    }

    /// Number of aggregates with at least one accepted target.
    pub fn len(&self) -> usize {
        self.by_aggregate.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[PushDownContext<'p>])> {
        self.by_aggregate
            .iter()
            .map(|(aggregate, contexts)| (*aggregate, contexts.as_slice()))
    }

    pub fn push(&mut self, aggregate: NodeId, context: PushDownContext<'p>) {
        self.by_aggregate.entry(aggregate).or_default().push(context);
    }

    pub fn extend(&mut self, aggregate: NodeId, contexts: Vec<PushDownContext<'p>>) {
        if contexts.is_empty() {
            return;
        }
        self.by_aggregate.entry(aggregate).or_default().extend(contexts);
    }

    pub fn remove(&mut self, aggregate: NodeId) -> Vec<PushDownContext<'p>> {
        self.by_aggregate.remove(&aggregate).unwrap_or_default()
    }

    /// Moves every entry of `other` into `self`. The same aggregate may not be
    /// analysed on two sides of a merge.
    pub fn merge_disjoint(&mut self, other: AcceptedResults<'p>) -> Result<()> {
        for (aggregate, contexts) in other.by_aggregate {
            match self.by_aggregate.entry(aggregate) {
                Entry::Vacant(entry) => {
                    entry.insert(contexts);
                }
                Entry::Occupied(_) => {
                    return Err(Error::internal(format!(
                        "aggregate {} was accepted on more than one union branch",
                        aggregate
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn decisions(&self) -> Vec<PushDownDecision> {
        self.by_aggregate
            .iter()
            .flat_map(|(aggregate, contexts)| {
                contexts
                    .iter()
                    .map(move |context| PushDownDecision::new(*aggregate, context))
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.decisions())
            .map_err(|e| Error::internal(format!("failed to serialize push down decisions: {}", e)))
    }
}

/// Owned summary of one accepted push-down, for explain output and for the
/// rewrite stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushDownDecision {
    pub aggregate: NodeId,
    pub target: Option<NodeId>,
    pub target_operator: Option<String>,
    pub group_bys: BTreeMap<String, String>,
    pub aggregations: BTreeMap<String, String>,
    pub push_path: Vec<usize>,
    pub immediate_child_of_small_broadcast_join: bool,
}

impl PushDownDecision {
    fn new(aggregate: NodeId, context: &PushDownContext<'_>) -> Self {
        Self {
            aggregate,
            target: context.target_position().map(|node| node.id),
            target_operator: context.target_position().map(|node| node.op.name().to_string()),
            group_bys: context
                .group_bys()
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            aggregations: context
                .aggregations()
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            push_path: context.push_path().to_vec(),
            immediate_child_of_small_broadcast_join: context.is_immediate_child_of_small_broadcast_join(),
        }
    }
}
