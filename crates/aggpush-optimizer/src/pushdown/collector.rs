use aggpush_common::error::{Error, Result};
use aggpush_ir::{CallExpr, ColumnRef, ColumnRefMap, ColumnRefSet, Expr, Operator, PlanNode};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, instrument, trace};

use super::context::PushDownContext;
use super::cost::PushDownCostModel;
use super::registry::{AcceptedResults, CandidateRegistry, is_pre_aggregable};
use crate::settings::PushDownAggregateSettings;
use crate::stats::{PrecomputedStatistics, StatisticsEstimator};

/// Hands out root-to-leaf path indexes. One allocator is shared by a whole
/// collection pass, including the nested runs started below unions.
#[derive(Debug, Default)]
struct PathIndexAllocator {
    next: usize,
}

impl PathIndexAllocator {
    fn allocate(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }
}

struct DescentState<'p, 'a> {
    candidates: CandidateRegistry<'p>,
    accepted: AcceptedResults<'p>,
    paths: &'a mut PathIndexAllocator,
}

impl<'p, 'a> DescentState<'p, 'a> {
    fn new(paths: &'a mut PathIndexAllocator) -> Self {
        Self {
            candidates: CandidateRegistry::new(),
            accepted: AcceptedResults::new(),
            paths,
        }
    }
}

/// Walks a logical plan and decides, for every eligible aggregate, where a
/// partial aggregation could be placed below it.
///
/// The walk records candidate contexts at scans and at joins with a small
/// broadcast side, then keeps the most downstream candidate of each
/// root-to-leaf path that passes the pre-aggregation and cost checks.
pub struct PushDownAggregateCollector<'s, E: StatisticsEstimator + ?Sized = PrecomputedStatistics> {
    settings: &'s PushDownAggregateSettings,
    estimator: &'s E,
}

impl<'s> PushDownAggregateCollector<'s, PrecomputedStatistics> {
    pub fn with_precomputed_statistics(settings: &'s PushDownAggregateSettings) -> Self {
        Self {
            settings,
            estimator: &PrecomputedStatistics,
        }
    }
}

impl<'s, E: StatisticsEstimator + ?Sized> PushDownAggregateCollector<'s, E> {
    pub fn new(settings: &'s PushDownAggregateSettings, estimator: &'s E) -> Self {
        Self {
            settings,
            estimator,
        }
    }

    #[instrument(skip_all, fields(root = %root.id, mode = %self.settings.mode))]
    pub fn collect<'p>(&self, root: &'p PlanNode) -> Result<AcceptedResults<'p>> {
        let mut paths = PathIndexAllocator::default();
        let root_path = paths.allocate();
        let mut state = DescentState::new(&mut paths);
        self.run(root, PushDownContext::empty(root_path), &mut state)?;
        debug!(aggregates = state.accepted.len(), "Collected aggregate push down targets");
        Ok(state.accepted)
    }

    fn run<'p>(
        &self,
        root: &'p PlanNode,
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        self.process(root, context, state)?;
        let candidates = std::mem::take(&mut state.candidates);
        self.select_push_down_targets(candidates, &mut state.accepted)
    }

    fn process<'p>(
        &self,
        node: &'p PlanNode,
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        match &node.op {
            Operator::Scan { .. } => {
                self.visit_scan(node, context, state);
                Ok(())
            }
            Operator::Filter { predicate } => self.visit_filter(node, predicate, context, state),
            Operator::Project { column_map } => self.visit_project(node, column_map, context, state),
            Operator::Aggregate {
                grouping_keys,
                aggregations,
            } => self.visit_aggregate(node, grouping_keys, aggregations, context, state),
            Operator::Join {
                on_predicate,
                predicate,
                ..
            } => self.visit_join(node, on_predicate.as_ref(), predicate.as_ref(), context, state),
            Operator::Union {
                output_columns,
                child_output_columns,
            } => self.visit_union(node, output_columns, child_output_columns, context, state),
            Operator::CteAnchor { .. } => self.visit_cte_anchor(node, context, state),
            Operator::Other { .. } => {
                self.block(node, context.root_to_leaf_path_index(), "unsupported operator", state)
            }
        }
    }

    /// Visits every input with an empty context. Aggregates further down still
    /// start their own analysis.
    fn block<'p>(
        &self,
        node: &'p PlanNode,
        path_index: usize,
        reason: &'static str,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        trace!(node = %node, reason, "Aggregate push down blocked");
        for input in &node.inputs {
            self.process(input, PushDownContext::empty(path_index), state)?;
        }
        Ok(())
    }

    fn is_invalid(node: &PlanNode, context: &PushDownContext<'_>) -> bool {
        context.is_empty() || node.has_limit()
    }

    fn visit_scan<'p>(&self, node: &'p PlanNode, context: PushDownContext<'p>, state: &mut DescentState<'p, '_>) {
        if Self::is_invalid(node, &context) {
            return;
        }
        trace!(
            node = %node,
            path = context.root_to_leaf_path_index(),
            "Recorded scan push down candidate"
        );
        state.candidates.record(context.at_target(node));
    }

    fn visit_filter<'p>(
        &self,
        node: &'p PlanNode,
        predicate: &Expr,
        mut context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        if Self::is_invalid(node, &context) {
            return self.block(node, context.root_to_leaf_path_index(), "invalid context", state);
        }
        context.add_passthrough_group_bys(&predicate.used_columns());
        self.process(input_at(node, 0)?, context, state)
    }

    fn visit_project<'p>(
        &self,
        node: &'p PlanNode,
        column_map: &ColumnRefMap,
        mut context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        let path = context.root_to_leaf_path_index();
        if Self::is_invalid(node, &context) {
            return self.block(node, path, "invalid context", state);
        }

        let input = input_at(node, 0)?;
        if column_map
            .iter()
            .all(|(output, value)| value.as_column() == Some(output))
        {
            return self.process(input, context, state);
        }

        context.substitute(column_map);
        if column_map.values().all(Expr::is_column_ref) {
            return self.process(input, context, state);
        }

        if !context.decompose_conditional_aggregations() {
            return self.block(node, path, "constant conditional branch", state);
        }
        if context.all_aggregations_constant() {
            return self.block(node, path, "constant aggregations", state);
        }
        self.process(input, context, state)
    }

    fn visit_aggregate<'p>(
        &self,
        node: &'p PlanNode,
        grouping_keys: &[ColumnRef],
        aggregations: &IndexMap<ColumnRef, CallExpr>,
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        let path = context.root_to_leaf_path_index();
        if aggregations.values().any(|call| call.distinct || call.count_star) {
            return self.block(node, path, "distinct or count(*) aggregation", state);
        }
        if !aggregations.is_empty() && aggregations.values().all(CallExpr::is_constant) {
            return self.block(node, path, "constant aggregations", state);
        }
        if grouping_keys.is_empty() {
            return self.block(node, path, "no grouping keys", state);
        }

        let context = PushDownContext::for_aggregate(node, grouping_keys, aggregations, path);
        self.process(input_at(node, 0)?, context, state)
    }

    fn visit_join<'p>(
        &self,
        node: &'p PlanNode,
        on_predicate: Option<&Expr>,
        predicate: Option<&Expr>,
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        let path = context.root_to_leaf_path_index();
        if Self::is_invalid(node, &context) {
            return self.block(node, path, "invalid context", state);
        }
        if context.all_aggregations_constant() {
            return self.block(node, path, "constant aggregations", state);
        }
        if node.inputs.len() != 2 {
            return Err(Error::internal(format!(
                "join {} has {} inputs",
                node.id,
                node.inputs.len()
            )));
        }
        let (left, right) = (&node.inputs[0], &node.inputs[1]);

        let small_broadcast = self.is_small_broadcast_join(right);
        if small_broadcast
            && !context.push_path().is_empty()
            && node.inputs.iter().all(is_scan_project_filter_tree)
        {
            trace!(node = %node, path, "Recorded broadcast join push down candidate");
            state.candidates.record(context.clone().at_target(node));
        }

        let mut join_columns = ColumnRefSet::new();
        for expr in on_predicate.into_iter().chain(predicate) {
            expr.collect_used_columns_into(&mut join_columns);
        }

        let left_context = split_join_child(&context, left, &join_columns, 0, || path, false);
        let right_context = split_join_child(
            &context,
            right,
            &join_columns,
            1,
            || state.paths.allocate(),
            small_broadcast,
        );

        self.process(left, left_context, state)?;
        self.process(right, right_context, state)
    }

    fn visit_union<'p>(
        &self,
        node: &'p PlanNode,
        output_columns: &[ColumnRef],
        child_output_columns: &[Vec<ColumnRef>],
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        let path = context.root_to_leaf_path_index();
        if Self::is_invalid(node, &context) {
            return self.block(node, path, "invalid context", state);
        }
        if context.all_aggregations_constant() {
            return self.block(node, path, "constant aggregations", state);
        }
        let Some(aggregate) = context.origin_aggregate_id() else {
            return self.block(node, path, "context without aggregate", state);
        };
        if child_output_columns.len() != node.inputs.len() {
            return Err(Error::internal(format!(
                "union {} has {} inputs but {} child column lists",
                node.id,
                node.inputs.len(),
                child_output_columns.len()
            )));
        }

        let mut branch_results = Vec::with_capacity(node.inputs.len());
        let mut other_results = Vec::with_capacity(node.inputs.len());
        for (index, (input, child_columns)) in node.inputs.iter().zip(child_output_columns).enumerate() {
            if child_columns.len() != output_columns.len() {
                return Err(Error::internal(format!(
                    "union {} branch {} has {} columns, expected {}",
                    node.id,
                    index,
                    child_columns.len(),
                    output_columns.len()
                )));
            }
            let mapping: ColumnRefMap = output_columns
                .iter()
                .zip(child_columns)
                .map(|(output, child)| (output.clone(), Expr::column(child)))
                .collect();

            let branch_path = state.paths.allocate();
            let branch_context = context.for_union_branch(&mapping, index, branch_path);

            let mut nested = DescentState::new(&mut *state.paths);
            self.run(input, branch_context, &mut nested)?;
            let mut accepted = nested.accepted;
            branch_results.push(accepted.remove(aggregate));
            other_results.push(accepted);
        }

        for other in other_results {
            state.accepted.merge_disjoint(other)?;
        }

        if branch_results.iter().any(Vec::is_empty) {
            debug!(union = %node.id, %aggregate, "Not every union branch accepts the push down");
            return Ok(());
        }

        for contexts in &branch_results {
            let group_bys: FxHashSet<&ColumnRef> =
                contexts.iter().flat_map(|c| c.group_bys().keys()).collect();
            let aggregations: FxHashSet<&ColumnRef> =
                contexts.iter().flat_map(|c| c.aggregations().keys()).collect();
            let covers = context.group_bys().keys().all(|k| group_bys.contains(k))
                && context.aggregations().keys().all(|k| aggregations.contains(k));
            if !covers {
                debug!(union = %node.id, %aggregate, "Union branches disagree on the push down");
                return Ok(());
            }
        }

        debug!(
            union = %node.id,
            %aggregate,
            branches = branch_results.len(),
            "Merged union branch push downs"
        );
        state
            .accepted
            .extend(aggregate, branch_results.into_iter().flatten().collect());
        Ok(())
    }

    fn visit_cte_anchor<'p>(
        &self,
        node: &'p PlanNode,
        context: PushDownContext<'p>,
        state: &mut DescentState<'p, '_>,
    ) -> Result<()> {
        let path = context.root_to_leaf_path_index();
        let consumer = input_at(node, 1)?;
        let definition = input_at(node, 0)?;
        self.process(consumer, context, state)?;
        self.process(definition, PushDownContext::empty(path), state)
    }

    fn is_small_broadcast_join(&self, right: &PlanNode) -> bool {
        if !self.settings.push_down_on_broadcast_join {
            return false;
        }
        let statistics = self.estimator.estimate(right);
        if !statistics.has_row_count() {
            return false;
        }
        let rows = statistics.output_row_count;
        rows <= self.settings.broadcast_row_count_limit as f64
            && rows <= self.settings.broadcast_join_push_down_row_count_limit as f64
    }

    fn select_push_down_targets<'p>(
        &self,
        candidates: CandidateRegistry<'p>,
        accepted: &mut AcceptedResults<'p>,
    ) -> Result<()> {
        for (aggregate, path, contexts) in candidates.into_paths() {
            for context in contexts.into_iter().rev() {
                if self.can_push_down(&context)? {
                    trace!(%aggregate, path, "Accepted push down target");
                    accepted.push(aggregate, context);
                    break;
                }
            }
        }
        Ok(())
    }

    fn can_push_down(&self, context: &PushDownContext<'_>) -> Result<bool> {
        let Some(target) = context.target_position() else {
            return Ok(false);
        };
        if context.is_empty() || context.push_path().is_empty() {
            return Ok(false);
        }
        if !context.aggregations().values().all(is_pre_aggregable) {
            return Ok(false);
        }

        let group_by_columns = context.required_group_by_columns();
        let aggregate_columns = context.required_aggregate_columns();
        if !target.output_columns.contains_all(&group_by_columns)
            || !target.output_columns.contains_all(&aggregate_columns)
        {
            return Err(Error::internal(format!(
                "push down target {} does not output {} and {}",
                target, group_by_columns, aggregate_columns
            )));
        }

        let statistics = self.estimator.estimate(target);
        Ok(PushDownCostModel::new(self.settings).check(context, &group_by_columns, &statistics))
    }
}

fn input_at(node: &PlanNode, index: usize) -> Result<&PlanNode> {
    node.input(index).ok_or_else(|| {
        Error::internal(format!(
            "{} has no input {} ({} inputs)",
            node,
            index,
            node.inputs.len()
        ))
    })
}

/// A side only receives the aggregations when it produces every column they
/// read. Otherwise it gets an empty context.
fn split_join_child<'p>(
    context: &PushDownContext<'p>,
    child: &PlanNode,
    join_columns: &ColumnRefSet,
    child_index: usize,
    path_index: impl FnOnce() -> usize,
    immediate_child_of_small_broadcast_join: bool,
) -> PushDownContext<'p> {
    // A side that cannot host every aggregation keeps the incoming index.
    if !context.aggregations_within(&child.output_columns) {
        return PushDownContext::empty(context.root_to_leaf_path_index());
    }
    context.split_for_join_child(
        &child.output_columns,
        join_columns,
        child_index,
        path_index(),
        immediate_child_of_small_broadcast_join,
    )
}

fn is_scan_project_filter_tree(node: &PlanNode) -> bool {
    let allowed = match &node.op {
        Operator::Scan { .. } | Operator::Project { .. } | Operator::Filter { .. } => true,
        Operator::Aggregate { .. }
        | Operator::Join { .. }
        | Operator::Union { .. }
        | Operator::CteAnchor { .. }
        | Operator::Other { .. } => false,
    };
    allowed && node.inputs.iter().all(is_scan_project_filter_tree)
}
