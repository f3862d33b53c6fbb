use aggpush_ir::{
    CallExpr, ColumnRef, ColumnRefMap, ColumnRefSet, Expr, NodeId, PlanNode, WhenClause,
};
use indexmap::IndexMap;

/// One branch's view of an aggregation being pushed down.
///
/// `group_bys` and `aggregations` are keyed by the columns the original
/// aggregate produces; their values are rewritten as the context moves below
/// projections, joins and unions so that they always reference columns of the
/// node currently being visited. A context with both maps empty means nothing
/// can be pushed on this branch and never becomes non-empty again.
#[derive(Debug, Clone)]
pub struct PushDownContext<'p> {
    pub(crate) group_bys: IndexMap<ColumnRef, Expr>,
    pub(crate) aggregations: IndexMap<ColumnRef, CallExpr>,
    pub(crate) origin_aggregate: Option<&'p PlanNode>,
    pub(crate) root_to_leaf_path_index: usize,
    pub(crate) push_path: Vec<usize>,
    pub(crate) immediate_child_of_small_broadcast_join: bool,
    pub(crate) target_position: Option<&'p PlanNode>,
}

impl<'p> PushDownContext<'p> {
    pub fn empty(root_to_leaf_path_index: usize) -> Self {
        Self {
            group_bys: IndexMap::new(),
            aggregations: IndexMap::new(),
            origin_aggregate: None,
            root_to_leaf_path_index,
            push_path: Vec::new(),
            immediate_child_of_small_broadcast_join: false,
            target_position: None,
        }
    }

    pub fn for_aggregate(
        aggregate: &'p PlanNode,
        grouping_keys: &[ColumnRef],
        aggregations: &IndexMap<ColumnRef, CallExpr>,
        root_to_leaf_path_index: usize,
    ) -> Self {
        let mut context = Self::empty(root_to_leaf_path_index);
        context.origin_aggregate = Some(aggregate);
        context.aggregations = aggregations.clone();
        context.group_bys = grouping_keys
            .iter()
            .map(|key| (key.clone(), Expr::column(key)))
            .collect();
        context
    }

    pub fn is_empty(&self) -> bool {
        self.group_bys.is_empty() && self.aggregations.is_empty()
    }

    pub fn group_bys(&self) -> &IndexMap<ColumnRef, Expr> {
        &self.group_bys
    }

    pub fn aggregations(&self) -> &IndexMap<ColumnRef, CallExpr> {
        &self.aggregations
    }

    pub fn origin_aggregate(&self) -> Option<&'p PlanNode> {
        self.origin_aggregate
    }

    pub fn origin_aggregate_id(&self) -> Option<NodeId> {
        self.origin_aggregate.map(|node| node.id)
    }

    pub fn root_to_leaf_path_index(&self) -> usize {
        self.root_to_leaf_path_index
    }

    pub fn push_path(&self) -> &[usize] {
        &self.push_path
    }

    pub fn is_immediate_child_of_small_broadcast_join(&self) -> bool {
        self.immediate_child_of_small_broadcast_join
    }

    pub fn target_position(&self) -> Option<&'p PlanNode> {
        self.target_position
    }

    pub(crate) fn at_target(mut self, target: &'p PlanNode) -> Self {
        self.target_position = Some(target);
        self
    }

    /// Adds `column -> column` for every column, replacing existing entries.
    pub fn add_passthrough_group_bys<'a>(&mut self, columns: impl IntoIterator<Item = &'a ColumnRef>) {
        for column in columns {
            self.group_bys.insert(column.clone(), Expr::column(column));
        }
    }

    pub fn substitute(&mut self, map: &ColumnRefMap) {
        for value in self.group_bys.values_mut() {
            *value = value.substitute(map);
        }
        for call in self.aggregations.values_mut() {
            *call = call.substitute(map);
        }
    }

    pub fn all_aggregations_constant(&self) -> bool {
        !self.aggregations.is_empty() && self.aggregations.values().all(CallExpr::is_constant)
    }

    pub fn required_group_by_columns(&self) -> ColumnRefSet {
        let mut columns = ColumnRefSet::new();
        for value in self.group_bys.values() {
            value.collect_used_columns_into(&mut columns);
        }
        columns
    }

    pub fn required_aggregate_columns(&self) -> ColumnRefSet {
        let mut columns = ColumnRefSet::new();
        for call in self.aggregations.values() {
            columns.union_with(&call.used_columns());
        }
        columns
    }

    pub fn aggregations_within(&self, columns: &ColumnRefSet) -> bool {
        columns.contains_all(&self.required_aggregate_columns())
    }

    /// Derives the context for one input of a join.
    ///
    /// The caller must have checked [`Self::aggregations_within`] for this
    /// child; aggregations are carried over as they are. Group-by entries fully
    /// produced by the child are kept, partially produced ones have their
    /// missing columns replaced by typed NULLs, and the rest are dropped. The
    /// join's own predicate columns from this child are always grouped on.
    pub fn split_for_join_child(
        &self,
        child_output: &ColumnRefSet,
        join_predicate_columns: &ColumnRefSet,
        child_index: usize,
        root_to_leaf_path_index: usize,
        immediate_child_of_small_broadcast_join: bool,
    ) -> Self {
        let mut child = Self::empty(root_to_leaf_path_index);
        child.aggregations = self.aggregations.clone();

        for (key, value) in &self.group_bys {
            let used = value.used_columns();
            if child_output.contains_all(&used) {
                child.group_bys.insert(key.clone(), value.clone());
            } else if child_output.intersects(&used) {
                let nulls: ColumnRefMap = used
                    .iter()
                    .filter(|c| !child_output.contains(c))
                    .map(|c| (c.clone(), Expr::null(c.data_type.clone())))
                    .collect();
                child.group_bys.insert(key.clone(), value.substitute(&nulls));
            }
        }

        child.add_passthrough_group_bys(
            join_predicate_columns
                .iter()
                .filter(|c| child_output.contains(c)),
        );

        child.immediate_child_of_small_broadcast_join = immediate_child_of_small_broadcast_join;
        child.origin_aggregate = self.origin_aggregate;
        child.push_path = self.push_path.clone();
        child.push_path.push(child_index);
        child
    }

    /// Rewrites the context into the column space of one union input.
    pub fn for_union_branch(
        &self,
        column_mapping: &ColumnRefMap,
        branch_index: usize,
        root_to_leaf_path_index: usize,
    ) -> Self {
        let mut branch = Self::empty(root_to_leaf_path_index);
        branch.origin_aggregate = self.origin_aggregate;
        branch.aggregations = self.aggregations.clone();
        branch.group_bys = self.group_bys.clone();
        branch.substitute(column_mapping);
        branch.push_path = self.push_path.clone();
        branch.push_path.push(branch_index);
        branch
    }

    /// Turns conditional aggregate inputs into value-only expressions.
    ///
    /// For `agg(CASE WHEN c THEN v ... ELSE e END)` and `agg(IF(c, v, e))` the
    /// condition columns become group-by columns and each condition is replaced
    /// by `FALSE`, leaving the partial aggregate to work on the values alone.
    /// Returns `false` when a value branch is a non-null constant, in which case
    /// the aggregation cannot be decomposed.
    pub fn decompose_conditional_aggregations(&mut self) -> bool {
        for call in self.aggregations.values_mut() {
            let Some(input) = call.args.first_mut() else {
                continue;
            };

            match input {
                Expr::CaseWhen(case) => {
                    for clause in &case.when_clauses {
                        for column in clause.condition.used_columns() {
                            self.group_bys.insert(column.clone(), Expr::Column(column));
                        }
                    }

                    if case
                        .when_clauses
                        .iter()
                        .any(|clause| clause.result.is_constant() && !clause.result.is_constant_null())
                    {
                        return false;
                    }

                    case.when_clauses = case
                        .when_clauses
                        .iter()
                        .map(|clause| WhenClause {
                            condition: Expr::boolean(false),
                            result: clause.result.clone(),
                        })
                        .collect();
                }
                Expr::Call(inner) if inner.is_if() => {
                    if inner
                        .args
                        .iter()
                        .skip(1)
                        .any(|arg| arg.is_constant() && !arg.is_constant_null())
                    {
                        return false;
                    }

                    for column in inner.args[0].used_columns() {
                        self.group_bys.insert(column.clone(), Expr::Column(column));
                    }
                    inner.args[0] = Expr::boolean(false);
                }
                Expr::Call(_) | Expr::Column(_) | Expr::Constant { .. } => {}
            }
        }
        true
    }
}
