use aggpush_common::types::DataType;
use indexmap::IndexMap;

use crate::column::{ColumnRef, ColumnRefFactory, ColumnRefMap, ColumnRefSet};
use crate::expr::{CallExpr, Expr};
use crate::plan::{JoinType, NodeId, Operator, PlanNode};

/// Assigns node and column ids and derives each node's output columns from
/// its operator and inputs. It does not check that expressions only reference
/// columns their inputs produce.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    next_node_id: u32,
    columns: ColumnRefFactory,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(&mut self, name: &str, data_type: DataType) -> ColumnRef {
        self.columns.create(name, data_type, true)
    }

    fn node(&mut self, op: Operator, inputs: Vec<PlanNode>, output_columns: ColumnRefSet) -> PlanNode {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        PlanNode {
            id,
            op,
            inputs,
            output_columns,
            statistics: None,
            limit: None,
        }
    }

    pub fn scan(&mut self, table_name: &str, columns: Vec<ColumnRef>) -> PlanNode {
        let output = columns.iter().cloned().collect();
        self.node(
            Operator::Scan {
                table_name: table_name.to_string(),
                columns,
            },
            Vec::new(),
            output,
        )
    }

    pub fn filter(&mut self, input: PlanNode, predicate: Expr) -> PlanNode {
        let output = input.output_columns.clone();
        self.node(Operator::Filter { predicate }, vec![input], output)
    }

    pub fn project(&mut self, input: PlanNode, column_map: ColumnRefMap) -> PlanNode {
        let output = column_map.keys().cloned().collect();
        self.node(Operator::Project { column_map }, vec![input], output)
    }

    /// Projection that forwards every input column unchanged and adds `extra`.
    pub fn project_with(&mut self, input: PlanNode, extra: Vec<(ColumnRef, Expr)>) -> PlanNode {
        let mut column_map: ColumnRefMap = input
            .output_columns
            .iter()
            .map(|c| (c.clone(), Expr::column(c)))
            .collect();
        column_map.extend(extra);
        self.project(input, column_map)
    }

    pub fn aggregate(
        &mut self,
        input: PlanNode,
        grouping_keys: Vec<ColumnRef>,
        aggregations: IndexMap<ColumnRef, CallExpr>,
    ) -> PlanNode {
        let output = grouping_keys
            .iter()
            .chain(aggregations.keys())
            .cloned()
            .collect();
        self.node(
            Operator::Aggregate {
                grouping_keys,
                aggregations,
            },
            vec![input],
            output,
        )
    }

    pub fn join(
        &mut self,
        left: PlanNode,
        right: PlanNode,
        join_type: JoinType,
        on_predicate: Option<Expr>,
        predicate: Option<Expr>,
    ) -> PlanNode {
        let mut output = left.output_columns.clone();
        if join_type.outputs_right_columns() {
            output.union_with(&right.output_columns);
        }
        self.node(
            Operator::Join {
                join_type,
                on_predicate,
                predicate,
            },
            vec![left, right],
            output,
        )
    }

    pub fn union(
        &mut self,
        inputs: Vec<PlanNode>,
        output_columns: Vec<ColumnRef>,
        child_output_columns: Vec<Vec<ColumnRef>>,
    ) -> PlanNode {
        let output = output_columns.iter().cloned().collect();
        self.node(
            Operator::Union {
                output_columns,
                child_output_columns,
            },
            inputs,
            output,
        )
    }

    /// Union whose output columns are freshly allocated, named and typed after
    /// the first branch's column list.
    pub fn union_of(
        &mut self,
        inputs: Vec<PlanNode>,
        child_output_columns: Vec<Vec<ColumnRef>>,
    ) -> (PlanNode, Vec<ColumnRef>) {
        let output_columns: Vec<ColumnRef> = child_output_columns
            .first()
            .map(|first| {
                first
                    .iter()
                    .map(|c| self.columns.create(c.name.clone(), c.data_type.clone(), true))
                    .collect()
            })
            .unwrap_or_default();
        let node = self.union(inputs, output_columns.clone(), child_output_columns);
        (node, output_columns)
    }

    pub fn cte_anchor(&mut self, cte_id: u32, definition: PlanNode, consumer: PlanNode) -> PlanNode {
        let output = consumer.output_columns.clone();
        self.node(Operator::CteAnchor { cte_id }, vec![definition, consumer], output)
    }

    /// Operator the push-down analysis does not look through. Its output is the
    /// union of its inputs' outputs.
    pub fn other(&mut self, name: &str, inputs: Vec<PlanNode>) -> PlanNode {
        let mut output = ColumnRefSet::new();
        for input in &inputs {
            output.union_with(&input.output_columns);
        }
        self.node(
            Operator::Other {
                name: name.to_string(),
            },
            inputs,
            output,
        )
    }
}
