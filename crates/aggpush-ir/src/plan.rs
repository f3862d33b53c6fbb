use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::column::{ColumnRef, ColumnRefMap, ColumnRefSet};
use crate::expr::{CallExpr, Expr};
use crate::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
    LeftSemi,
    LeftAnti,
}

impl JoinType {
    pub fn outputs_right_columns(&self) -> bool {
        !matches!(self, JoinType::LeftSemi | JoinType::LeftAnti)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    Scan {
        table_name: String,
        columns: Vec<ColumnRef>,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        column_map: ColumnRefMap,
    },
    Aggregate {
        grouping_keys: Vec<ColumnRef>,
        aggregations: IndexMap<ColumnRef, CallExpr>,
    },
    Join {
        join_type: JoinType,
        on_predicate: Option<Expr>,
        predicate: Option<Expr>,
    },
    Union {
        output_columns: Vec<ColumnRef>,
        child_output_columns: Vec<Vec<ColumnRef>>,
    },
    /// Inputs are `[definition, consumer]`.
    CteAnchor {
        cte_id: u32,
    },
    Other {
        name: String,
    },
}

impl Operator {
    pub fn name(&self) -> &str {
        match self {
            Operator::Scan { .. } => "Scan",
            Operator::Filter { .. } => "Filter",
            Operator::Project { .. } => "Project",
            Operator::Aggregate { .. } => "Aggregate",
            Operator::Join { .. } => "Join",
            Operator::Union { .. } => "Union",
            Operator::CteAnchor { .. } => "CteAnchor",
            Operator::Other { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub op: Operator,
    pub inputs: Vec<PlanNode>,
    pub output_columns: ColumnRefSet,
    pub statistics: Option<Statistics>,
    pub limit: Option<u64>,
}

impl PlanNode {
    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn input(&self, index: usize) -> Option<&PlanNode> {
        self.inputs.get(index)
    }

    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    pub fn find(&self, id: NodeId) -> Option<&PlanNode> {
        if self.id == id {
            return Some(self);
        }
        self.inputs.iter().find_map(|input| input.find(id))
    }

    pub fn node_count(&self) -> usize {
        1 + self.inputs.iter().map(PlanNode::node_count).sum::<usize>()
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.name(), self.id)
    }
}
