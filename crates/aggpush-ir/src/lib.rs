//! Plan and expression model consumed by the aggregate push-down analysis.
//!
//! Plans are immutable trees of [`PlanNode`]s. Each node carries a closed
//! [`Operator`] variant, its inputs, the set of columns it outputs and,
//! optionally, pre-computed [`Statistics`] and a row limit.

pub mod builder;
pub mod column;
pub mod expr;
pub mod plan;
pub mod statistics;

pub use builder::PlanBuilder;
pub use column::{ColumnId, ColumnRef, ColumnRefFactory, ColumnRefMap, ColumnRefSet};
pub use expr::{CallExpr, CaseWhenExpr, Expr, WhenClause, functions};
pub use plan::{JoinType, NodeId, Operator, PlanNode};
pub use statistics::{ColumnStatistic, CombinedStatistic, Statistics};
