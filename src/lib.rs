//! aggpush - decides where partial aggregations can be pushed below an
//! aggregate in a logical query plan.
//!
//! # Architecture
//!
//! ```text
//! PlanNode tree + Statistics → PushDownAggregateCollector → AcceptedResults → (rewrite stage)
//! ```
//!
//! The collector walks the plan once, records candidate placements at scans
//! and at joins with a small broadcast side, and keeps, per root-to-leaf path,
//! the most downstream candidate that the cardinality cost model accepts.
//!
//! # Example
//!
//! ```rust
//! use aggpush::{CallExpr, DataType, Expr, JoinType, PlanBuilder, Statistics, functions};
//! use indexmap::IndexMap;
//!
//! let mut builder = PlanBuilder::new();
//! let customer = builder.column("customer_id", DataType::Int64);
//! let amount = builder.column("amount", DataType::Float64);
//! let id = builder.column("id", DataType::Int64);
//! let country = builder.column("country", DataType::String);
//! let total = builder.column("total", DataType::Float64);
//!
//! let orders = builder
//!     .scan("orders", vec![customer.clone(), amount.clone()])
//!     .with_statistics(Statistics::new(10_000.0).with_column(&customer, 10.0));
//! let customers = builder.scan("customers", vec![id.clone(), country.clone()]);
//! let on = Expr::call(
//!     functions::EQ,
//!     vec![Expr::column(&customer), Expr::column(&id)],
//!     DataType::Bool,
//! );
//! let join = builder.join(orders, customers, JoinType::Inner, Some(on), None);
//!
//! let mut aggregations = IndexMap::new();
//! aggregations.insert(
//!     total,
//!     CallExpr::new(functions::SUM, vec![Expr::column(&amount)], DataType::Float64),
//! );
//! let plan = builder.aggregate(join, vec![country], aggregations);
//!
//! let results = aggpush::collect(&plan).unwrap();
//! assert_eq!(results.len(), 1);
//! ```

pub use aggpush_common::error::{Error, Result};
pub use aggpush_common::types::{DataType, Value};
pub use aggpush_ir::{
    CallExpr, CaseWhenExpr, ColumnId, ColumnRef, ColumnRefFactory, ColumnRefMap, ColumnRefSet,
    ColumnStatistic, Expr, JoinType, NodeId, Operator, PlanBuilder, PlanNode, Statistics,
    WhenClause, functions,
};
pub use aggpush_optimizer::{
    AcceptedResults, CardinalityBucket, CardinalityCoefficients, PrecomputedStatistics,
    PushDownAggregateCollector, PushDownAggregateMode, PushDownAggregateSettings, PushDownContext,
    PushDownDecision, StatisticsEstimator, StatisticsOverrides, collect, collect_with_settings,
};
