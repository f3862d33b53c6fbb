use aggpush_common::types::{DataType, Value};
use aggpush_ir::{
    CallExpr, ColumnRef, Expr, JoinType, NodeId, Operator, PlanBuilder, PlanNode, Statistics,
    functions,
};
use indexmap::IndexMap;

use crate::{AcceptedResults, PushDownAggregateCollector, PushDownAggregateSettings, PushDownContext};

pub(crate) struct Orders {
    pub(crate) id: ColumnRef,
    pub(crate) customer_id: ColumnRef,
    pub(crate) product_id: ColumnRef,
    pub(crate) amount: ColumnRef,
    pub(crate) status: ColumnRef,
}

pub(crate) struct Customers {
    pub(crate) id: ColumnRef,
    pub(crate) name: ColumnRef,
    pub(crate) country: ColumnRef,
}

pub(crate) struct Products {
    pub(crate) id: ColumnRef,
    pub(crate) category: ColumnRef,
}

/// Shared builder plus the column handles of the three test tables.
pub(crate) struct Fixture {
    pub(crate) builder: PlanBuilder,
    pub(crate) orders: Orders,
    pub(crate) customers: Customers,
    pub(crate) products: Products,
}

pub(crate) fn fixture() -> Fixture {
    let mut builder = PlanBuilder::new();
    let orders = Orders {
        id: builder.column("o_id", DataType::Int64),
        customer_id: builder.column("o_customer_id", DataType::Int64),
        product_id: builder.column("o_product_id", DataType::Int64),
        amount: builder.column("o_amount", DataType::Float64),
        status: builder.column("o_status", DataType::String),
    };
    let customers = Customers {
        id: builder.column("c_id", DataType::Int64),
        name: builder.column("c_name", DataType::String),
        country: builder.column("c_country", DataType::String),
    };
    let products = Products {
        id: builder.column("p_id", DataType::Int64),
        category: builder.column("p_category", DataType::String),
    };
    Fixture {
        builder,
        orders,
        customers,
        products,
    }
}

impl Fixture {
    pub(crate) fn orders_scan(&mut self) -> PlanNode {
        let o = &self.orders;
        let columns = vec![
            o.id.clone(),
            o.customer_id.clone(),
            o.product_id.clone(),
            o.amount.clone(),
            o.status.clone(),
        ];
        self.builder.scan("orders", columns)
    }

    pub(crate) fn customers_scan(&mut self) -> PlanNode {
        let c = &self.customers;
        let columns = vec![c.id.clone(), c.name.clone(), c.country.clone()];
        self.builder.scan("customers", columns)
    }

    pub(crate) fn products_scan(&mut self) -> PlanNode {
        let p = &self.products;
        let columns = vec![p.id.clone(), p.category.clone()];
        self.builder.scan("products", columns)
    }

    /// `orders JOIN customers ON o_customer_id = c_id`.
    pub(crate) fn orders_join_customers(&mut self, orders: PlanNode, customers: PlanNode) -> PlanNode {
        let on = eq(&self.orders.customer_id, &self.customers.id);
        self.builder
            .join(orders, customers, JoinType::Inner, Some(on), None)
    }

    /// Aggregate whose output columns are allocated as `agg0`, `agg1`, ...
    pub(crate) fn aggregate(
        &mut self,
        input: PlanNode,
        grouping_keys: Vec<ColumnRef>,
        calls: Vec<CallExpr>,
    ) -> PlanNode {
        let aggregations: IndexMap<ColumnRef, CallExpr> = calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                let output = self.builder.column(&format!("agg{}", i), call.return_type.clone());
                (output, call)
            })
            .collect();
        self.builder.aggregate(input, grouping_keys, aggregations)
    }
}

pub(crate) fn sum(column: &ColumnRef) -> CallExpr {
    CallExpr::new(functions::SUM, vec![Expr::column(column)], column.data_type.clone())
}

pub(crate) fn max(column: &ColumnRef) -> CallExpr {
    CallExpr::new(functions::MAX, vec![Expr::column(column)], column.data_type.clone())
}

pub(crate) fn eq(left: &ColumnRef, right: &ColumnRef) -> Expr {
    Expr::call(
        functions::EQ,
        vec![Expr::column(left), Expr::column(right)],
        DataType::Bool,
    )
}

pub(crate) fn eq_str(column: &ColumnRef, value: &str) -> Expr {
    Expr::call(
        functions::EQ,
        vec![
            Expr::column(column),
            Expr::constant(Value::String(value.to_string()), DataType::String),
        ],
        DataType::Bool,
    )
}

pub(crate) fn output_columns(aggregate: &PlanNode) -> Vec<ColumnRef> {
    match &aggregate.op {
        Operator::Aggregate {
            grouping_keys,
            aggregations,
        } => grouping_keys
            .iter()
            .chain(aggregations.keys())
            .cloned()
            .collect(),
        other => panic!("Expected Aggregate, got {}", other.name()),
    }
}

pub(crate) fn collect_with<'p>(plan: &'p PlanNode, settings: &PushDownAggregateSettings) -> AcceptedResults<'p> {
    PushDownAggregateCollector::with_precomputed_statistics(settings)
        .collect(plan)
        .expect("push down collection failed")
}

pub(crate) fn collect_forced(plan: &PlanNode) -> AcceptedResults<'_> {
    collect_with(plan, &PushDownAggregateSettings::forced())
}

pub(crate) fn collect_auto(plan: &PlanNode) -> AcceptedResults<'_> {
    collect_with(plan, &PushDownAggregateSettings::default())
}

/// The single accepted context for `aggregate`.
pub(crate) fn only_pushed<'r, 'p>(results: &'r AcceptedResults<'p>, aggregate: NodeId) -> &'r PushDownContext<'p> {
    match results.get(aggregate) {
        Some([context]) => context,
        Some(contexts) => panic!("Expected one push down for {}, got {}", aggregate, contexts.len()),
        None => panic!("Expected a push down for {}, got none", aggregate),
    }
}

pub(crate) fn orders_statistics(fx: &Fixture, rows: f64, customer_ndv: f64) -> Statistics {
    Statistics::new(rows)
        .with_column(&fx.orders.customer_id, customer_ndv)
        .with_column(&fx.orders.status, 5.0)
        .with_column(&fx.orders.id, rows)
}

macro_rules! assert_pushed {
    ($results:expr, $aggregate:expr => []) => {
        assert!(
            $results.get($aggregate).is_none(),
            "Expected no push down for {}, got {:?}",
            $aggregate,
            $results.decisions()
        );
    };

    ($results:expr, $aggregate:expr => [$($target:expr),+ $(,)?]) => {
        match $results.get($aggregate) {
            Some(contexts) => {
                let mut targets: Vec<aggpush_ir::NodeId> = contexts
                    .iter()
                    .filter_map(|c| c.target_position().map(|t| t.id))
                    .collect();
                targets.sort();
                let mut expected: Vec<aggpush_ir::NodeId> = vec![$($target),+];
                expected.sort();
                assert_eq!(targets, expected, "push down targets mismatch for {}", $aggregate);
            }
            None => panic!("Expected push down for {}, got none", $aggregate),
        }
    };
}

pub(crate) use assert_pushed;
