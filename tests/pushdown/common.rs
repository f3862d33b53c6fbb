use aggpush::{
    CallExpr, ColumnRef, DataType, Expr, JoinType, PlanBuilder, PlanNode, Statistics, Value,
    functions,
};
use indexmap::IndexMap;
use proptest::prelude::*;

/// Shape of a generated plan below the analysed aggregate. Every subtree
/// exposes one key column and one value column.
#[derive(Debug, Clone)]
pub enum Shape {
    Scan { rows: u32, key_ndv: u32, limited: bool },
    Filter(Box<Shape>),
    Project(Box<Shape>),
    Sort(Box<Shape>),
    Join { left: Box<Shape>, right: Box<Shape>, value_from_right: bool },
    Union(Box<Shape>, Box<Shape>),
}

#[derive(Debug, Clone, Copy)]
pub enum AggregateKind {
    Sum,
    Max,
    Avg,
    SumDistinct,
    CountStar,
}

impl AggregateKind {
    pub fn is_pushable(self) -> bool {
        matches!(self, AggregateKind::Sum | AggregateKind::Max)
    }

    fn call(self, value: &ColumnRef) -> CallExpr {
        let arg = || vec![Expr::column(value)];
        match self {
            AggregateKind::Sum => CallExpr::new(functions::SUM, arg(), DataType::Int64),
            AggregateKind::Max => CallExpr::new(functions::MAX, arg(), DataType::Int64),
            AggregateKind::Avg => CallExpr::new(functions::AVG, arg(), DataType::Float64),
            AggregateKind::SumDistinct => {
                CallExpr::new(functions::SUM, arg(), DataType::Int64).with_distinct()
            }
            AggregateKind::CountStar => CallExpr::count_star(),
        }
    }
}

pub fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = (1u32..2_000_000, 1u32..50_000, prop::bool::weighted(0.1)).prop_map(
        |(rows, key_ndv, limited)| Shape::Scan {
            rows,
            key_ndv,
            limited,
        },
    );
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Filter(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Project(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Sort(Box::new(s))),
            (inner.clone(), inner.clone(), any::<bool>()).prop_map(|(l, r, value_from_right)| {
                Shape::Join {
                    left: Box::new(l),
                    right: Box::new(r),
                    value_from_right,
                }
            }),
            (inner.clone(), inner).prop_map(|(l, r)| Shape::Union(Box::new(l), Box::new(r))),
        ]
    })
}

pub fn arb_aggregate_kind() -> impl Strategy<Value = AggregateKind> {
    prop_oneof![
        Just(AggregateKind::Sum),
        Just(AggregateKind::Max),
        Just(AggregateKind::Avg),
        Just(AggregateKind::SumDistinct),
        Just(AggregateKind::CountStar),
    ]
}

pub struct Built {
    pub node: PlanNode,
    pub key: ColumnRef,
    pub value: ColumnRef,
}

pub fn build(builder: &mut PlanBuilder, shape: &Shape) -> Built {
    match shape {
        Shape::Scan {
            rows,
            key_ndv,
            limited,
        } => {
            let key = builder.column("k", DataType::Int64);
            let value = builder.column("v", DataType::Int64);
            let statistics = Statistics::new(f64::from(*rows))
                .with_column(&key, f64::from(*key_ndv))
                .with_column(&value, f64::from(*rows));
            let mut node = builder
                .scan("t", vec![key.clone(), value.clone()])
                .with_statistics(statistics);
            if *limited {
                node = node.with_limit(100);
            }
            Built { node, key, value }
        }
        Shape::Filter(input) => {
            let built = build(builder, input);
            let predicate = Expr::call(
                functions::GT,
                vec![
                    Expr::column(&built.key),
                    Expr::constant(Value::Int64(0), DataType::Int64),
                ],
                DataType::Bool,
            );
            Built {
                node: builder.filter(built.node, predicate),
                ..built
            }
        }
        Shape::Project(input) => {
            let built = build(builder, input);
            let value = builder.column("v_abs", DataType::Int64);
            let expr = Expr::call(functions::ABS, vec![Expr::column(&built.value)], DataType::Int64);
            let node = builder.project_with(built.node, vec![(value.clone(), expr)]);
            Built {
                node,
                key: built.key,
                value,
            }
        }
        Shape::Sort(input) => {
            let built = build(builder, input);
            Built {
                node: builder.other("Sort", vec![built.node]),
                ..built
            }
        }
        Shape::Join {
            left,
            right,
            value_from_right,
        } => {
            let left = build(builder, left);
            let right = build(builder, right);
            let on = Expr::call(
                functions::EQ,
                vec![Expr::column(&left.key), Expr::column(&right.key)],
                DataType::Bool,
            );
            let value = if *value_from_right {
                right.value.clone()
            } else {
                left.value.clone()
            };
            let node = builder.join(left.node, right.node, JoinType::Inner, Some(on), None);
            Built {
                node,
                key: left.key,
                value,
            }
        }
        Shape::Union(left, right) => {
            let left = build(builder, left);
            let right = build(builder, right);
            let (node, outputs) = builder.union_of(
                vec![left.node, right.node],
                vec![
                    vec![left.key.clone(), left.value.clone()],
                    vec![right.key.clone(), right.value.clone()],
                ],
            );
            Built {
                node,
                key: outputs[0].clone(),
                value: outputs[1].clone(),
            }
        }
    }
}

/// `SELECT key, agg(value) FROM <shape> GROUP BY key`.
pub fn build_plan(shape: &Shape, kind: AggregateKind) -> PlanNode {
    let mut builder = PlanBuilder::new();
    let built = build(&mut builder, shape);
    let output = builder.column("agg", DataType::Int64);
    let mut aggregations = IndexMap::new();
    aggregations.insert(output, kind.call(&built.value));
    builder.aggregate(built.node, vec![built.key], aggregations)
}
