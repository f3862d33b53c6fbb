use std::fmt;

use aggpush_common::types::{DataType, Value};
use serde::{Deserialize, Serialize};

use crate::column::{ColumnRef, ColumnRefMap, ColumnRefSet};

pub mod functions {
    pub const MAX: &str = "max";
    pub const MIN: &str = "min";
    pub const SUM: &str = "sum";
    pub const COUNT: &str = "count";
    pub const AVG: &str = "avg";
    pub const HLL_UNION: &str = "hll_union";
    pub const BITMAP_UNION: &str = "bitmap_union";
    pub const PERCENTILE_UNION: &str = "percentile_union";
    pub const IF: &str = "if";
    pub const EQ: &str = "eq";
    pub const GT: &str = "gt";
    pub const LT: &str = "lt";
    pub const AND: &str = "and";
    pub const ADD: &str = "add";
    pub const ABS: &str = "abs";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Constant { value: Value, data_type: DataType },
    Call(CallExpr),
    CaseWhen(CaseWhenExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallExpr {
    pub fn_name: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
    pub count_star: bool,
    pub return_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhenClause {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseWhenExpr {
    pub when_clauses: Vec<WhenClause>,
    pub else_result: Option<Box<Expr>>,
    pub data_type: DataType,
}

impl Expr {
    pub fn column(column: &ColumnRef) -> Self {
        Expr::Column(column.clone())
    }

    pub fn constant(value: Value, data_type: DataType) -> Self {
        Expr::Constant { value, data_type }
    }

    pub fn null(data_type: DataType) -> Self {
        Expr::Constant {
            value: Value::Null,
            data_type,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Constant {
            value: Value::Bool(value),
            data_type: DataType::Bool,
        }
    }

    pub fn int64(value: i64) -> Self {
        Expr::Constant {
            value: Value::Int64(value),
            data_type: DataType::Int64,
        }
    }

    pub fn call(fn_name: impl Into<String>, args: Vec<Expr>, return_type: DataType) -> Self {
        Expr::Call(CallExpr::new(fn_name, args, return_type))
    }

    pub fn if_then_else(condition: Expr, then_result: Expr, else_result: Expr) -> Self {
        let return_type = then_result.data_type();
        Expr::call(
            functions::IF,
            vec![condition, then_result, else_result],
            return_type,
        )
    }

    pub fn case_when(when_clauses: Vec<WhenClause>, else_result: Option<Expr>) -> Self {
        let data_type = when_clauses
            .first()
            .map(|clause| clause.result.data_type())
            .unwrap_or_default();
        Expr::CaseWhen(CaseWhenExpr {
            when_clauses,
            else_result: else_result.map(Box::new),
            data_type,
        })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column(column) => column.data_type.clone(),
            Expr::Constant { data_type, .. } => data_type.clone(),
            Expr::Call(call) => call.return_type.clone(),
            Expr::CaseWhen(case) => case.data_type.clone(),
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn is_column_ref(&self) -> bool {
        matches!(self, Expr::Column(_))
    }

    /// A column is never constant; calls and CASE expressions are constant when
    /// every child is.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Column(_) => false,
            Expr::Constant { .. } => true,
            Expr::Call(call) => call.is_constant(),
            Expr::CaseWhen(case) => case.children().all(Expr::is_constant),
        }
    }

    pub fn is_constant_null(&self) -> bool {
        matches!(
            self,
            Expr::Constant {
                value: Value::Null,
                ..
            }
        )
    }

    pub fn used_columns(&self) -> ColumnRefSet {
        let mut columns = ColumnRefSet::new();
        self.collect_used_columns_into(&mut columns);
        columns
    }

    pub fn collect_used_columns_into(&self, columns: &mut ColumnRefSet) {
        match self {
            Expr::Column(column) => {
                columns.insert(column.clone());
            }
            Expr::Constant { .. } => {}
            Expr::Call(call) => {
                for arg in &call.args {
                    arg.collect_used_columns_into(columns);
                }
            }
            Expr::CaseWhen(case) => {
                for child in case.children() {
                    child.collect_used_columns_into(columns);
                }
            }
        }
    }

    /// Replaces every column found in `map` by its mapped expression. Columns
    /// absent from the map are kept as they are.
    pub fn substitute(&self, map: &ColumnRefMap) -> Expr {
        match self {
            Expr::Column(column) => map.get(column).cloned().unwrap_or_else(|| self.clone()),
            Expr::Constant { .. } => self.clone(),
            Expr::Call(call) => Expr::Call(call.substitute(map)),
            Expr::CaseWhen(case) => Expr::CaseWhen(CaseWhenExpr {
                when_clauses: case
                    .when_clauses
                    .iter()
                    .map(|clause| WhenClause {
                        condition: clause.condition.substitute(map),
                        result: clause.result.substitute(map),
                    })
                    .collect(),
                else_result: case
                    .else_result
                    .as_ref()
                    .map(|e| Box::new(e.substitute(map))),
                data_type: case.data_type.clone(),
            }),
        }
    }
}

impl CallExpr {
    pub fn new(fn_name: impl Into<String>, args: Vec<Expr>, return_type: DataType) -> Self {
        Self {
            fn_name: fn_name.into(),
            args,
            distinct: false,
            count_star: false,
            return_type,
        }
    }

    pub fn count_star() -> Self {
        Self {
            fn_name: functions::COUNT.to_string(),
            args: Vec::new(),
            distinct: false,
            count_star: true,
            return_type: DataType::Int64,
        }
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.fn_name.eq_ignore_ascii_case(name)
    }

    pub fn is_if(&self) -> bool {
        self.is_function(functions::IF) && self.args.len() == 3
    }

    pub fn is_constant(&self) -> bool {
        self.args.iter().all(Expr::is_constant)
    }

    pub fn used_columns(&self) -> ColumnRefSet {
        let mut columns = ColumnRefSet::new();
        for arg in &self.args {
            arg.collect_used_columns_into(&mut columns);
        }
        columns
    }

    pub fn substitute(&self, map: &ColumnRefMap) -> CallExpr {
        CallExpr {
            fn_name: self.fn_name.clone(),
            args: self.args.iter().map(|arg| arg.substitute(map)).collect(),
            distinct: self.distinct,
            count_star: self.count_star,
            return_type: self.return_type.clone(),
        }
    }
}

impl CaseWhenExpr {
    pub fn children(&self) -> impl Iterator<Item = &Expr> {
        self.when_clauses
            .iter()
            .flat_map(|clause| [&clause.condition, &clause.result])
            .chain(self.else_result.as_deref())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(column) => write!(f, "{}", column),
            Expr::Constant { value, .. } => write!(f, "{}", value),
            Expr::Call(call) => write!(f, "{}", call),
            Expr::CaseWhen(case) => {
                write!(f, "CASE")?;
                for clause in &case.when_clauses {
                    write!(f, " WHEN {} THEN {}", clause.condition, clause.result)?;
                }
                if let Some(else_result) = &case.else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                write!(f, " END")
            }
        }
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count_star {
            return write!(f, "{}(*)", self.fn_name);
        }
        write!(f, "{}(", self.fn_name)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}
