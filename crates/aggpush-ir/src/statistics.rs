use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::column::{ColumnId, ColumnRef, ColumnRefSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistic {
    pub distinct_values_count: f64,
    pub unknown: bool,
}

impl ColumnStatistic {
    pub fn new(distinct_values_count: f64) -> Self {
        Self {
            distinct_values_count,
            unknown: false,
        }
    }

    /// Placeholder for a column without collected statistics. It still reports
    /// one distinct value so NDV maxima stay well defined.
    pub fn unknown() -> Self {
        Self {
            distinct_values_count: 1.0,
            unknown: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedStatistic {
    pub columns: Vec<ColumnId>,
    pub distinct_values_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub output_row_count: f64,
    column_statistics: FxHashMap<ColumnId, ColumnStatistic>,
    combined_statistics: Vec<CombinedStatistic>,
}

impl Statistics {
    pub fn new(output_row_count: f64) -> Self {
        Self {
            output_row_count,
            column_statistics: FxHashMap::default(),
            combined_statistics: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(0.0)
    }

    pub fn with_column(mut self, column: &ColumnRef, distinct_values_count: f64) -> Self {
        self.add_column_statistic(column, ColumnStatistic::new(distinct_values_count));
        self
    }

    pub fn with_combined(mut self, columns: &[&ColumnRef], distinct_values_count: f64) -> Self {
        self.combined_statistics.push(CombinedStatistic {
            columns: columns.iter().map(|c| c.id).collect(),
            distinct_values_count,
        });
        self
    }

    /// Unknown statistics carry a row count of zero.
    pub fn has_row_count(&self) -> bool {
        self.output_row_count > 0.0
    }

    pub fn add_column_statistic(&mut self, column: &ColumnRef, statistic: ColumnStatistic) {
        self.column_statistics.insert(column.id, statistic);
    }

    pub fn column_statistic(&self, column: &ColumnRef) -> ColumnStatistic {
        self.column_statistics
            .get(&column.id)
            .copied()
            .unwrap_or_else(ColumnStatistic::unknown)
    }

    /// Finds the widest registered multi-column statistic whose columns are all
    /// part of `columns`. Earlier registrations win ties.
    pub fn largest_matching_combined(&self, columns: &ColumnRefSet) -> Option<(ColumnRefSet, f64)> {
        let mut best: Option<&CombinedStatistic> = None;
        for combined in &self.combined_statistics {
            let matches = combined
                .columns
                .iter()
                .all(|id| columns.iter().any(|c| c.id == *id));
            if !matches {
                continue;
            }
            if best.is_none_or(|b| combined.columns.len() > b.columns.len()) {
                best = Some(combined);
            }
        }

        best.map(|combined| {
            let subset = columns
                .iter()
                .filter(|c| combined.columns.contains(&c.id))
                .cloned()
                .collect();
            (subset, combined.distinct_values_count)
        })
    }
}
