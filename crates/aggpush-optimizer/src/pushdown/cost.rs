use aggpush_ir::{ColumnRefSet, ColumnStatistic, Statistics};
use itertools::Itertools;
use tracing::debug;

use super::context::PushDownContext;
use crate::settings::{CardinalityCoefficients, PushDownAggregateMode, PushDownAggregateSettings};

/// How much duplication a group-by column has relative to the row count.
/// `High` means pre-aggregation collapses almost nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityBucket {
    Low,
    Medium,
    High,
}

impl CardinalityBucket {
    pub fn classify(
        statistic: &ColumnStatistic,
        row_count: f64,
        coefficients: &CardinalityCoefficients,
    ) -> Self {
        if statistic.unknown {
            return CardinalityBucket::High;
        }
        let ndv = statistic.distinct_values_count;
        if row_count == 0.0 || ndv * coefficients.medium_aggregate_effect > row_count {
            CardinalityBucket::High
        } else if ndv * coefficients.low_aggregate_effect > row_count {
            CardinalityBucket::Medium
        } else {
            CardinalityBucket::Low
        }
    }
}

/// Bucketed view of a group-by column set at one candidate target.
#[derive(Debug, Clone, PartialEq)]
pub struct CardinalityProfile {
    pub row_count: f64,
    pub low_ndvs: Vec<f64>,
    pub medium: usize,
    pub high: usize,
    pub max_single_column_ndv: f64,
    pub max_multi_column_ndv: f64,
}

impl CardinalityProfile {
    /// When multi-column statistics are enabled and some registered column
    /// combination is contained in `columns`, that combination is classified as
    /// a single unit and the remaining columns are classified individually.
    pub fn build(
        columns: &ColumnRefSet,
        statistics: &Statistics,
        use_multi_column_stats: bool,
        coefficients: &CardinalityCoefficients,
    ) -> Self {
        let mut column_statistics = Vec::with_capacity(columns.len());
        let mut max_single_column_ndv: f64 = 0.0;
        let mut max_multi_column_ndv: f64 = 0.0;

        let combined = if use_multi_column_stats {
            statistics
                .largest_matching_combined(columns)
                .filter(|(subset, _)| !subset.is_empty())
        } else {
            None
        };

        let remaining: Vec<_> = match &combined {
            Some((subset, ndv)) => {
                let ndv = ndv.max(1.0);
                column_statistics.push(ColumnStatistic::new(ndv));
                max_multi_column_ndv = ndv;
                columns.iter().filter(|c| !subset.contains(c)).collect()
            }
            None => columns.iter().collect(),
        };

        for column in remaining {
            let statistic = statistics.column_statistic(column);
            max_single_column_ndv = max_single_column_ndv.max(statistic.distinct_values_count);
            column_statistics.push(statistic);
        }

        let row_count = statistics.output_row_count;
        let mut profile = Self {
            row_count,
            low_ndvs: Vec::new(),
            medium: 0,
            high: 0,
            max_single_column_ndv,
            max_multi_column_ndv,
        };
        for statistic in &column_statistics {
            match CardinalityBucket::classify(statistic, row_count, coefficients) {
                CardinalityBucket::Low => profile.low_ndvs.push(statistic.distinct_values_count),
                CardinalityBucket::Medium => profile.medium += 1,
                CardinalityBucket::High => profile.high += 1,
            }
        }
        profile
    }

    pub fn low(&self) -> usize {
        self.low_ndvs.len()
    }

    /// Product of the low-cardinality NDVs, `f64::MAX` when there are none.
    pub fn low_cartesian(&self) -> f64 {
        if self.low_ndvs.is_empty() {
            f64::MAX
        } else {
            self.low_ndvs.iter().product()
        }
    }

    pub fn low_cartesian_upper_bound(&self) -> f64 {
        let base = (self.row_count / 20.0).max(1.0);
        let exponent = (self.low() / 2).max(1);
        base.powi(exponent as i32)
    }
}

/// Decides whether pre-aggregating at a candidate target is likely to pay off.
#[derive(Debug, Clone, Copy)]
pub struct PushDownCostModel<'s> {
    settings: &'s PushDownAggregateSettings,
}

impl<'s> PushDownCostModel<'s> {
    pub fn new(settings: &'s PushDownAggregateSettings) -> Self {
        Self { settings }
    }

    pub fn check(
        &self,
        context: &PushDownContext<'_>,
        group_by_columns: &ColumnRefSet,
        statistics: &Statistics,
    ) -> bool {
        match self.settings.mode {
            PushDownAggregateMode::Forced => return true,
            PushDownAggregateMode::Disabled => return false,
            PushDownAggregateMode::Auto
            | PushDownAggregateMode::FavorMediumCardinality
            | PushDownAggregateMode::FavorHighCardinality => {}
        }

        let profile = CardinalityProfile::build(
            group_by_columns,
            statistics,
            self.settings.use_multi_column_stats,
            &self.settings.coefficients,
        );

        let accepted = self.admits(&profile, context.is_immediate_child_of_small_broadcast_join());

        debug!(
            aggregations = %context.aggregations().values().join(", "),
            group_by = %group_by_columns,
            rows = profile.row_count,
            high = profile.high,
            medium = profile.medium,
            low = profile.low(),
            cartesian = profile.low_cartesian(),
            upper_cartesian = profile.low_cartesian_upper_bound(),
            mode = %self.settings.mode,
            accepted,
            "Checked push down aggregation statistics"
        );

        accepted
    }

    pub fn admits(&self, profile: &CardinalityProfile, immediate_child_of_small_broadcast_join: bool) -> bool {
        let mode = self.settings.mode;
        let coefficients = &self.settings.coefficients;
        let low = profile.low();
        let (medium, high) = (profile.medium, profile.high);
        let rows = profile.row_count;
        let cartesian = profile.low_cartesian();

        if mode == PushDownAggregateMode::Auto && immediate_child_of_small_broadcast_join {
            if profile.max_single_column_ndv > coefficients.small_broadcast_join_max_ndv {
                return false;
            }
            if profile.max_multi_column_ndv > coefficients.small_broadcast_join_max_combined_ndv {
                return false;
            }
        }

        if high == 0 && low + medium == 1 {
            return true;
        }

        if high == 0 && medium == 0 {
            if cartesian <= rows || low <= 2 {
                return true;
            }
            if low <= 3 && cartesian < profile.low_cartesian_upper_bound() {
                return true;
            }
            return mode >= PushDownAggregateMode::FavorMediumCardinality;
        }

        if high >= 2 || medium > 2 || (high == 1 && medium > 0) {
            return false;
        }

        if high + medium == 1 && low <= 2 && cartesian <= rows / coefficients.lower_aggregate_effect {
            return true;
        }

        if high == 1 && low <= 2 {
            return mode >= PushDownAggregateMode::FavorHighCardinality;
        }

        if low <= 2 {
            if mode >= PushDownAggregateMode::FavorMediumCardinality {
                return true;
            }
            return rows >= coefficients.small_scale_rows_limit;
        }

        false
    }
}
