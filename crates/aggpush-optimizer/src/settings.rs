use std::fmt;
use std::str::FromStr;

use aggpush_common::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How aggressively aggregations are pushed down. The ordering follows the
/// session-variable encoding, so `mode >= FavorMediumCardinality` also holds
/// for `FavorHighCardinality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum PushDownAggregateMode {
    Disabled = -1,
    #[default]
    Auto = 0,
    Forced = 1,
    FavorMediumCardinality = 2,
    FavorHighCardinality = 3,
}

impl PushDownAggregateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushDownAggregateMode::Disabled => "disabled",
            PushDownAggregateMode::Auto => "auto",
            PushDownAggregateMode::Forced => "forced",
            PushDownAggregateMode::FavorMediumCardinality => "favor_medium_cardinality",
            PushDownAggregateMode::FavorHighCardinality => "favor_high_cardinality",
        }
    }
}

impl TryFrom<i64> for PushDownAggregateMode {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(PushDownAggregateMode::Disabled),
            0 => Ok(PushDownAggregateMode::Auto),
            1 => Ok(PushDownAggregateMode::Forced),
            2 => Ok(PushDownAggregateMode::FavorMediumCardinality),
            3 => Ok(PushDownAggregateMode::FavorHighCardinality),
            other => Err(Error::invalid_config(format!(
                "unknown push down aggregate mode {}",
                other
            ))),
        }
    }
}

impl FromStr for PushDownAggregateMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(value) = s.trim().parse::<i64>() {
            return Self::try_from(value);
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(PushDownAggregateMode::Disabled),
            "auto" => Ok(PushDownAggregateMode::Auto),
            "forced" => Ok(PushDownAggregateMode::Forced),
            "favor_medium_cardinality" => Ok(PushDownAggregateMode::FavorMediumCardinality),
            "favor_high_cardinality" => Ok(PushDownAggregateMode::FavorHighCardinality),
            other => Err(Error::invalid_config(format!(
                "unknown push down aggregate mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PushDownAggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds used to bucket group-by columns and to bound pushes below small
/// broadcast joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityCoefficients {
    /// `ndv * medium > rows` classifies a column as high cardinality.
    pub medium_aggregate_effect: f64,
    /// `ndv * low <= rows` classifies a column as low cardinality.
    pub low_aggregate_effect: f64,
    pub lower_aggregate_effect: f64,
    pub small_scale_rows_limit: f64,
    pub small_broadcast_join_max_ndv: f64,
    pub small_broadcast_join_max_combined_ndv: f64,
}

impl Default for CardinalityCoefficients {
    fn default() -> Self {
        Self {
            medium_aggregate_effect: 100.0,
            low_aggregate_effect: 1000.0,
            lower_aggregate_effect: 10000.0,
            small_scale_rows_limit: 10000.0,
            small_broadcast_join_max_ndv: 100_000.0,
            small_broadcast_join_max_combined_ndv: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushDownAggregateSettings {
    pub mode: PushDownAggregateMode,
    pub push_down_on_broadcast_join: bool,
    pub broadcast_row_count_limit: u64,
    pub broadcast_join_push_down_row_count_limit: u64,
    pub use_multi_column_stats: bool,
    pub coefficients: CardinalityCoefficients,
}

impl Default for PushDownAggregateSettings {
    fn default() -> Self {
        Self {
            mode: PushDownAggregateMode::Auto,
            push_down_on_broadcast_join: true,
            broadcast_row_count_limit: 15_000_000,
            broadcast_join_push_down_row_count_limit: 250_000,
            use_multi_column_stats: true,
            coefficients: CardinalityCoefficients::default(),
        }
    }
}

impl PushDownAggregateSettings {
    pub fn with_mode(mode: PushDownAggregateMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::with_mode(PushDownAggregateMode::Disabled)
    }

    pub fn forced() -> Self {
        Self::with_mode(PushDownAggregateMode::Forced)
    }

    pub fn push_down_on_broadcast_join(mut self, enabled: bool) -> Self {
        self.push_down_on_broadcast_join = enabled;
        self
    }

    pub fn use_multi_column_stats(mut self, enabled: bool) -> Self {
        self.use_multi_column_stats = enabled;
        self
    }

    pub fn broadcast_limits(mut self, broadcast_rows: u64, push_down_rows: u64) -> Self {
        self.broadcast_row_count_limit = broadcast_rows;
        self.broadcast_join_push_down_row_count_limit = push_down_rows;
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::invalid_config(e.to_string()))
    }
}
