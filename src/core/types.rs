use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_COUNT: u32 = 100;
pub const DEFAULT_HORIZON_MONTHS: u32 = 12;
pub const DEFAULT_LOW_PERCENTILE: f64 = 25.0;
pub const DEFAULT_HIGH_PERCENTILE: f64 = 75.0;

/// Upper bounds on a single run; a run holds `samples * horizon * 2` floats.
pub const MAX_SAMPLE_COUNT: u32 = 100_000;
pub const MAX_HORIZON_MONTHS: u32 = 1_200;

/// Knobs for the bootstrap projection.
///
/// The defaults reproduce the reporting view: 100 synthetic years of 12 months,
/// with the bands taken at the 25th and 75th ranked outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionConfig {
    pub sample_count: u32,
    pub horizon_months: u32,
    pub low_percentile: f64,
    pub high_percentile: f64,
    /// `None` seeds from the system clock.
    pub seed: Option<u64>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_SAMPLE_COUNT,
            horizon_months: DEFAULT_HORIZON_MONTHS,
            low_percentile: DEFAULT_LOW_PERCENTILE,
            high_percentile: DEFAULT_HIGH_PERCENTILE,
            seed: None,
        }
    }
}

/// One resampled future: the drawn monthly deltas and their running sum.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub deltas: Vec<f64>,
    pub cumulative: Vec<f64>,
}

impl Trajectory {
    pub fn final_value(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionBands {
    pub low_band: Vec<f64>,
    pub high_band: Vec<f64>,
    pub low_rank: usize,
    pub high_rank: usize,
    pub sample_count: u32,
    pub seed: u64,
}

impl ProjectionBands {
    /// Shifts both bands so they continue from `base` instead of zero.
    pub fn anchored(mut self, base: f64) -> Self {
        for v in self.low_band.iter_mut().chain(self.high_band.iter_mut()) {
            *v += base;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyDelta {
    /// Calendar month as `YYYY-MM`.
    pub month: String,
    /// Net amount in minor units.
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: i64,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub payee: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionsOp {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: String,
    pub op: String,
    pub value: String,
    #[serde(default)]
    pub custom_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBalance {
    pub month: String,
    pub assets: i64,
    pub debt: i64,
}

/// A single chart row. `y` drives the line; the string fields feed the tooltip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetWorthPoint {
    pub x: String,
    pub y: f64,
    pub assets: String,
    pub debt: String,
    pub networth: String,
    pub change: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetWorthGraph {
    pub data: Vec<NetWorthPoint>,
    pub start: f64,
    pub end: f64,
    pub low: f64,
    pub high: f64,
    pub gradient_offset: f64,
}
