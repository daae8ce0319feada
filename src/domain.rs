use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Time point label taken from a `{tp}.r1` / `{tp}.r2` column name.
pub type TimePoint = u32;

pub const DEFAULT_SAMPLES: [&str; 4] = ["T25LD", "T18DD", "T25DD", "T29DD"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SampleName(String);

impl SampleName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleName {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        // Sample names become store directory names.
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(KiraError::InvalidSampleName(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for SampleName {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SampleName> for String {
    fn from(value: SampleName) -> Self {
        value.0
    }
}

/// Replicate values for one time point.
///
/// Missing replicates are stored as `0.0`, but `mean` is only present when
/// both raw replicates were. Callers averaging `r1`/`r2` themselves will
/// disagree with `mean` for such points; the stored shape is kept as is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub r1: f64,
    pub r2: f64,
    pub mean: Option<f64>,
}

impl Measurement {
    pub fn from_raw(r1: Option<f64>, r2: Option<f64>) -> Self {
        let mean = match (r1, r2) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            _ => None,
        };
        Self {
            r1: r1.unwrap_or(0.0),
            r2: r2.unwrap_or(0.0),
            mean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneTimeSeries {
    pub gene_id: String,
    pub points: BTreeMap<TimePoint, Measurement>,
}

impl GeneTimeSeries {
    pub fn new(gene_id: impl Into<String>) -> Self {
        Self {
            gene_id: gene_id.into(),
            points: BTreeMap::new(),
        }
    }

    /// Time points in ascending order.
    pub fn time_points(&self) -> Vec<TimePoint> {
        self.points.keys().copied().collect()
    }
}
