//! Linear rescaling of integer samples, `v -> round(alpha + beta * v)`.

use std::fmt;
use std::str::FromStr;

use crate::encoded_timeseries::SampleType;
use crate::record::MSeed3Record;

/// What to do with records the transform skips: no samples, non integer samples, or no
/// sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligiblePolicy {
    /// Emit the original record bytes unchanged.
    PassThrough,
    /// Emit nothing for the record.
    Drop,
}

impl FromStr for IneligiblePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "passthrough" | "pass-through" => Ok(IneligiblePolicy::PassThrough),
            "drop" | "skip" => Ok(IneligiblePolicy::Drop),
            _ => Err(format!("unknown policy `{}`, expected pass or drop", s)),
        }
    }
}

impl fmt::Display for IneligiblePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IneligiblePolicy::PassThrough => write!(f, "pass"),
            IneligiblePolicy::Drop => write!(f, "drop"),
        }
    }
}

/// Scaling parameters, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleConfig {
    /// Additive offset.
    pub alpha: f64,
    /// Multiplicative factor.
    pub beta: f64,
    /// Replacement orientation code, `None` keeps the original.
    pub orientation: Option<char>,
    pub ineligible: IneligiblePolicy,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            alpha: 0.0,
            beta: 1.0,
            orientation: Some('T'),
            ineligible: IneligiblePolicy::PassThrough,
        }
    }
}

impl ScaleConfig {
    /// Scales one sample. Ties round to even. Results outside the `i32` range saturate
    /// at `i32::MIN` or `i32::MAX`; a NaN result becomes 0.
    pub fn rescale(&self, v: i32) -> i32 {
        (self.alpha + self.beta * f64::from(v)).round_ties_even() as i32
    }
}

impl fmt::Display for ScaleConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "alpha={} beta={}", self.alpha, self.beta)?;
        match self.orientation {
            Some(code) => write!(f, " orientation={}", code),
            None => write!(f, " orientation=<unchanged>"),
        }
    }
}

/// Rescales the samples of a decompressed record in place and overwrites its orientation
/// code. Returns `false`, leaving the record untouched, when the record has no samples, its
/// samples are not integers, or its sample rate is zero.
pub fn transform(record: &mut MSeed3Record, config: &ScaleConfig) -> bool {
    if record.header.num_samples < 1
        || record.sample_type() != SampleType::Integer
        || record.header.sample_rate_period == 0.0
    {
        return false;
    }
    let samples = match record.int_samples_mut() {
        Some(v) => v,
        None => return false,
    };

    for v in samples.iter_mut() {
        *v = config.rescale(*v);
    }
    if let Some(code) = config.orientation {
        record.identifier.set_orientation(code);
    }
    true
}
