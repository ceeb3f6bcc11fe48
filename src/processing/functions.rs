use std::collections::BTreeMap;

use thiserror::Error;

/// A parameter is outside its valid domain. The contract is that no column
/// is added or mutated when this is returned; callers surface the failure
/// and leave the model untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionDomainError {
    #[error("window size {got} out of range 1..={max}")]
    WindowOutOfRange { got: i64, max: usize },
    #[error("unknown value for parameter {key}: {value}")]
    UnknownChoice { key: String, value: String },
}

/// Time scale of a derivative/integral, applied to timestamp deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 5] = [
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "Milliseconds",
            TimeUnit::Seconds => "Seconds",
            TimeUnit::Minutes => "Minutes",
            TimeUnit::Hours => "Hours",
            TimeUnit::Days => "Days",
        }
    }

    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 0.001,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }

    fn from_label(label: &str) -> Option<TimeUnit> {
        Self::ALL.into_iter().find(|u| u.label() == label)
    }
}

/// Typed schema of one transform parameter, rendered by the add-function
/// dialog.
#[derive(Debug, Clone, Copy)]
pub enum ParamSpec {
    Int {
        key: &'static str,
        min: i64,
        max: i64,
        default: i64,
    },
    Choice {
        key: &'static str,
        values: &'static [&'static str],
        default: usize,
    },
}

impl ParamSpec {
    pub fn key(&self) -> &'static str {
        match self {
            ParamSpec::Int { key, .. } | ParamSpec::Choice { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Choice(String),
}

/// Collected parameter values keyed by schema key.
#[derive(Debug, Clone, Default)]
pub struct ParamValues(BTreeMap<String, ParamValue>);

impl ParamValues {
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), ParamValue::Int(value));
    }

    pub fn set_choice(&mut self, key: &str, value: &str) {
        self.0
            .insert(key.to_string(), ParamValue::Choice(value.to_string()));
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn choice(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Choice(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Input series handed to a transform: values plus the optional
/// chronological axis in epoch seconds.
#[derive(Debug, Clone, Copy)]
pub struct SourceSeries<'a> {
    pub values: &'a [f64],
    pub timestamp: Option<&'a [f64]>,
}

impl SourceSeries<'_> {
    /// Sample delta at `i` (\>=1) in the given unit: the timestamp
    /// difference when a chronological axis exists, otherwise one row step.
    fn delta(&self, i: usize, unit: TimeUnit) -> f64 {
        match self.timestamp {
            Some(t) => (t[i] - t[i - 1]) / unit.seconds(),
            None => 1.0,
        }
    }
}

/// A pure named transform deriving a new column from an existing one.
pub trait SeriesFunction: Sync {
    fn name(&self) -> &'static str;
    fn parameters(&self) -> &'static [ParamSpec];
    fn apply(
        &self,
        input: SourceSeries<'_>,
        params: &ParamValues,
    ) -> Result<Vec<f64>, FunctionDomainError>;
}

const TIME_SCALE_KEY: &str = "Time scale";
const WINDOW_KEY: &str = "Window size";
const UNIT_LABELS: [&str; 5] = ["Milliseconds", "Seconds", "Minutes", "Hours", "Days"];

fn unit_param(params: &ParamValues) -> Result<TimeUnit, FunctionDomainError> {
    match params.choice(TIME_SCALE_KEY) {
        None => Ok(TimeUnit::Minutes),
        Some(label) => TimeUnit::from_label(label).ok_or_else(|| {
            FunctionDomainError::UnknownChoice {
                key: TIME_SCALE_KEY.to_string(),
                value: label.to_string(),
            }
        }),
    }
}

/// Finite difference of consecutive samples over the time delta. The first
/// sample has no predecessor and is zero by convention.
pub struct Derivative;

impl SeriesFunction for Derivative {
    fn name(&self) -> &'static str {
        "Derivative"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec::Choice {
            key: TIME_SCALE_KEY,
            values: &UNIT_LABELS,
            default: 2,
        }]
    }

    fn apply(
        &self,
        input: SourceSeries<'_>,
        params: &ParamValues,
    ) -> Result<Vec<f64>, FunctionDomainError> {
        let unit = unit_param(params)?;
        let v = input.values;
        let mut out = Vec::with_capacity(v.len());
        if !v.is_empty() {
            out.push(0.0);
        }
        for i in 1..v.len() {
            out.push((v[i] - v[i - 1]) / input.delta(i, unit));
        }
        Ok(out)
    }
}

/// Trapezoidal running accumulation, starting from zero.
pub struct Integral;

impl SeriesFunction for Integral {
    fn name(&self) -> &'static str {
        "Integral"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec::Choice {
            key: TIME_SCALE_KEY,
            values: &UNIT_LABELS,
            default: 2,
        }]
    }

    fn apply(
        &self,
        input: SourceSeries<'_>,
        params: &ParamValues,
    ) -> Result<Vec<f64>, FunctionDomainError> {
        let unit = unit_param(params)?;
        let v = input.values;
        let mut out = Vec::with_capacity(v.len());
        let mut acc = 0.0;
        if !v.is_empty() {
            out.push(acc);
        }
        for i in 1..v.len() {
            acc += 0.5 * (v[i] + v[i - 1]) * input.delta(i, unit);
            out.push(acc);
        }
        Ok(out)
    }
}

/// Causal running mean over a trailing window of `w` samples. Windows
/// outside `1..=len` are a domain error with no partial result.
pub struct MovingAverage;

impl SeriesFunction for MovingAverage {
    fn name(&self) -> &'static str {
        "Moving average"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec::Int {
            key: WINDOW_KEY,
            min: 1,
            max: i64::MAX,
            default: 1,
        }]
    }

    fn apply(
        &self,
        input: SourceSeries<'_>,
        params: &ParamValues,
    ) -> Result<Vec<f64>, FunctionDomainError> {
        let v = input.values;
        let w = params.int(WINDOW_KEY).unwrap_or(1);
        if w < 1 || w as usize > v.len() {
            return Err(FunctionDomainError::WindowOutOfRange {
                got: w,
                max: v.len(),
            });
        }
        let w = w as usize;

        let mut out = Vec::with_capacity(v.len());
        let mut sum = 0.0;
        for i in 0..v.len() {
            sum += v[i];
            if i >= w {
                sum -= v[i - w];
            }
            let len = (i + 1).min(w) as f64;
            out.push(sum / len);
        }
        Ok(out)
    }
}

// Explicit transform registry, looked up by exact name.
static REGISTRY: [&(dyn SeriesFunction); 3] = [&Derivative, &Integral, &MovingAverage];

pub fn registry() -> &'static [&'static dyn SeriesFunction] {
    &REGISTRY
}

pub fn by_name(name: &str) -> Option<&'static dyn SeriesFunction> {
    registry().iter().find(|f| f.name() == name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(params: &mut ParamValues) {
        params.set_choice(TIME_SCALE_KEY, "Minutes");
    }

    #[test]
    fn derivative_without_timestamp_uses_unit_row_steps() {
        let input = SourceSeries {
            values: &[1.0, 3.0, 6.0],
            timestamp: None,
        };
        let mut params = ParamValues::default();
        minutes(&mut params);
        let out = Derivative.apply(input, &params).unwrap();
        assert_eq!(out, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn derivative_scales_timestamp_deltas_to_the_chosen_unit() {
        // Samples 30 seconds apart, slope of 1 per sample.
        let t = [0.0, 30.0, 60.0];
        let input = SourceSeries {
            values: &[0.0, 1.0, 2.0],
            timestamp: Some(&t),
        };
        let mut params = ParamValues::default();
        minutes(&mut params);
        let out = Derivative.apply(input, &params).unwrap();
        assert_eq!(out, vec![0.0, 2.0, 2.0]); // 1 per 0.5 min
    }

    #[test]
    fn integral_accumulates_trapezoids_from_zero() {
        let input = SourceSeries {
            values: &[0.0, 2.0, 2.0],
            timestamp: None,
        };
        let out = Integral.apply(input, &ParamValues::default()).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn moving_average_is_the_exact_trailing_window_mean() {
        let input = SourceSeries {
            values: &[2.0, 4.0, 6.0, 8.0],
            timestamp: None,
        };
        let mut params = ParamValues::default();
        params.set_int(WINDOW_KEY, 2);
        let out = MovingAverage.apply(input, &params).unwrap();
        assert_eq!(out, vec![2.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn moving_average_rejects_out_of_domain_windows() {
        let input = SourceSeries {
            values: &[1.0, 2.0, 3.0],
            timestamp: None,
        };
        for w in [0i64, 4] {
            let mut params = ParamValues::default();
            params.set_int(WINDOW_KEY, w);
            let err = MovingAverage.apply(input, &params).unwrap_err();
            assert_eq!(
                err,
                FunctionDomainError::WindowOutOfRange { got: w, max: 3 }
            );
        }
    }

    #[test]
    fn registry_resolves_transforms_by_name() {
        assert!(by_name("Derivative").is_some());
        assert!(by_name("Integral").is_some());
        assert!(by_name("Moving average").is_some());
        assert!(by_name("FFT").is_none());
    }
}
