//! Trailing-window trend classification.
//!
//! Uses the original Mann-Kendall test: S is the sum of sign(x[j] - x[i]) over
//! all pairs i < j, its variance carries the standard tie correction, and
//! the continuity-corrected z score is compared against a two-sided normal
//! critical value. Values are taken in (category name, date) order, so a
//! panel's fractions are concatenated alphabetically whatever their column
//! order in the source file. Ties are exact `f64` equality, so the result is fully
//! deterministic for a given input.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DEFAULT_TREND_ALPHA;
use crate::data::MeasurementSeries;
use crate::error::TrendComputationError;
use crate::logging::log_trend_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendClass {
    Increasing,
    Decreasing,
    Stable,
    Error,
}

impl TrendClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendClass::Increasing => "increasing",
            TrendClass::Decreasing => "decreasing",
            TrendClass::Stable => "stable",
            TrendClass::Error => "error",
        }
    }

    /// Capitalised label for badges.
    pub fn display_label(&self) -> &'static str {
        match self {
            TrendClass::Increasing => "Increasing",
            TrendClass::Decreasing => "Decreasing",
            TrendClass::Stable => "Stable",
            TrendClass::Error => "Error",
        }
    }

    /// Bootstrap badge colour. Rising concentrations are bad news.
    pub fn badge_color(&self) -> &'static str {
        match self {
            TrendClass::Increasing => "danger",
            TrendClass::Decreasing => "success",
            TrendClass::Stable => "warning",
            TrendClass::Error => "secondary",
        }
    }

    /// Map an externally supplied verdict onto the vocabulary. Exact match
    /// only; `no trend` is accepted as a synonym for stable.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "increasing" => Some(TrendClass::Increasing),
            "decreasing" => Some(TrendClass::Decreasing),
            "stable" | "no trend" => Some(TrendClass::Stable),
            "error" => Some(TrendClass::Error),
            _ => None,
        }
    }
}

impl fmt::Display for TrendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub window_label: String,
    /// Zero for results that did not come from a trailing window.
    pub window_weeks: u32,
    pub classification: TrendClass,
    pub p_value: Option<f64>,
    pub tau: Option<f64>,
    pub z: Option<f64>,
    /// Sen's slope, in value units per observation step.
    pub slope: Option<f64>,
    pub n: usize,
}

impl TrendResult {
    pub fn error(window_weeks: u32, n: usize) -> Self {
        Self {
            window_label: window_label(window_weeks),
            window_weeks,
            classification: TrendClass::Error,
            p_value: None,
            tau: None,
            z: None,
            slope: None,
            n,
        }
    }

    pub fn short_label(&self) -> String {
        if self.window_weeks == 0 {
            self.window_label.clone()
        } else {
            short_window_label(self.window_weeks)
        }
    }
}

/// Human label: 4 → "1 month", 26 → "6 months", 52 → "1 year".
pub fn window_label(weeks: u32) -> String {
    if weeks > 0 && weeks % 52 == 0 {
        return plural(weeks / 52, "year");
    }
    match weeks_to_months(weeks) {
        Some(m) => plural(m, "month"),
        None => plural(weeks, "week"),
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Badge prefix: 4 → "1M", 26 → "6M", 52 → "1Y", 3 → "3W".
pub fn short_window_label(weeks: u32) -> String {
    if weeks > 0 && weeks % 52 == 0 {
        return format!("{}Y", weeks / 52);
    }
    match weeks_to_months(weeks) {
        Some(m) => format!("{}M", m),
        None => format!("{}W", weeks),
    }
}

// 4 weeks is a month, 13 a quarter, 26 half a year.
fn weeks_to_months(weeks: u32) -> Option<u32> {
    match weeks {
        w if w % 13 == 0 && w > 0 => Some(w / 13 * 3),
        w if w % 4 == 0 && w > 0 && w < 13 => Some(w / 4),
        _ => None,
    }
}

/// Full Mann-Kendall statistics for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MannKendall {
    pub n: usize,
    pub s: f64,
    pub var_s: f64,
    pub z: f64,
    pub p: f64,
    pub tau: f64,
    pub slope: f64,
    pub trend: TrendClass,
}

pub fn mann_kendall(values: &[f64], alpha: f64) -> Result<MannKendall, TrendComputationError> {
    let n = values.len();
    if n < 2 {
        return Err(TrendComputationError::InsufficientData { n });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TrendComputationError::NonFinite);
    }

    let mut s = 0.0;
    for i in 0..n - 1 {
        for j in i + 1..n {
            s += sign(values[j] - values[i]);
        }
    }

    let var_s = variance_s(values);
    let z = if s > 0.0 {
        (s - 1.0) / var_s.sqrt()
    } else if s < 0.0 {
        (s + 1.0) / var_s.sqrt()
    } else {
        0.0
    };
    let p = 2.0 * (1.0 - normal_cdf(z.abs()));
    let nf = n as f64;
    let tau = s / (0.5 * nf * (nf - 1.0));

    // |z| > z(1 - alpha/2) is the same test as p < alpha.
    let trend = if p < alpha && z > 0.0 {
        TrendClass::Increasing
    } else if p < alpha && z < 0.0 {
        TrendClass::Decreasing
    } else {
        TrendClass::Stable
    };

    Ok(MannKendall {
        n,
        s,
        var_s,
        z,
        p,
        tau,
        slope: sens_slope(values),
        trend,
    })
}

fn sign(d: f64) -> f64 {
    if d > 0.0 {
        1.0
    } else if d < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Var(S) with the correction for tied groups.
fn variance_s(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut tie_term = 0.0;
    let mut run = 1usize;
    for i in 1..=sorted.len() {
        if i < sorted.len() && sorted[i] == sorted[i - 1] {
            run += 1;
            continue;
        }
        if run > 1 {
            let t = run as f64;
            tie_term += t * (t - 1.0) * (2.0 * t + 5.0);
        }
        run = 1;
    }
    (n * (n - 1.0) * (2.0 * n + 5.0) - tie_term) / 18.0
}

/// Median of pairwise slopes (x[j] - x[i]) / (j - i).
pub fn sens_slope(values: &[f64]) -> f64 {
    let n = values.len();
    let mut slopes = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            slopes.push((values[j] - values[i]) / (j - i) as f64);
        }
    }
    if slopes.is_empty() {
        return 0.0;
    }
    slopes.sort_by(|a, b| a.total_cmp(b));
    let mid = slopes.len() / 2;
    if slopes.len() % 2 == 0 {
        (slopes[mid - 1] + slopes[mid]) / 2.0
    } else {
        slopes[mid]
    }
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let coeff_p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + coeff_p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

pub fn classify_trend(series: &MeasurementSeries, window_weeks: u32) -> TrendResult {
    classify_trend_with_alpha(series, window_weeks, DEFAULT_TREND_ALPHA)
}

/// Classify the trailing `window_weeks` of `series`. Never fails: problems
/// come back as `TrendClass::Error` with no p-value or tau.
pub fn classify_trend_with_alpha(
    series: &MeasurementSeries,
    window_weeks: u32,
    alpha: f64,
) -> TrendResult {
    let values: Vec<f64> = series
        .trailing_window(window_weeks)
        .iter()
        .map(|r| r.value)
        .collect();

    match mann_kendall(&values, alpha) {
        Ok(mk) => TrendResult {
            window_label: window_label(window_weeks),
            window_weeks,
            classification: mk.trend,
            p_value: Some(mk.p),
            tau: Some(mk.tau),
            z: Some(mk.z),
            slope: Some(mk.slope),
            n: mk.n,
        },
        Err(err) => {
            log_trend_error(window_weeks, &err.to_string());
            TrendResult::error(window_weeks, values.len())
        }
    }
}
