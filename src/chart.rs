//! View models handed to the UI layer: line-chart figures and trend cards.
//!
//! Nothing here renders; the structs serialise to JSON that a plotting front
//! end can draw directly.

use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;

use crate::config::PanelConfig;
use crate::data::dates::iso;
use crate::data::MeasurementSeries;
use crate::panel::{PanelEntry, PanelStatus};
use crate::trend::{short_window_label, TrendClass, TrendResult};

const CHART_HEIGHT: u32 = 700;
const ERROR_BAR_COLOR: &str = "#AAAAAA";
const NO_DATA: &str = "No Data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_y: Option<Vec<f64>>,
    pub mode: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeButton {
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub step: &'static str,
    pub stepmode: &'static str,
}

impl RangeButton {
    fn new(label: &'static str, count: Option<u32>, step: &'static str, stepmode: &'static str) -> Self {
        Self { label, count, step, stepmode }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLayout {
    pub title: String,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub legend_title: String,
    /// Whole data span padded by a week either side.
    pub x_range: Option<[String; 2]>,
    /// Initially visible span: the trailing year of `x_range`.
    pub default_range: Option<[String; 2]>,
    pub range_buttons: Vec<RangeButton>,
    pub range_slider: bool,
    pub hovermode: &'static str,
    pub height: u32,
    pub template: &'static str,
    pub error_bar_color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub panel: usize,
    pub traces: Vec<Trace>,
    pub layout: ChartLayout,
}

fn range_buttons() -> Vec<RangeButton> {
    vec![
        RangeButton::new("1M", Some(1), "month", "backward"),
        RangeButton::new("6M", Some(6), "month", "backward"),
        RangeButton::new("YTD", Some(1), "year", "todate"),
        RangeButton::new("1Y", Some(1), "year", "backward"),
        RangeButton::new("ALL", None, "all", "backward"),
    ]
}

fn padded_range(min: NaiveDate, max: NaiveDate) -> ([String; 2], [String; 2]) {
    let lo = min - Duration::weeks(1);
    let hi = max + Duration::weeks(1);
    let year_back = hi.checked_sub_months(Months::new(12)).unwrap_or(lo);
    ([iso(lo), iso(hi)], [iso(year_back), iso(hi)])
}

/// One trace per category, restricted to `selected` (empty = all).
pub fn build_chart(index: usize, config: &PanelConfig, series: &MeasurementSeries, selected: &[String]) -> ChartSpec {
    let series = series.select_categories(selected);
    let traces = series
        .categories
        .iter()
        .map(|category| {
            let records: Vec<_> = series.category_records(category).collect();
            Trace {
                name: category.clone(),
                x: records.iter().map(|r| iso(r.date)).collect(),
                y: records.iter().map(|r| r.value).collect(),
                error_y: series.has_uncertainty.then(|| {
                    records
                        .iter()
                        .map(|r| r.value_uncertainty.unwrap_or(0.0))
                        .collect()
                }),
                mode: "markers+lines",
            }
        })
        .collect();

    let ranges = match (series.min_date(), series.max_date()) {
        (Some(min), Some(max)) => Some(padded_range(min, max)),
        _ => None,
    };

    ChartSpec {
        panel: index,
        traces,
        layout: ChartLayout {
            title: config.chart_title().to_string(),
            x_axis_title: config.x_axis_label.clone(),
            y_axis_title: config.y_axis_label.clone(),
            legend_title: config.category_label().to_string(),
            x_range: ranges.as_ref().map(|(full, _)| full.clone()),
            default_range: ranges.map(|(_, view)| view),
            range_buttons: range_buttons(),
            range_slider: true,
            hovermode: "x unified",
            height: CHART_HEIGHT,
            template: "ggplot2",
            error_bar_color: ERROR_BAR_COLOR,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Badge {
    pub text: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendCard {
    pub panel: usize,
    pub pathogen: String,
    pub title: String,
    pub badges: Vec<Badge>,
    pub summary: Option<String>,
    /// True when the layout supplies an analysis figure or description.
    pub has_details: bool,
}

fn badge(result: &TrendResult) -> Badge {
    Badge {
        text: format!("{}: {}", result.short_label(), result.classification.display_label()),
        color: result.classification.badge_color(),
    }
}

/// Three significant digits, switching to exponent form for tiny values.
pub fn sig3(x: f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{}", x);
    }
    let scientific = format!("{:.2e}", x);
    // Take the magnitude after rounding so 0.9996 reads 1.00, not 1.000.
    let rounded: f64 = scientific.parse().unwrap_or(x);
    let magnitude = rounded.abs().log10().floor() as i32;
    if magnitude < -4 {
        return scientific;
    }
    let decimals = (2 - magnitude).max(0) as usize;
    format!("{:.*}", decimals, rounded)
}

fn summary(title: &str, result: &TrendResult, alpha: f64) -> String {
    match (result.classification, result.p_value, result.tau) {
        (TrendClass::Error, _, _) | (_, None, _) | (_, _, None) => format!(
            "Not enough {} data in the last {} for a Mann-Kendall trend test.",
            title, result.window_label
        ),
        (_, Some(p), Some(tau)) => format!(
            "Using the Mann-Kendall trend test on the last {} of {} data, with a significance level of {}, the p-value is {} and Kendall's tau is {}.",
            result.window_label,
            title,
            alpha,
            sig3(p),
            sig3(tau)
        ),
    }
}

/// Sidebar card for a panel: badges longest window first, then the summary
/// sentence for the shortest window.
pub fn trend_card(entry: &PanelEntry, windows: &[u32], alpha: f64) -> TrendCard {
    let mut ordered: Vec<u32> = windows.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    let (badges, summary) = match &entry.status {
        PanelStatus::Available(data) => {
            let mut results: Vec<&TrendResult> = data.trend_by_window.iter().collect();
            results.sort_by(|a, b| b.window_weeks.cmp(&a.window_weeks));
            let shortest = data.trend_by_window.iter().min_by_key(|r| r.window_weeks);
            (
                results.into_iter().map(badge).collect(),
                shortest.map(|r| summary(&entry.config.title, r, alpha)),
            )
        }
        PanelStatus::Unavailable { .. } => (
            ordered
                .iter()
                .map(|w| Badge {
                    text: format!("{}: {}", short_window_label(*w), NO_DATA),
                    color: TrendClass::Error.badge_color(),
                })
                .collect(),
            None,
        ),
    };

    let mut badges: Vec<Badge> = badges;
    if let Some(pre) = &entry.precomputed {
        badges.push(badge(pre));
    }

    TrendCard {
        panel: entry.index,
        pathogen: entry.config.pathogen.clone(),
        title: entry.config.title.clone(),
        badges,
        summary,
        has_details: entry
            .config
            .analysis
            .as_ref()
            .is_some_and(|a| a.figure.is_some() || a.description.is_some()),
    }
}
