//! Panel pipeline: layout entries → tidy tables + trend verdicts.
//!
//! A panel whose primary file cannot be loaded stays in the output at its
//! original index, marked unavailable, so the UI can still address it. It
//! never stops the other panels from building.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::{PanelConfig, TrendAnalysis, DEFAULT_TREND_ALPHA, DEFAULT_TREND_WINDOWS};
use crate::data::cache::TableCache;
use crate::data::MeasurementSeries;
use crate::logging::{log, log_panel_unavailable, obj, v_str, Domain, Level, ProfileScope};
use crate::trend::{classify_trend_with_alpha, TrendClass, TrendResult};

pub const ALL_PATHOGENS: &str = "all pathogens";

/// Window label given to precomputed verdicts from the layout.
pub const ANALYSIS_WINDOW_LABEL: &str = "analysis";

#[derive(Debug, Clone, Serialize)]
pub struct PanelData {
    pub series: Arc<MeasurementSeries>,
    pub trend_by_window: Vec<TrendResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PanelStatus {
    Available(PanelData),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelEntry {
    pub index: usize,
    pub config: PanelConfig,
    pub status: PanelStatus,
    /// Upstream verdict from the layout's `analysis` block, if any.
    pub precomputed: Option<TrendResult>,
}

impl PanelEntry {
    pub fn data(&self) -> Option<&PanelData> {
        match &self.status {
            PanelStatus::Available(data) => Some(data),
            PanelStatus::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.data().is_some()
    }

    pub fn matches_pathogen(&self, filter: Option<&str>) -> bool {
        match filter.map(str::trim) {
            None | Some("") | Some(ALL_PATHOGENS) => true,
            Some(p) => self.config.pathogen == p,
        }
    }
}

/// Output of one pipeline run, in layout order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PanelSet {
    pub panels: Vec<PanelEntry>,
}

impl PanelSet {
    pub fn get(&self, index: usize) -> Option<&PanelEntry> {
        self.panels.get(index)
    }

    pub fn available(&self) -> impl Iterator<Item = &PanelEntry> {
        self.panels.iter().filter(|p| p.is_available())
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &PanelEntry> {
        self.panels.iter().filter(|p| !p.is_available())
    }

    /// "all pathogens" first, then each pathogen with an available panel.
    pub fn pathogen_options(&self) -> Vec<String> {
        let mut options = vec![ALL_PATHOGENS.to_string()];
        for entry in self.available() {
            if !options.contains(&entry.config.pathogen) {
                options.push(entry.config.pathogen.clone());
            }
        }
        options
    }

    /// Available panels shown under the given pathogen selection.
    pub fn visible<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a PanelEntry> + 'a {
        self.available().filter(move |p| p.matches_pathogen(filter))
    }
}

/// Turn an upstream `analysis` block into a result. Unknown verdict strings
/// are reported as errors rather than guessed at.
pub fn precomputed_trend(analysis: &TrendAnalysis) -> TrendResult {
    let classification = TrendClass::parse(&analysis.trend).unwrap_or_else(|| {
        log(
            Level::Warn,
            Domain::Panel,
            "unknown_trend_label",
            obj(&[("label", v_str(&analysis.trend))]),
        );
        TrendClass::Error
    });
    let known = classification != TrendClass::Error;
    TrendResult {
        window_label: ANALYSIS_WINDOW_LABEL.to_string(),
        window_weeks: 0,
        classification,
        p_value: analysis.p_value.filter(|_| known),
        tau: analysis.tau.filter(|_| known),
        z: None,
        slope: None,
        n: 0,
    }
}

#[derive(Debug)]
pub struct PanelPipeline {
    windows: Vec<u32>,
    alpha: f64,
    cache: TableCache,
}

impl Default for PanelPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_TREND_WINDOWS.to_vec(), DEFAULT_TREND_ALPHA)
    }
}

impl PanelPipeline {
    pub fn new(windows: Vec<u32>, alpha: f64) -> Self {
        Self {
            windows,
            alpha,
            cache: TableCache::new(),
        }
    }

    pub fn windows(&self) -> &[u32] {
        &self.windows
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn build_one(&self, index: usize, config: &PanelConfig) -> PanelEntry {
        let precomputed = config.analysis.as_ref().map(precomputed_trend);
        let loaded = self
            .cache
            .get_or_load(&config.primary_file_path, config.uncertainty_file_path.as_deref());

        let status = match loaded {
            Ok(series) => {
                let trend_by_window = self
                    .windows
                    .iter()
                    .map(|w| classify_trend_with_alpha(&series, *w, self.alpha))
                    .collect();
                PanelStatus::Available(PanelData {
                    series,
                    trend_by_window,
                })
            }
            Err(err) => {
                log_panel_unavailable(
                    index,
                    &config.title,
                    &config.primary_file_path.display().to_string(),
                    &err.to_string(),
                );
                PanelStatus::Unavailable {
                    reason: err.to_string(),
                }
            }
        };

        PanelEntry {
            index,
            config: config.clone(),
            status,
            precomputed,
        }
    }

    pub fn build(&self, configs: &[PanelConfig]) -> PanelSet {
        let _scope = ProfileScope::with_context("build_panels", &[("panels", json!(configs.len()))]);
        let panels: Vec<PanelEntry> = configs
            .iter()
            .enumerate()
            .map(|(i, cfg)| self.build_one(i, cfg))
            .collect();
        let set = PanelSet { panels };
        log(
            Level::Info,
            Domain::Panel,
            "panels_built",
            obj(&[
                ("available", json!(set.available().count())),
                ("unavailable", json!(set.unavailable().count())),
            ]),
        );
        set
    }
}

/// Build every panel with the default windows and significance level.
pub fn build_panels(configs: &[PanelConfig]) -> PanelSet {
    PanelPipeline::default().build(configs)
}
