//! Tunable rating parameters
//!
//! The feed publishes settings as a flat list of name/value pairs. They are
//! parsed into [`FormulaParams`]; names that are not recognized are ignored.
//!
//! Recognized names: `CTRmax`, `Wu`, `Wc`, `Wats`, `Wuvps`,
//! `total_visits_duration`, `unique_visits_duration`, `ctr_clicks_seconds`,
//! `SALESmax`, `CRmax`, `MRmax`, `Wsales`, `Wcr`, `Wmr`, `CPABlocks`,
//! `MRBlocks`, `EvaluateMinersBlocks`, plus the bucketed conversion-rate
//! limits `cr_min_<n>`, `cr_max_<n>` (percent) and `penalty_multiplier_<n>`.

use {
    crate::utils::hours,
    chrono::TimeDelta,
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, str::FromStr},
    tracing::{debug, warn},
};

/// One entry of the feed's settings list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

impl Setting {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Penalty applied to a CPA rating when the conversion rate falls in `[min, max)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRateLimit {
    pub min: f64,
    pub max: f64,
    pub penalty: f64,
}

impl ConversionRateLimit {
    pub fn contains(&self, conversion_rate: f64) -> bool {
        conversion_rate >= self.min && conversion_rate < self.max
    }

    fn is_empty(&self) -> bool {
        self.min <= 0.0 && self.max <= 0.0 && self.penalty <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaParams {
    pub ctr_max: f64,
    pub w_uv: f64,
    pub w_ctr: f64,
    pub w_ots: f64,
    pub w_uvps: f64,
    /// Hours.
    pub total_visits_duration: u64,
    /// Hours a visit from the same ip counts against uniqueness.
    pub unique_visits_duration: u64,
    pub ctr_clicks_seconds: u64,
    pub sales_max: f64,
    pub cr_max: f64,
    pub mr_max: f64,
    pub w_sales: f64,
    pub w_cr: f64,
    pub w_mr: f64,
    /// Default refund window for CPA campaigns without their own.
    pub cpa_blocks: u64,
    /// Reputation lookback.
    pub mr_blocks: u64,
    pub evaluate_miners_blocks: u64,
    #[serde(default)]
    pub conversion_rate_limits: Vec<ConversionRateLimit>,
}

impl Default for FormulaParams {
    fn default() -> Self {
        Self {
            ctr_max: 0.20,
            w_uv: 0.5,
            w_ctr: 0.5,
            w_ots: 0.8,
            w_uvps: 0.2,
            total_visits_duration: 2,
            unique_visits_duration: 2,
            ctr_clicks_seconds: 3,
            sales_max: 600.0,
            cr_max: 2.0,
            mr_max: 100.0,
            w_sales: 0.9,
            w_cr: 0.05,
            w_mr: 0.05,
            cpa_blocks: 7200,
            mr_blocks: 216_000,
            evaluate_miners_blocks: 100,
            conversion_rate_limits: Vec::new(),
        }
    }
}

impl FormulaParams {
    /// Build from the feed's settings list. Unknown names are ignored; a value
    /// that does not parse leaves that key at its default.
    pub fn from_settings(settings: &[Setting]) -> Self {
        let mut params = Self::default();
        let mut limits: BTreeMap<String, ConversionRateLimit> = BTreeMap::new();

        for setting in settings {
            let name = setting.name.as_str();
            let value = setting.value.as_str();
            match name {
                "CTRmax" => set(&mut params.ctr_max, name, value),
                "Wu" => set(&mut params.w_uv, name, value),
                "Wc" => set(&mut params.w_ctr, name, value),
                "Wats" => set(&mut params.w_ots, name, value),
                "Wuvps" => set(&mut params.w_uvps, name, value),
                "total_visits_duration" => set(&mut params.total_visits_duration, name, value),
                "unique_visits_duration" => set(&mut params.unique_visits_duration, name, value),
                "ctr_clicks_seconds" => set(&mut params.ctr_clicks_seconds, name, value),
                "SALESmax" => set(&mut params.sales_max, name, value),
                "CRmax" => set(&mut params.cr_max, name, value),
                "MRmax" => set(&mut params.mr_max, name, value),
                "Wsales" => set(&mut params.w_sales, name, value),
                "Wcr" => set(&mut params.w_cr, name, value),
                "Wmr" => set(&mut params.w_mr, name, value),
                "CPABlocks" => set(&mut params.cpa_blocks, name, value),
                "MRBlocks" => set(&mut params.mr_blocks, name, value),
                "EvaluateMinersBlocks" => set(&mut params.evaluate_miners_blocks, name, value),
                _ => {
                    if let Some(suffix) = name.strip_prefix("cr_min_") {
                        if let Some(min) = parse::<f64>(name, value) {
                            limits.entry(suffix.to_string()).or_default().min = min / 100.0;
                        }
                    } else if let Some(suffix) = name.strip_prefix("cr_max_") {
                        if let Some(max) = parse::<f64>(name, value) {
                            limits.entry(suffix.to_string()).or_default().max = max / 100.0;
                        }
                    } else if let Some(suffix) = name.strip_prefix("penalty_multiplier_") {
                        if let Some(penalty) = parse(name, value) {
                            limits.entry(suffix.to_string()).or_default().penalty = penalty;
                        }
                    } else {
                        debug!("Ignoring unknown setting {}", name);
                    }
                }
            }
        }

        params.conversion_rate_limits = limits
            .into_values()
            .filter(|limit| !limit.is_empty())
            .collect();

        params
    }

    pub fn unique_window(&self) -> TimeDelta {
        hours(self.unique_visits_duration)
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Setting {} has malformed value {:?}, keeping default", name, value);
            None
        }
    }
}

fn set<T: FromStr>(slot: &mut T, name: &str, value: &str) {
    if let Some(parsed) = parse(name, value) {
        *slot = parsed;
    }
}
