// crates/adtrack-rewards/src/formula.rs

//! Pure rating formulas, rounded to `ndigits`.
//!
//! The CPA rating is clamped to `[0, 1]`. The REGULAR rating is not: its
//! `uv / uv_max` term may exceed 1 when `uv_max` is stale, and the combined
//! score takes care of the final bound.

use adtrack_common::{
    config::{ConversionRateLimit, FormulaParams},
    types::AggregationSchema,
};

/// Inputs of the REGULAR formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularParams {
    pub ctr_max: f64,
    pub w_uv: f64,
    pub w_ctr: f64,
    pub w_ots: f64,
    pub w_uvps: f64,
    pub uv_max: f64,
}

impl RegularParams {
    pub fn from_formula(params: &FormulaParams, uv_max: f64) -> Self {
        Self {
            ctr_max: params.ctr_max,
            w_uv: params.w_uv,
            w_ctr: params.w_ctr,
            w_ots: params.w_ots,
            w_uvps: params.w_uvps,
            uv_max,
        }
    }
}

/// Inputs of the CPA formula.
#[derive(Debug, Clone, Copy)]
pub struct CpaParams<'a> {
    pub sales_max: f64,
    pub cr_max: f64,
    pub mr_max: f64,
    pub w_sales: f64,
    pub w_cr: f64,
    pub w_mr: f64,
    pub conversion_rate_limits: &'a [ConversionRateLimit],
}

impl<'a> CpaParams<'a> {
    pub fn from_formula(params: &'a FormulaParams) -> Self {
        Self {
            sales_max: params.sales_max,
            cr_max: params.cr_max,
            mr_max: params.mr_max,
            w_sales: params.w_sales,
            w_cr: params.w_cr,
            w_mr: params.w_mr,
            conversion_rate_limits: &params.conversion_rate_limits,
        }
    }
}

/// Visitors bouncing with a CTR above this are treated as click fraud.
const CTR_FRAUD_CEILING: f64 = 0.2;
const OTS_THRESHOLD: f64 = 0.25;
const REFUND_CEILING: f64 = 0.2;

pub fn round_to(value: f64, ndigits: u32) -> f64 {
    let factor = 10f64.powi(ndigits as i32);
    (value * factor).round() / factor
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn regular_rating(data: &AggregationSchema, params: &RegularParams, ndigits: u32) -> f64 {
    let uv = data.visits_unique as f64;
    let at = data.at as f64;

    let mut ctr = ratio(data.count_through_rate_click as f64, uv);
    if ctr > CTR_FRAUD_CEILING {
        ctr = 0.0;
    }

    let u_norm = ratio(uv, params.uv_max);
    let ctr_norm = ratio(ctr, params.ctr_max);

    let mut ots = if at == 0.0 {
        1.0
    } else if uv == 0.0 {
        0.0
    } else {
        f64::min(at / uv, 1.0)
    };
    if ots != 0.0 && ots != 1.0 {
        ots = f64::min(1.0 - ots, 1.0);
    }

    if ots <= OTS_THRESHOLD {
        return 0.0;
    }

    let uvps = ratio(uv, data.visits as f64);
    let ati = params.w_ots * ots + params.w_uvps * uvps;
    let rating = (params.w_uv * u_norm + params.w_ctr * ctr_norm) * ati;

    round_to(rating, ndigits)
}

/// `mr` is the miner's reputation over the MR window.
pub fn cpa_rating(data: &AggregationSchema, mr: f64, params: &CpaParams<'_>, ndigits: u32) -> f64 {
    let sales = data.total_sales as f64;
    let cvr = ratio(sales, data.visits_unique as f64);
    let refund_share = ratio(data.total_refunds as f64, sales);
    let refund_factor = if refund_share < REFUND_CEILING { 1.0 } else { 0.0 };

    let sales_norm = f64::min(ratio(data.sales_amount, params.sales_max), 1.0);
    let cr_norm = f64::min(ratio(cvr, params.cr_max), 1.0);
    let mr_norm = f64::min(ratio(mr, params.mr_max), 1.0);

    let mut rating = (params.w_sales * sales_norm + params.w_cr * cr_norm + params.w_mr * mr_norm)
        * refund_factor;

    if let Some(limit) = params
        .conversion_rate_limits
        .iter()
        .find(|limit| limit.contains(cvr))
    {
        rating *= limit.penalty;
    }

    round_to(clamp_unit(rating), ndigits)
}
