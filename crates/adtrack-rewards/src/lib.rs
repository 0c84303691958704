//! Rating engine for the adtrack validator
//! Turns aggregated campaign counters into bounded per-miner scores

pub mod calculation;
pub mod formula;

pub use calculation::{campaign_umax, RatingCalculator, DEFAULT_UVMAX};
pub use formula::{cpa_rating, regular_rating, round_to, CpaParams, RegularParams};
