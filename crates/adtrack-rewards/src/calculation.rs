// crates/adtrack-rewards/src/calculation.rs

use {
    crate::formula::{cpa_rating, regular_rating, round_to, CpaParams, RegularParams},
    adtrack_common::{
        config::FormulaParams,
        types::{AggregationSchema, CampaignType, MinersReputation},
    },
    std::collections::BTreeMap,
    tracing::debug,
};

/// Unique-visitor ceiling used when a campaign has not published one yet.
pub const DEFAULT_UVMAX: f64 = 300.0;

/// Highest unique-visitor count any miner reached in a campaign.
pub fn campaign_umax(miners: &BTreeMap<String, AggregationSchema>) -> f64 {
    miners
        .values()
        .map(|schema| schema.visits_unique)
        .max()
        .unwrap_or(0) as f64
}

pub struct RatingCalculator {
    params: FormulaParams,
    ndigits: u32,
}

impl RatingCalculator {
    pub fn new(params: FormulaParams, ndigits: u32) -> Self {
        Self { params, ndigits }
    }

    pub fn params(&self) -> &FormulaParams {
        &self.params
    }

    /// Scores every miner of one campaign.
    ///
    /// CPA campaigns also rate miners that only carry reputation, with zeroed
    /// counters, so a miner without sales in the window still gets its MR share.
    pub fn campaign_scores(
        &self,
        campaign_type: CampaignType,
        miners: &BTreeMap<String, AggregationSchema>,
        reputation: &MinersReputation,
        umax: f64,
    ) -> BTreeMap<String, f64> {
        match campaign_type {
            CampaignType::Regular => {
                let uv_max = if umax > 0.0 { umax } else { DEFAULT_UVMAX };
                let params = RegularParams::from_formula(&self.params, uv_max);
                miners
                    .iter()
                    .map(|(hotkey, data)| (hotkey.clone(), regular_rating(data, &params, self.ndigits)))
                    .collect()
            }
            CampaignType::Cpa => {
                let params = CpaParams::from_formula(&self.params);
                let mut hotkeys: Vec<&String> = miners.keys().chain(reputation.keys()).collect();
                hotkeys.sort();
                hotkeys.dedup();

                hotkeys
                    .into_iter()
                    .map(|hotkey| {
                        let data = miners.get(hotkey).copied().unwrap_or_default();
                        let mr = reputation.get(hotkey).copied().unwrap_or(0.0);
                        let rating = cpa_rating(&data, mr, &params, self.ndigits);
                        debug!("CPA rating for {}: {} (mr {})", hotkey, rating, mr);
                        (hotkey.clone(), rating)
                    })
                    .collect()
            }
        }
    }

    /// Averages per-campaign scores over `campaign_count` and clamps to `[0, 1]`.
    /// A miner missing from a campaign contributes zero for it.
    pub fn combine(
        &self,
        per_campaign: &[BTreeMap<String, f64>],
        campaign_count: usize,
    ) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for scores in per_campaign {
            for (hotkey, score) in scores {
                *totals.entry(hotkey.clone()).or_insert(0.0) += score;
            }
        }

        if campaign_count == 0 {
            return totals.into_keys().map(|hotkey| (hotkey, 0.0)).collect();
        }

        totals
            .into_iter()
            .map(|(hotkey, total)| {
                let score = round_to(total / campaign_count as f64, self.ndigits);
                (hotkey, score.clamp(0.0, 1.0))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(uv: u64, sales: u64, amount: f64) -> AggregationSchema {
        AggregationSchema {
            visits: uv,
            visits_unique: uv,
            total_sales: sales,
            sales_amount: amount,
            ..AggregationSchema::default()
        }
    }

    fn calculator() -> RatingCalculator {
        let params = FormulaParams {
            sales_max: 500.0,
            cr_max: 0.05,
            mr_max: 100.0,
            w_sales: 0.6,
            w_cr: 0.3,
            w_mr: 0.1,
            ..FormulaParams::default()
        };
        RatingCalculator::new(params, 5)
    }

    #[test]
    fn test_campaign_umax() {
        let mut miners = BTreeMap::new();
        assert_eq!(campaign_umax(&miners), 0.0);
        miners.insert("a".to_string(), data(12, 0, 0.0));
        miners.insert("b".to_string(), data(40, 0, 0.0));
        assert_eq!(campaign_umax(&miners), 40.0);
    }

    #[test]
    fn test_cpa_scores_include_reputation_only_miners() {
        let mut miners = BTreeMap::new();
        miners.insert("seller".to_string(), data(5000, 5, 500.0));
        let mut reputation = MinersReputation::new();
        reputation.insert("idle".to_string(), 0.2);

        let scores = calculator().campaign_scores(CampaignType::Cpa, &miners, &reputation, 0.0);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["seller"], 0.606);
        assert_eq!(scores["idle"], 0.0002);
    }

    #[test]
    fn test_regular_scores_fall_back_to_default_umax() {
        let mut miners = BTreeMap::new();
        miners.insert("m".to_string(), data(30, 0, 0.0));

        let scores = calculator().campaign_scores(
            CampaignType::Regular,
            &miners,
            &MinersReputation::new(),
            0.0,
        );
        // uv 30 of 300, no clicks, full attention
        assert_eq!(scores["m"], 0.05);
    }

    #[test]
    fn test_combine_averages_and_clamps() {
        let calculator = calculator();
        let first = BTreeMap::from([("a".to_string(), 0.6), ("b".to_string(), 1.0)]);
        let second = BTreeMap::from([("a".to_string(), 0.2)]);

        let combined = calculator.combine(&[first, second], 2);
        assert_eq!(combined["a"], 0.4);
        assert_eq!(combined["b"], 0.5);

        let overflow = BTreeMap::from([("a".to_string(), 3.0)]);
        assert_eq!(calculator.combine(&[overflow], 1)["a"], 1.0);
        assert!(calculator.combine(&[], 0).is_empty());
    }
}
