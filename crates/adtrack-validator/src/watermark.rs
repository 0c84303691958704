// crates/adtrack-validator/src/watermark.rs

//! Cross-peer sync offset
//!
//! After a pull round the offset moves to the smallest of the per-peer
//! maxima of `created_at`. A slow peer that has not surfaced its newer
//! records yet keeps the offset low enough for them to be fetched on the next
//! round; records already merged are fetched again, which merge tolerates.

use {
    adtrack_common::types::VisitRecord,
    chrono::{DateTime, Utc},
    std::collections::BTreeMap,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    offset: Option<DateTime<Utc>>,
}

impl Watermark {
    pub fn new(offset: Option<DateTime<Utc>>) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Option<DateTime<Utc>> {
        self.offset
    }

    /// Min over responding peers of each peer's newest `created_at`.
    /// Peers that returned nothing do not take part.
    pub fn candidate(responses: &BTreeMap<String, Vec<VisitRecord>>) -> Option<DateTime<Utc>> {
        responses
            .values()
            .filter_map(|records| records.iter().map(|record| record.created_at).max())
            .min()
    }

    /// Move forward after a round. Returns the offset to use next.
    pub fn advance(&mut self, responses: &BTreeMap<String, Vec<VisitRecord>>) -> Option<DateTime<Utc>> {
        if let Some(candidate) = Self::candidate(responses) {
            self.offset = Some(match self.offset {
                Some(current) => current.max(candidate),
                None => candidate,
            });
        }
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        adtrack_common::types::{BehaviorCounters, SalesStatus},
        chrono::TimeZone,
    };

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn record(minute: u32) -> VisitRecord {
        VisitRecord {
            id: format!("v-{minute}"),
            ip_address: "10.0.0.1".into(),
            user_agent: String::new(),
            country: None,
            country_code: None,
            device: None,
            campaign_id: None,
            campaign_item: None,
            referer: None,
            miner_hotkey: None,
            miner_block: None,
            validator_hotkey: None,
            validator_block: None,
            is_unique: false,
            return_in_site: false,
            at: false,
            counters: BehaviorCounters::default(),
            sales_status: SalesStatus::New,
            refund: 0,
            sales: 0,
            sale_amount: 0.0,
            order_info: None,
            refund_info: None,
            sale_date: None,
            created_at: at(minute),
            updated_at: at(minute),
        }
    }

    fn round(peers: &[(&str, Vec<u32>)]) -> BTreeMap<String, Vec<VisitRecord>> {
        peers
            .iter()
            .map(|(peer, minutes)| (peer.to_string(), minutes.iter().map(|m| record(*m)).collect()))
            .collect()
    }

    #[test]
    fn test_offset_is_min_of_peer_maxima() {
        let mut watermark = Watermark::default();
        let next = watermark.advance(&round(&[("fast", vec![1, 9]), ("slow", vec![2, 4]), ("idle", vec![])]));
        assert_eq!(next, Some(at(4)));
    }

    #[test]
    fn test_offset_unchanged_without_data() {
        let mut watermark = Watermark::new(Some(at(5)));
        assert_eq!(watermark.advance(&BTreeMap::new()), Some(at(5)));
        assert_eq!(watermark.advance(&round(&[("idle", vec![])])), Some(at(5)));
    }

    #[test]
    fn test_offset_never_decreases() {
        let mut watermark = Watermark::default();
        let rounds = [
            round(&[("a", vec![10])]),
            round(&[("a", vec![3]), ("b", vec![20])]),
            BTreeMap::new(),
            round(&[("b", vec![15, 30])]),
        ];

        let mut previous = None;
        for responses in &rounds {
            let next = watermark.advance(responses);
            assert!(next >= previous);
            previous = next;
        }
        assert_eq!(watermark.offset(), Some(at(30)));
    }
}
