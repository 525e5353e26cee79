use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One text review pulled out of a feedback payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub rating: Option<u8>,
    pub text: String,
    pub created: Option<NaiveDateTime>,
}

/// Points taken off the trust score, per factor. Each factor is capped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Penalties {
    pub duplicates: u32,
    pub time_spike: u32,
    pub mismatch: u32,
    pub too_short: u32,
}

impl Penalties {
    pub fn total(&self) -> u32 {
        self.duplicates + self.time_spike + self.mismatch + self.too_short
    }
}

/// Raw ratios behind the penalties, kept around for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrustSignals {
    pub near_dup_ratio: f64,
    pub exact_dup_ratio: f64,
    pub spike_share: f64,
    pub mismatch_ratio: f64,
    pub short_ratio: f64,
    pub sampled_for_similarity: usize,
    pub rated_text_reviews: usize,
}

#[derive(Debug, Clone)]
pub struct TrustReport {
    /// 0..=100; 100 means no red flags found.
    pub score: u32,
    pub reasons: Vec<String>,
    pub signals: TrustSignals,
    pub penalties: Penalties,
}

/// Reviews dropped by the suspicious-review filter, per reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub exact_duplicate: usize,
    pub near_duplicate: usize,
    pub too_short: usize,
    pub mismatch: usize,
}

/// Average rating over the reviews that survived the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CleanRating {
    pub count: usize,
    pub avg: Option<f64>,
}

/// Both marketplace prices for an article, in kopecks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub basic_u: Option<i64>,
    pub product_u: Option<i64>,
}

/// One stored price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub ts: i64,
    pub basic_u: Option<i64>,
    pub product_u: Option<i64>,
}

/// Everything the bot renders for one analyzed article.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub nmid: i64,
    pub root_id: i64,
    /// Raw product card object as the marketplace returned it.
    pub product: Value,
    pub reviews_count: usize,
    pub trust: TrustReport,
    pub clean: CleanRating,
    pub drops: DropCounts,
    pub lifespan_complaints: Vec<String>,
    pub price: PriceQuote,
    /// Newest first, as read back from storage.
    pub price_history: Vec<PricePoint>,
    pub stock: Option<i64>,
}
