use chrono::NaiveDateTime;
use serde_json::Value;

use crate::core::models::Review;

/// Feedback payloads have drifted between several shapes; keep every
/// extraction path the endpoints have been seen to use.
const LIST_KEYS: [&str; 2] = ["feedbacks", "feedbacksWithText"];
const RATING_KEYS: [&str; 4] = ["productValuation", "valuation", "rating", "stars"];
const TEXT_KEYS: [&str; 5] = ["text", "review", "comment", "pros", "cons"];
const DATE_KEYS: [&str; 3] = ["createdDate", "created", "date"];

const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// Upper bound on reviews considered per payload.
const MAX_REVIEWS: usize = 4000;

fn parse_created(raw: &str) -> Option<NaiveDateTime> {
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    // timezone suffixes vary; the leading 19 chars are enough for
    // bucketing reviews by day
    raw.get(..19)
        .and_then(|head| NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S").ok())
}

fn rating_value(value: &Value) -> Option<u8> {
    if let Some(n) = value.as_i64() {
        return u8::try_from(n).ok();
    }
    value.as_str().and_then(|s| s.trim().parse().ok())
}

/// Pull text reviews out of a feedback payload, tolerating every known
/// shape. Reviews without text are skipped.
pub fn extract_reviews(feedback: &Value) -> Vec<Review> {
    let mut candidates: Option<&Vec<Value>> = None;
    for key in LIST_KEYS {
        candidates = feedback[key]
            .as_array()
            .or_else(|| feedback["data"][key].as_array());
        if candidates.is_some() {
            break;
        }
    }

    let mut reviews = Vec::new();
    for item in candidates.into_iter().flatten().take(MAX_REVIEWS) {
        let Some(object) = item.as_object() else {
            continue;
        };

        let rating = RATING_KEYS
            .iter()
            .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
            .and_then(rating_value);

        let mut parts: Vec<&str> = Vec::new();
        for key in TEXT_KEYS {
            if let Some(text) = object.get(key).and_then(Value::as_str) {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        if parts.is_empty() {
            continue;
        }

        let created = DATE_KEYS
            .iter()
            .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
            .and_then(Value::as_str)
            .and_then(parse_created);

        reviews.push(Review {
            rating,
            text: parts.join("\n"),
            created,
        });
    }
    reviews
}
