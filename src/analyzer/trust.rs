use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::analyzer::text::{has_negative, has_positive, jaccard, shingles, tokenize};
use crate::core::models::{CleanRating, DropCounts, Penalties, Review, TrustReport, TrustSignals};

/// Pairwise similarity is quadratic, so bound the sample.
const SIMILARITY_SAMPLE: usize = 450;
const NEAR_DUP_THRESHOLD: f64 = 0.8;
const SHINGLE_SIZE: usize = 3;

/// A review this short carries no signal.
const MIN_TOKENS: usize = 3;

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sentiment_mismatch(rating: u8, text: &str) -> bool {
    (rating >= 4 && has_negative(text)) || (rating <= 2 && has_positive(text))
}

/// Score review texts 0..=100 by taking capped penalties off 100:
/// duplicates up to 40, a one-day spike up to 20, rating/sentiment
/// mismatches up to 20, too-short reviews up to 20.
pub fn trust_score(reviews: &[Review]) -> TrustReport {
    if reviews.is_empty() {
        return TrustReport {
            score: 50,
            reasons: vec!["Нет отзывов с текстом — оценивать нечего.".to_string()],
            signals: TrustSignals::default(),
            penalties: Penalties::default(),
        };
    }

    let n = reviews.len();
    let tokens: Vec<Vec<String>> = reviews.iter().map(|r| tokenize(&r.text)).collect();
    let sh: Vec<HashSet<String>> = tokens.iter().map(|t| shingles(t, SHINGLE_SIZE)).collect();

    // exact duplicates, on normalized text
    let mut exact: HashMap<String, usize> = HashMap::new();
    for review in reviews {
        *exact.entry(normalize(&review.text)).or_default() += 1;
    }
    let exact_dup_ratio =
        exact.values().filter(|&&count| count >= 2).count() as f64 / exact.len().max(1) as f64;

    // near duplicates, over the bounded sample
    let sampled = n.min(SIMILARITY_SAMPLE);
    let mut near_pairs = 0usize;
    let mut total_pairs = 0usize;
    for i in 0..sampled {
        for j in (i + 1)..sampled {
            total_pairs += 1;
            if jaccard(&sh[i], &sh[j]) >= NEAR_DUP_THRESHOLD {
                near_pairs += 1;
            }
        }
    }
    let near_dup_ratio = near_pairs as f64 / total_pairs.max(1) as f64;
    let dup_pen = (40.0 * (0.7 * near_dup_ratio + 0.3 * exact_dup_ratio)).min(40.0) as u32;

    // reviews bunched into one day
    let dates: Vec<NaiveDate> = reviews
        .iter()
        .filter_map(|r| r.created.map(|c| c.date()))
        .collect();
    let mut spike_share = 0.0;
    if !dates.is_empty() {
        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        for date in &dates {
            *per_day.entry(*date).or_default() += 1;
        }
        let busiest = per_day.values().copied().max().unwrap_or(0);
        spike_share = busiest as f64 / dates.len() as f64;
    }
    let spike_pen = (20.0 * spike_share).min(20.0) as u32;

    // rating says one thing, text says another
    let mut mismatched = 0usize;
    let mut rated = 0usize;
    for review in reviews {
        let Some(rating) = review.rating else {
            continue;
        };
        rated += 1;
        if sentiment_mismatch(rating, &review.text) {
            mismatched += 1;
        }
    }
    let mismatch_ratio = mismatched as f64 / rated.max(1) as f64;
    let mismatch_pen = (20.0 * mismatch_ratio).min(20.0) as u32;

    // contentless reviews
    let short = tokens.iter().filter(|t| t.len() <= MIN_TOKENS).count();
    let short_ratio = short as f64 / n as f64;
    let short_pen = (20.0 * short_ratio).min(20.0) as u32;

    let penalties = Penalties {
        duplicates: dup_pen,
        time_spike: spike_pen,
        mismatch: mismatch_pen,
        too_short: short_pen,
    };
    let score = 100u32.saturating_sub(penalties.total()).min(100);

    let mut reasons = Vec::new();
    if near_dup_ratio > 0.08 || exact_dup_ratio > 0.12 {
        reasons.push("Много однотипных/похожих отзывов (шаблоны/дубли).".to_string());
    }
    if spike_share > 0.35 {
        reasons.push("Есть заметный всплеск отзывов в один день (аномалия по времени).".to_string());
    }
    if mismatch_ratio > 0.10 {
        reasons.push("Есть отзывы вида «5★, но текст ругается» (несостыковка тональности).".to_string());
    }
    if short_ratio > 0.35 {
        reasons.push("Много очень коротких отзывов без деталей.".to_string());
    }
    if reasons.is_empty() {
        reasons.push("Явных красных флагов по текстам не видно (по простым эвристикам).".to_string());
    }

    TrustReport {
        score,
        reasons,
        signals: TrustSignals {
            near_dup_ratio,
            exact_dup_ratio,
            spike_share,
            mismatch_ratio,
            short_ratio,
            sampled_for_similarity: sampled,
            rated_text_reviews: rated,
        },
        penalties,
    }
}

/// Indexes to drop plus counts per reason. A heuristic filter used only to
/// compute a clean rating over text reviews.
pub fn detect_suspicious(reviews: &[Review]) -> (HashSet<usize>, DropCounts) {
    let mut dropped: HashSet<usize> = HashSet::new();
    let mut counts = DropCounts::default();

    // short and mismatched first
    for (i, review) in reviews.iter().enumerate() {
        if tokenize(&review.text).len() <= MIN_TOKENS {
            dropped.insert(i);
            counts.too_short += 1;
            continue;
        }
        if let Some(rating) = review.rating {
            if sentiment_mismatch(rating, &review.text) {
                dropped.insert(i);
                counts.mismatch += 1;
            }
        }
    }

    // exact duplicates: keep the first survivor, drop the rest
    let mut by_norm: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, review) in reviews.iter().enumerate() {
        by_norm.entry(normalize(&review.text)).or_default().push(i);
    }
    for indexes in by_norm.values() {
        if indexes.len() < 2 {
            continue;
        }
        let kept = indexes.iter().copied().find(|i| !dropped.contains(i));
        for &i in indexes {
            if Some(i) == kept {
                continue;
            }
            if dropped.insert(i) {
                counts.exact_duplicate += 1;
            }
        }
    }

    // near duplicates: cluster the bounded sample, keep one representative
    // per cluster of three or more
    let sampled = reviews.len().min(SIMILARITY_SAMPLE);
    let tokens: Vec<Vec<String>> = reviews[..sampled].iter().map(|r| tokenize(&r.text)).collect();
    let sh: Vec<HashSet<String>> = tokens.iter().map(|t| shingles(t, SHINGLE_SIZE)).collect();

    fn find(rep: &mut [usize], mut x: usize) -> usize {
        while rep[x] != x {
            rep[x] = rep[rep[x]];
            x = rep[x];
        }
        x
    }

    let mut rep: Vec<usize> = (0..sampled).collect();
    for i in 0..sampled {
        for j in (i + 1)..sampled {
            if jaccard(&sh[i], &sh[j]) >= NEAR_DUP_THRESHOLD {
                let (ri, rj) = (find(&mut rep, i), find(&mut rep, j));
                if ri != rj {
                    rep[rj] = ri;
                }
            }
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..sampled {
        let root = find(&mut rep, i);
        clusters.entry(root).or_default().push(i);
    }
    for cluster in clusters.values() {
        if cluster.len() < 3 {
            continue;
        }
        let kept = cluster.iter().copied().find(|i| !dropped.contains(i));
        for &i in cluster {
            if Some(i) == kept {
                continue;
            }
            if dropped.insert(i) {
                counts.near_duplicate += 1;
            }
        }
    }

    (dropped, counts)
}

/// Average rating over reviews that survived the filter, rounded to two
/// decimal places.
pub fn clean_rating(reviews: &[Review], dropped: &HashSet<usize>) -> CleanRating {
    let kept: Vec<u8> = reviews
        .iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .filter_map(|(_, r)| r.rating)
        .collect();
    if kept.is_empty() {
        return CleanRating { count: 0, avg: None };
    }
    let avg = kept.iter().map(|&r| f64::from(r)).sum::<f64>() / kept.len() as f64;
    CleanRating {
        count: kept.len(),
        avg: Some((avg * 100.0).round() / 100.0),
    }
}

/// Fragments of low-rated reviews complaining the item died after N
/// days/weeks/months. At most three.
pub fn lifespan_complaints(reviews: &[Review]) -> Vec<String> {
    static AGE: OnceLock<Regex> = OnceLock::new();
    let age = AGE.get_or_init(|| {
        Regex::new(r"(?i)через\s+(\d+)\s*(дн\w*|недел\w*|мес\w*|месяц\w*)").expect("valid pattern")
    });

    let mut hits = Vec::new();
    for review in reviews {
        if review.rating.unwrap_or(0) > 2 {
            continue;
        }
        if let Some(found) = age.find(&review.text) {
            let fragment = review.text.trim().replace('\n', " ");
            let chars: Vec<char> = fragment.chars().collect();
            let rendered = if chars.len() > 120 {
                let head: String = chars[..120].iter().collect();
                format!("{} — «{}…»", found.as_str(), head)
            } else {
                format!("{} — «{}»", found.as_str(), fragment)
            };
            hits.push(rendered);
        }
        if hits.len() >= 3 {
            break;
        }
    }
    hits
}
