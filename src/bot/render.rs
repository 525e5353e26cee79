use chrono::{Local, TimeZone};
use serde_json::Value;

use crate::bot::api::InlineKeyboardMarkup;
use crate::core::models::Analysis;

pub fn fmt_money(value_u: Option<i64>) -> String {
    match value_u {
        None => "—".to_string(),
        Some(v) if v % 100 == 0 => format!("{} ₽", v / 100),
        Some(v) => format!("{:.2} ₽", v as f64 / 100.0),
    }
}

pub fn traffic_light(score: u32) -> &'static str {
    if score < 50 {
        "🔴"
    } else if score < 75 {
        "🟡"
    } else {
        "🟢"
    }
}

fn fmt_ts(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => ts.to_string(),
    }
}

/// Minimal escaping for text interpolated into an HTML-parse-mode message.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn product_rating(product: &Value) -> String {
    let raw = [&product["rating"], &product["reviewRating"]]
        .into_iter()
        .find(|v| !v.is_null());
    match raw {
        Some(value) => match value.as_f64() {
            Some(rating) => format!("{rating:.1}"),
            None => value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
        },
        None => "—".to_string(),
    }
}

fn product_feedback_count(product: &Value) -> String {
    [&product["feedbacks"], &product["nmFeedbacks"]]
        .into_iter()
        .find_map(|v| v.as_i64())
        .map(|n| n.to_string())
        .unwrap_or_else(|| "—".to_string())
}

/// Render the full report as an HTML message plus an optional
/// open-on-marketplace button.
pub fn build_message(analysis: &Analysis, original_url: Option<&str>) -> (String, Option<InlineKeyboardMarkup>) {
    let product = &analysis.product;
    let name = product["name"].as_str().filter(|s| !s.is_empty()).unwrap_or("Товар");
    let brand = product["brand"].as_str().unwrap_or("");

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("<b>{}</b>", escape(name)));
    if !brand.is_empty() {
        lines.push(format!("Бренд: <b>{}</b>", escape(brand)));
    }
    lines.push(format!("Артикул (nmId): <code>{}</code>", analysis.nmid));
    lines.push(format!(
        "Рейтинг WB: <b>{}</b> • отзывов: <b>{}</b> • текстовых взято: <b>{}</b>",
        product_rating(product),
        product_feedback_count(product),
        analysis.reviews_count
    ));

    // current price, without a discount verdict
    if let Some(product_u) = analysis.price.product_u {
        match analysis.price.basic_u {
            Some(basic_u) if basic_u != product_u => lines.push(format!(
                "Цена сейчас (WB): <b>{}</b> • basic: {}",
                fmt_money(Some(product_u)),
                fmt_money(Some(basic_u))
            )),
            _ => lines.push(format!("Цена сейчас (WB): <b>{}</b>", fmt_money(Some(product_u)))),
        }
    }
    if let Some(stock) = analysis.stock {
        lines.push(format!("Остаток на складах: <b>{stock}</b> шт."));
    }

    // history collected by the bot itself, oldest first
    if !analysis.price_history.is_empty() {
        lines.push(String::new());
        lines.push("<b>История цены (бот собирает сам):</b>".to_string());
        for point in analysis.price_history.iter().rev() {
            let Some(product_u) = point.product_u else {
                continue;
            };
            let ts = fmt_ts(point.ts);
            match point.basic_u {
                Some(basic_u) if basic_u != product_u => lines.push(format!(
                    "• {}: {} (basic {})",
                    ts,
                    fmt_money(Some(product_u)),
                    fmt_money(Some(basic_u))
                )),
                _ => lines.push(format!("• {}: {}", ts, fmt_money(Some(product_u)))),
            }
        }
    }

    let trust = &analysis.trust;
    lines.push(String::new());
    lines.push(format!(
        "{} <b>Trust Score:</b> <b>{}/100</b>",
        traffic_light(trust.score),
        trust.score
    ));
    lines.push("<b>Снятые очки (эвристики):</b>".to_string());
    lines.push(format!(
        "• Дубли/однотипность: -{} (near={:.3}, exact={:.3})",
        trust.penalties.duplicates, trust.signals.near_dup_ratio, trust.signals.exact_dup_ratio
    ));
    lines.push(format!(
        "• Всплеск по времени: -{} (spike_share={:.3})",
        trust.penalties.time_spike, trust.signals.spike_share
    ));
    lines.push(format!(
        "• Несостыковка тональности: -{} (mismatch_ratio={:.3})",
        trust.penalties.mismatch, trust.signals.mismatch_ratio
    ));
    lines.push(format!(
        "• Слишком короткие: -{} (short_ratio={:.3})",
        trust.penalties.too_short, trust.signals.short_ratio
    ));

    lines.push(String::new());
    for reason in trust.reasons.iter().take(6) {
        lines.push(format!("• {reason}"));
    }

    lines.push(String::new());
    lines.push("<b>Итоговый рейтинг товара (по очищенным текстовым отзывам):</b>".to_string());
    match analysis.clean.avg {
        Some(avg) => lines.push(format!(
            "• Средняя оценка: <b>{avg}/5</b> (n={})",
            analysis.clean.count
        )),
        None => lines.push("• Не смог посчитать (нет оценок в оставшихся текстовых отзывах).".to_string()),
    }
    lines.push(format!(
        "• Отброшено как «подозрительное»: short={}, mismatch={}, exact_dup={}, near_dup={}",
        analysis.drops.too_short,
        analysis.drops.mismatch,
        analysis.drops.exact_duplicate,
        analysis.drops.near_duplicate
    ));

    if !analysis.lifespan_complaints.is_empty() {
        lines.push(String::new());
        lines.push("<b>Жалобы по сроку службы:</b>".to_string());
        for complaint in &analysis.lifespan_complaints {
            lines.push(format!("• {}", escape(complaint)));
        }
    }

    let keyboard = original_url
        .filter(|url| url.contains("wildberries.ru"))
        .map(|url| InlineKeyboardMarkup::url_button("Открыть товар на WB", url));

    (lines.join("\n"), keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{
        CleanRating, DropCounts, Penalties, PricePoint, PriceQuote, TrustReport, TrustSignals,
    };
    use serde_json::json;

    fn sample_analysis() -> Analysis {
        Analysis {
            nmid: 98892471,
            root_id: 98892471,
            product: json!({
                "name": "Кружка <керамика>",
                "brand": "Посуда & Ко",
                "rating": 4.6,
                "feedbacks": 321
            }),
            reviews_count: 42,
            trust: TrustReport {
                score: 62,
                reasons: vec!["Много однотипных/похожих отзывов (шаблоны/дубли).".to_string()],
                signals: TrustSignals {
                    near_dup_ratio: 0.25,
                    exact_dup_ratio: 0.1,
                    ..TrustSignals::default()
                },
                penalties: Penalties {
                    duplicates: 31,
                    time_spike: 7,
                    ..Penalties::default()
                },
            },
            clean: CleanRating {
                count: 30,
                avg: Some(4.13),
            },
            drops: DropCounts {
                exact_duplicate: 5,
                near_duplicate: 3,
                too_short: 2,
                mismatch: 2,
            },
            lifespan_complaints: vec![],
            price: PriceQuote {
                basic_u: Some(59900),
                product_u: Some(45900),
            },
            price_history: vec![
                PricePoint {
                    ts: 1_700_000_000,
                    basic_u: Some(59900),
                    product_u: Some(45900),
                },
                PricePoint {
                    ts: 1_690_000_000,
                    basic_u: None,
                    product_u: None,
                },
            ],
            stock: Some(14),
        }
    }

    #[test]
    fn money_formatting() {
        assert_eq!(fmt_money(None), "—");
        assert_eq!(fmt_money(Some(45900)), "459 ₽");
        assert_eq!(fmt_money(Some(45950)), "459.50 ₽");
    }

    #[test]
    fn traffic_light_bands() {
        assert_eq!(traffic_light(0), "🔴");
        assert_eq!(traffic_light(49), "🔴");
        assert_eq!(traffic_light(50), "🟡");
        assert_eq!(traffic_light(74), "🟡");
        assert_eq!(traffic_light(75), "🟢");
        assert_eq!(traffic_light(100), "🟢");
    }

    #[test]
    fn message_carries_core_sections() {
        let (body, keyboard) = build_message(&sample_analysis(), None);
        assert!(body.contains("Кружка &lt;керамика&gt;"));
        assert!(body.contains("Посуда &amp; Ко"));
        assert!(body.contains("<code>98892471</code>"));
        assert!(body.contains("Рейтинг WB: <b>4.6</b>"));
        assert!(body.contains("Цена сейчас (WB): <b>459 ₽</b> • basic: 599 ₽"));
        assert!(body.contains("Остаток на складах: <b>14</b>"));
        assert!(body.contains("Trust Score:</b> <b>62/100"));
        assert!(body.contains("🟡"));
        assert!(body.contains("Средняя оценка: <b>4.13/5</b> (n=30)"));
        assert!(body.contains("short=2, mismatch=2, exact_dup=5, near_dup=3"));
        // priceless history rows are skipped
        assert_eq!(body.matches("• 20").count(), 1);
        assert!(keyboard.is_none());
    }

    #[test]
    fn keyboard_only_for_marketplace_links() {
        let analysis = sample_analysis();
        let url = "https://www.wildberries.ru/catalog/98892471/detail.aspx";
        let (_, keyboard) = build_message(&analysis, Some(url));
        assert!(keyboard.is_some());

        let (_, keyboard) = build_message(&analysis, Some("https://example.com/98892471"));
        assert!(keyboard.is_none());

        let (_, keyboard) = build_message(&analysis, Some("98892471"));
        assert!(keyboard.is_none());
    }

    #[test]
    fn missing_product_fields_render_placeholders() {
        let mut analysis = sample_analysis();
        analysis.product = json!({});
        analysis.price = PriceQuote::default();
        analysis.stock = None;
        analysis.price_history.clear();
        let (body, _) = build_message(&analysis, None);
        assert!(body.contains("<b>Товар</b>"));
        assert!(body.contains("Рейтинг WB: <b>—</b>"));
        assert!(!body.contains("Цена сейчас"));
        assert!(!body.contains("История цены"));
    }
}
