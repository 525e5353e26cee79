use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::core::error::BotError;
use crate::core::models::PriceQuote;

/// Public card endpoint. Unofficial, known to move.
const CARD_URL: &str = "https://card.wb.ru/cards/v4/detail";

/// Public feedback endpoints. Unofficial, known to move.
const FEEDBACK_HOSTS: [&str; 2] = ["https://feedbacks1.wb.ru", "https://feedbacks2.wb.ru"];

const USER_AGENT: &str = "Mozilla/5.0 (AntiFakeBot/1.0)";

/// Pull an article id (nmId) out of free-form user input: either a bare
/// number or the first 6-12 digit group after `/catalog/` or `nm=`.
pub fn extract_nmid(text: &str) -> Option<i64> {
    static NMID: OnceLock<Regex> = OnceLock::new();
    let re = NMID.get_or_init(|| Regex::new(r"(?:/catalog/|nm=)(\d{6,12})").expect("valid pattern"));

    let text = text.trim();
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

pub struct MarketClient {
    client: Client,
    dest: String,
    locale: String,
}

impl MarketClient {
    pub fn new(dest: String, locale: String, timeout: Duration) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            dest,
            locale,
        })
    }

    /// Fetch the card for an article and return the first product object.
    pub async fn get_product(&self, nmid: i64) -> Result<Value, BotError> {
        let nm = nmid.to_string();
        let response = self
            .client
            .get(CARD_URL)
            .query(&[
                ("dest", self.dest.as_str()),
                ("locale", self.locale.as_str()),
                ("nm", nm.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;

        let products = data["products"]
            .as_array()
            .filter(|a| !a.is_empty())
            .or_else(|| data["data"]["products"].as_array().filter(|a| !a.is_empty()));
        products
            .and_then(|a| a.first())
            .cloned()
            .ok_or(BotError::ProductNotFound { article: nmid })
    }

    /// Fetch feedbacks for a root article. The endpoint changes parameter
    /// shape now and then, so try each host with each known shape and take
    /// the first 200.
    pub async fn get_feedbacks(&self, root_id: i64, limit: u32) -> Result<Value, BotError> {
        let take = limit.to_string();
        let candidates: [&[(&str, &str)]; 3] = [
            &[("take", take.as_str()), ("skip", "0")],
            &[("limit", take.as_str()), ("offset", "0")],
            &[],
        ];

        let mut last_error: Option<String> = None;
        for host in FEEDBACK_HOSTS {
            for params in candidates {
                let url = format!("{host}/feedbacks/v1/{root_id}");
                let result = self.client.get(&url).query(params).send().await;
                match result {
                    Ok(response) if response.status().is_success() => {
                        match response.json::<Value>().await {
                            Ok(value) => return Ok(value),
                            Err(e) => last_error = Some(e.to_string()),
                        }
                    }
                    Ok(response) => {
                        debug!(%url, status = %response.status(), "feedback endpoint refused");
                    }
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
        }

        Err(BotError::FeedbacksUnavailable {
            root_id,
            reason: last_error.unwrap_or_else(|| "no endpoint variant answered 200".to_string()),
        })
    }

    /// First size carrying both price fields wins. Values are kopecks.
    pub fn parse_price(product: &Value) -> PriceQuote {
        for size in product["sizes"].as_array().into_iter().flatten() {
            let price = &size["price"];
            if let (Some(basic), Some(product_price)) =
                (price["basic"].as_i64(), price["product"].as_i64())
            {
                return PriceQuote {
                    basic_u: Some(basic),
                    product_u: Some(product_price),
                };
            }
        }
        PriceQuote::default()
    }

    /// Total stock: the card-level total when present, otherwise the sum
    /// over per-size stock entries, None when neither exists.
    pub fn total_stock(product: &Value) -> Option<i64> {
        if let Some(total) = product["totalQuantity"].as_i64() {
            return Some(total);
        }
        let mut total = 0;
        let mut found = false;
        for size in product["sizes"].as_array().into_iter().flatten() {
            for stock in size["stocks"].as_array().into_iter().flatten() {
                if let Some(qty) = stock["qty"].as_i64() {
                    total += qty;
                    found = true;
                }
            }
        }
        found.then_some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_article_from_bare_digits() {
        assert_eq!(extract_nmid("98892471"), Some(98892471));
        assert_eq!(extract_nmid("  98892471  "), Some(98892471));
    }

    #[test]
    fn extracts_article_from_catalog_url() {
        assert_eq!(
            extract_nmid("https://www.wildberries.ru/catalog/98892471/detail.aspx"),
            Some(98892471)
        );
        assert_eq!(extract_nmid("https://card.wb.ru/cards/v4/detail?nm=123456"), Some(123456));
    }

    #[test]
    fn rejects_text_without_article() {
        assert_eq!(extract_nmid("привет"), None);
        assert_eq!(extract_nmid("/catalog/123/detail.aspx"), None); // too short
        assert_eq!(extract_nmid(""), None);
    }

    #[test]
    fn parse_price_takes_first_complete_size() {
        let product = json!({
            "sizes": [
                {"price": {"basic": 129900}},
                {"price": {"basic": 119900, "product": 99900}},
                {"price": {"basic": 1, "product": 2}}
            ]
        });
        let quote = MarketClient::parse_price(&product);
        assert_eq!(quote.basic_u, Some(119900));
        assert_eq!(quote.product_u, Some(99900));
    }

    #[test]
    fn parse_price_handles_missing_sizes() {
        assert_eq!(MarketClient::parse_price(&json!({})), PriceQuote::default());
    }

    #[test]
    fn total_stock_prefers_card_level_total() {
        let product = json!({
            "totalQuantity": 17,
            "sizes": [{"stocks": [{"qty": 99}]}]
        });
        assert_eq!(MarketClient::total_stock(&product), Some(17));
    }

    #[test]
    fn total_stock_sums_per_size_quantities() {
        let product = json!({
            "sizes": [
                {"stocks": [{"qty": 3}, {"qty": 4}]},
                {"stocks": [{"qty": 5}]},
                {"stocks": []}
            ]
        });
        assert_eq!(MarketClient::total_stock(&product), Some(12));
        assert_eq!(MarketClient::total_stock(&json!({"sizes": []})), None);
    }
}
