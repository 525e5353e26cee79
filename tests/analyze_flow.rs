use antifake_bot::analyzer::reviews::extract_reviews;
use antifake_bot::analyzer::trust::{clean_rating, detect_suspicious, lifespan_complaints, trust_score};
use antifake_bot::core::models::PriceQuote;
use antifake_bot::market::client::MarketClient;
use antifake_bot::Storage;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

async fn memory_storage(cache_writes_disabled: bool) -> Storage {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    Storage::new(pool, cache_writes_disabled)
        .await
        .expect("migrations apply")
}

fn canned_feedbacks() -> serde_json::Value {
    let template = "Отличный товар рекомендую всем покупать обязательно каждому";
    json!({
        "feedbacks": [
            {"productValuation": 5, "text": template, "createdDate": "2024-05-10T10:00:00"},
            {"productValuation": 5, "text": template, "createdDate": "2024-05-10T11:00:00"},
            {"productValuation": 5, "text": template, "createdDate": "2024-05-10T12:00:00"},
            {"productValuation": 5, "text": "норм"},
            {"productValuation": 5, "text": "Полный брак, оформила возврат, больше не работает совсем"},
            {"productValuation": 1, "text": "Сломался через 2 недели, кнопка перестала нажиматься, обидно",
             "createdDate": "2024-04-02T09:00:00"},
            {"productValuation": 4, "text": "Плотный материал, размер совпал с таблицей, доставка быстрая",
             "createdDate": "2024-03-15T09:00:00"}
        ]
    })
}

#[tokio::test]
async fn analysis_pipeline_over_cached_payload() {
    let storage = memory_storage(false).await;

    // the bot caches the raw payload and re-extracts on every request;
    // the cache round-trip must not change the analysis
    let payload = canned_feedbacks();
    storage.cache_set("fb:1:limit=120", &payload, 3600).await.unwrap();
    let cached = storage
        .cache_get("fb:1:limit=120")
        .await
        .unwrap()
        .expect("payload cached");

    let reviews = extract_reviews(&cached);
    assert_eq!(reviews.len(), 7);

    let report = trust_score(&reviews);
    assert!(report.score < 100, "duplicates must cost points");
    assert!(report.penalties.duplicates > 0);
    assert!(report.penalties.mismatch > 0);
    assert!(report.penalties.too_short > 0);

    let (dropped, drops) = detect_suspicious(&reviews);
    assert_eq!(drops.too_short, 1);
    assert_eq!(drops.mismatch, 1);
    assert_eq!(drops.exact_duplicate, 2);

    let clean = clean_rating(&reviews, &dropped);
    // survivors: one duplicate representative, the broken-item review,
    // and the organic one
    assert_eq!(clean.count, 3);
    let avg = clean.avg.expect("survivors carry ratings");
    assert!((avg - 10.0 / 3.0).abs() < 0.01, "avg = {avg}");

    let complaints = lifespan_complaints(&reviews);
    assert_eq!(complaints.len(), 1);
    assert!(complaints[0].contains("через 2 недели"));
}

#[tokio::test]
async fn price_snapshots_accumulate_across_requests() {
    let storage = memory_storage(false).await;

    let first_card = json!({"sizes": [{"price": {"basic": 59900, "product": 45900}}]});
    let second_card = json!({"sizes": [{"price": {"basic": 59900, "product": 39900}}]});

    storage
        .price_add_snapshot(7, MarketClient::parse_price(&first_card))
        .await
        .unwrap();
    // unchanged price: deduplicated
    storage
        .price_add_snapshot(7, MarketClient::parse_price(&first_card))
        .await
        .unwrap();
    storage
        .price_add_snapshot(7, MarketClient::parse_price(&second_card))
        .await
        .unwrap();

    let history = storage.price_history(7, 12).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].product_u, Some(39900));
    assert_eq!(history[1].product_u, Some(45900));

    // empty card parses to an empty quote, which is still a change
    storage.price_add_snapshot(7, PriceQuote::default()).await.unwrap();
    assert_eq!(storage.price_history(7, 12).await.unwrap().len(), 3);
}

#[tokio::test]
async fn disabled_cache_writes_force_refetch_path() {
    let storage = memory_storage(true).await;
    let payload = canned_feedbacks();
    storage.cache_set("fb:1:limit=120", &payload, 3600).await.unwrap();
    assert!(
        storage.cache_get("fb:1:limit=120").await.unwrap().is_none(),
        "a read-mostly process must never see its own cache writes"
    );
}
