use std::time::Duration;

use tracing::{debug, info, warn};

use crate::analyzer::reviews::extract_reviews;
use crate::analyzer::trust::{clean_rating, detect_suspicious, lifespan_complaints, trust_score};
use crate::bot::api::{Message, TelegramClient};
use crate::bot::render;
use crate::core::config::Config;
use crate::core::error::BotError;
use crate::core::models::Analysis;
use crate::core::storage::Storage;
use crate::market::client::{extract_nmid, MarketClient};

const START_TEXT: &str = "Пришли ссылку на товар Wildberries или артикул (nmId).\n\n\
Пример: https://www.wildberries.ru/catalog/98892471/detail.aspx\n\
Или просто: 98892471";

const RATE_LIMITED_TEXT: &str = "Слишком часто 🙂 Попробуй ещё раз чуть позже.";
const NO_ARTICLE_TEXT: &str = "Не вижу артикул WB. Пришли ссылку на товар или nmId цифрами.";
const WORKING_TEXT: &str = "Секунду… анализирую отзывы и обновляю историю цены 👀";

/// Backoff after a failed poll so a broken network does not spin the loop.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Wires the Telegram update stream to storage, the marketplace client and
/// the analyzer. One instance runs the whole bot.
pub struct BotService {
    config: Config,
    storage: Storage,
    market: MarketClient,
    telegram: TelegramClient,
}

impl BotService {
    pub fn new(config: Config, storage: Storage, market: MarketClient, telegram: TelegramClient) -> Self {
        Self {
            config,
            storage,
            market,
            telegram,
        }
    }

    /// Long-poll loop. Handler failures are logged per message; poll
    /// failures back off and retry. Runs until the task is aborted.
    pub async fn run(&self) -> Result<(), BotError> {
        let mut offset = 0i64;
        info!("starting update long-poll loop");
        loop {
            let updates = match self
                .telegram
                .get_updates(offset, self.config.telegram.poll_timeout_secs)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, kind = e.kind(), "getUpdates failed, backing off");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                let chat_id = message.chat.id;
                if let Err(e) = self.handle_message(&message).await {
                    warn!(chat_id, error = %e, kind = e.kind(), "handler failed");
                }
            }
        }
    }

    async fn handle_message(&self, message: &Message) -> Result<(), BotError> {
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let text = text.trim();
        let chat_id = message.chat.id;

        if text.starts_with("/start") {
            self.telegram.send_message(chat_id, START_TEXT, None).await?;
            return Ok(());
        }

        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(0);
        let allowed = self
            .storage
            .rate_limit_allow(
                user_id,
                self.config.limits.rate_window_secs,
                self.config.limits.rate_max_requests,
            )
            .await?;
        if !allowed {
            self.telegram.send_message(chat_id, RATE_LIMITED_TEXT, None).await?;
            return Ok(());
        }

        let Some(nmid) = extract_nmid(text) else {
            self.telegram.send_message(chat_id, NO_ARTICLE_TEXT, None).await?;
            return Ok(());
        };

        self.telegram.send_message(chat_id, WORKING_TEXT, None).await?;

        let analysis = match self.analyze(nmid).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(nmid, error = %e, kind = e.kind(), "analysis failed");
                let reply = format!("Не получилось получить данные WB: {e}");
                self.telegram.send_message(chat_id, &reply, None).await?;
                return Ok(());
            }
        };

        info!(
            chat_id,
            nmid,
            score = analysis.trust.score,
            reviews = analysis.reviews_count,
            "analysis delivered"
        );
        let (body, keyboard) = render::build_message(&analysis, Some(text));
        self.telegram.send_message(chat_id, &body, keyboard.as_ref()).await?;
        Ok(())
    }

    /// Card and feedbacks go through the TTL cache; the price snapshot is
    /// appended on every pass so history accumulates while the bot runs.
    async fn analyze(&self, nmid: i64) -> Result<Analysis, BotError> {
        let market = &self.config.market;

        let card_key = format!("card:{nmid}:{}:{}", market.dest, market.locale);
        let product = match self.storage.cache_get(&card_key).await? {
            Some(product) => {
                debug!(nmid, "product card served from cache");
                product
            }
            None => {
                let product = self.market.get_product(nmid).await?;
                self.storage
                    .cache_set(&card_key, &product, self.config.cache.card_ttl_secs)
                    .await?;
                product
            }
        };

        // the feedback store is keyed by the root article, not the nmId
        let root_id = product["root"].as_i64().filter(|&root| root != 0).unwrap_or(nmid);

        let price = MarketClient::parse_price(&product);
        self.storage.price_add_snapshot(nmid, price).await?;
        let price_history = self.storage.price_history(nmid, 12).await?;

        let fb_key = format!("fb:{root_id}:limit={}", market.reviews_limit);
        let feedbacks = match self.storage.cache_get(&fb_key).await? {
            Some(feedbacks) => {
                debug!(root_id, "feedbacks served from cache");
                feedbacks
            }
            None => {
                let feedbacks = self.market.get_feedbacks(root_id, market.reviews_limit).await?;
                self.storage
                    .cache_set(&fb_key, &feedbacks, self.config.cache.reviews_ttl_secs)
                    .await?;
                feedbacks
            }
        };

        let reviews = extract_reviews(&feedbacks);
        let trust = trust_score(&reviews);
        let (dropped, drops) = detect_suspicious(&reviews);
        let clean = clean_rating(&reviews, &dropped);
        let complaints = lifespan_complaints(&reviews);
        let stock = MarketClient::total_stock(&product);

        Ok(Analysis {
            nmid,
            root_id,
            reviews_count: reviews.len(),
            trust,
            clean,
            drops,
            lifespan_complaints: complaints,
            price,
            price_history,
            stock,
            product,
        })
    }
}
