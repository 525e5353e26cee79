use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::error::BotError;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// Single URL button, the only layout the bot uses.
    pub fn url_button(text: &str, url: &str) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: text.to_string(),
                url: url.to_string(),
            }]],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

/// Thin Bot API client: long-poll `getUpdates` plus HTML `sendMessage`.
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, BotError> {
        // requests must outlive the server-side long-poll hold
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T, P>(&self, method: &str, payload: &P) -> Result<T, BotError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            // the URL embeds the token; never let it reach a log line
            .map_err(|e| BotError::TelegramError {
                method: method.to_string(),
                reason: e.without_url().to_string(),
            })?;
        let body: ApiResponse<T> = response.json().await.map_err(|e| BotError::TelegramError {
            method: method.to_string(),
            reason: e.without_url().to_string(),
        })?;
        if !body.ok {
            return Err(BotError::TelegramError {
                method: method.to_string(),
                reason: body
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }
        body.result.ok_or_else(|| BotError::TelegramError {
            method: method.to_string(),
            reason: "ok response without result".to_string(),
        })
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, BotError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_deserializes_with_missing_fields() {
        let raw = r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5}}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 10);
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 5);
        assert!(message.from.is_none());
        assert!(message.text.is_none());
    }

    #[test]
    fn non_message_updates_are_tolerated() {
        let raw = r#"{"update_id": 11, "edited_message": {"message_id": 2}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn api_error_shape_deserializes() {
        let raw = r#"{"ok": false, "description": "Bad Request: chat not found"}"#;
        let body: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!body.ok);
        assert!(body.result.is_none());
        assert_eq!(body.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[test]
    fn keyboard_serializes_to_bot_api_shape() {
        let markup = InlineKeyboardMarkup::url_button("Открыть", "https://example.com");
        let value = serde_json::to_value(&markup).unwrap();
        assert_eq!(value["inline_keyboard"][0][0]["text"], "Открыть");
        assert_eq!(value["inline_keyboard"][0][0]["url"], "https://example.com");
    }
}
