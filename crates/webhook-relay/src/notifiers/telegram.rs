use std::time::Duration;

use async_trait::async_trait;
use batch_aggregator::{
    sink::{BoxError, StatusNotifier},
    Recipient,
};
use relay_common::{telemetry::generate_http_client, ClientWithMiddleware};
use serde::{Deserialize, Serialize};

use crate::config::TelegramConfig;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Replies to the originating chat through the Telegram Bot API.
pub struct TelegramNotifier {
    client: ClientWithMiddleware,
    // Contains the bot token; never log it.
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: generate_http_client(timeout, false)?,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token.expose()
            ),
        })
    }

    /// Points the bot's webhook at `url` so Telegram starts delivering updates.
    #[tracing::instrument(skip(self), name = "telegram-set-webhook")]
    pub async fn set_webhook(&self, url: &str) -> Result<(), BoxError> {
        self.call("setWebhook", &SetWebhook { url }).await
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<(), BoxError> {
        let body = serde_json::to_vec(body)?;

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(redact)?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| e.without_url())?;
        let parsed = serde_json::from_slice::<TelegramResponse>(&body).ok();

        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(TelegramResponse {
                description: Some(description),
                ..
            }) => Err(format!("telegram responded with {}: {}", status, description).into()),
            _ => Err(format!("telegram responded with {}", status).into()),
        }
    }
}

fn redact(e: reqwest_middleware::Error) -> BoxError {
    match e {
        reqwest_middleware::Error::Reqwest(e) => Box::new(e.without_url()) as BoxError,
        e => Box::new(e) as BoxError,
    }
}

#[async_trait]
impl StatusNotifier for TelegramNotifier {
    #[tracing::instrument(skip(self, text), name = "notify-telegram")]
    async fn notify(&self, recipient: &Recipient, text: &str) -> Result<(), BoxError> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id: recipient.as_ref(),
                text,
            },
        )
        .await
    }
}
