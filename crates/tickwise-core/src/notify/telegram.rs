use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{Transport, TransportError, TransportFuture};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Delivers messages to one chat through the Telegram Bot API.
pub struct TelegramTransport {
    http: Arc<dyn HttpClient>,
    bot_token: String,
    chat_id: String,
    api_base: String,
}

impl TelegramTransport {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), bot_token, chat_id)
    }

    pub fn with_http_client(
        http: Arc<dyn HttpClient>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: TELEGRAM_API.to_owned(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    async fn send_message(&self, message: &str, timeout: Duration) -> Result<(), TransportError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: message,
            disable_web_page_preview: true,
        };
        let request = HttpRequest::post_json(self.api_url("sendMessage"), &body)
            .map_err(|e| TransportError::Request(e.to_string()))?
            .with_timeout(timeout);

        let response = self.http.execute(request).await.map_err(|e| {
            if e.timed_out() {
                TransportError::Timeout(timeout)
            } else {
                // reqwest errors can echo the URL, which carries the bot token.
                TransportError::Request(e.message().replace(&self.bot_token, "<redacted>"))
            }
        })?;

        if !response.is_success() {
            return Err(TransportError::Rejected {
                status: response.status,
                body: response.body.chars().take(200).collect(),
            });
        }
        Ok(())
    }
}

impl Transport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send<'a>(&'a self, message: &'a str, timeout: Duration) -> TransportFuture<'a> {
        Box::pin(self.send_message(message, timeout))
    }
}
