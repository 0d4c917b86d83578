use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{MessageTransport, TransportError};

/// Telegram Bot API client: outbound `sendMessage`, inbound `getUpdates` long polling.
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One inbound update; only text messages are of interest
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl TelegramTransport {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let payload: ApiResponse<T> = response.json().await?;
        match (payload.ok, payload.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Rejected(
                payload.description.unwrap_or_else(|| format!("HTTP {status}")),
            )),
        }
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_seconds`
    pub async fn get_updates(&self, offset: i64, timeout_seconds: u64) -> Result<Vec<Update>, TransportError> {
        let body = GetUpdates { offset, timeout: timeout_seconds, allowed_updates: ["message"] };
        // Give the HTTP request some headroom over the server-side poll window
        let timeout = Duration::from_secs(timeout_seconds + 10);
        self.call("getUpdates", &body, timeout).await
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send_message(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        if destination.trim().is_empty() {
            return Err(TransportError::InvalidDestination(destination.to_string()));
        }

        let body = SendMessage { chat_id: destination, text, disable_web_page_preview: true };
        let _: serde_json::Value = self.call("sendMessage", &body, Duration::from_secs(15)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_message_posts_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": "42", "text": "hello" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "ok": true, "result": { "message_id": 1 } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = TelegramTransport::new(server.uri(), "TOKEN").unwrap();
        transport.send_message("42", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_surfaces_api_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let transport = TelegramTransport::new(server.uri(), "TOKEN").unwrap();
        let err = transport.send_message("42", "hello").await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref d) if d.contains("blocked")));
    }

    #[tokio::test]
    async fn test_send_message_rejects_empty_destination() {
        let transport = TelegramTransport::new("http://127.0.0.1:9", "TOKEN").unwrap();
        let err = transport.send_message(" ", "hello").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidDestination(_)));
    }

    #[tokio::test]
    async fn test_get_updates_parses_text_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    { "update_id": 7, "message": { "chat": { "id": 99 }, "text": "/list" } },
                    { "update_id": 8, "edited_message": { "chat": { "id": 99 } } }
                ]
            })))
            .mount(&server)
            .await;

        let transport = TelegramTransport::new(server.uri(), "TOKEN").unwrap();
        let updates = transport.get_updates(7, 0).await.unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].update_id, 7);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 99);
        assert_eq!(message.text.as_deref(), Some("/list"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let transport = TelegramTransport::new("https://api.telegram.org/", "T").unwrap();
        assert_eq!(transport.endpoint("getMe"), "https://api.telegram.org/botT/getMe");
    }
}
