//! Twilio messaging client.
//!
//! The notifier depends on the [`MessagingClient`] trait, not on this
//! concrete implementation, so the variant-fallback policy is testable
//! without any network access.

use crate::config::TwilioConfig;
use async_trait::async_trait;
use serde::Deserialize;

/// Receipt returned by the provider for an accepted message.
#[derive(Debug, Clone)]
pub struct MessageReceipt {
    /// Provider message SID.
    pub sid: String,
    /// Initial provider status (`queued`, `sent`, ...).
    pub status: String,
}

/// Delivery status fetched after a send, used for best-effort confirmation.
#[derive(Debug, Clone)]
pub struct MessageStatus {
    /// Current provider status.
    pub status: String,
    /// Provider error code, when delivery failed downstream.
    pub error_code: Option<i64>,
    /// Provider error message, when delivery failed downstream.
    pub error_message: Option<String>,
}

/// A provider-level send failure, before the notifier classifies it.
///
/// `code` carries Twilio's numeric error code when the response body
/// included one (e.g. 21211 for an invalid `To` number).
#[derive(Debug, Clone, thiserror::Error)]
#[error("twilio error: {message}")]
pub struct ProviderError {
    /// Twilio error code, when present.
    pub code: Option<i64>,
    /// Human-readable failure description.
    pub message: String,
}

impl ProviderError {
    /// A transport-level failure with no provider error code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

/// Messaging provider contract. The notifier only needs send and a
/// follow-up status query.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send a text message from `from` to `to`.
    async fn send(&self, body: &str, from: &str, to: &str)
    -> Result<MessageReceipt, ProviderError>;

    /// Fetch the delivery status of a previously sent message.
    async fn fetch_status(&self, sid: &str) -> Result<MessageStatus, ProviderError>;
}

/// Twilio REST API client.
#[derive(Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn require_credentials(&self) -> Result<(), ProviderError> {
        if self.account_sid.trim().is_empty() || self.auth_token.trim().is_empty() {
            return Err(ProviderError::transport(
                "missing Twilio configuration: TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN must be set",
            ));
        }
        Ok(())
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    fn message_url(&self, sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages/{}.json",
            self.base_url, self.account_sid, sid
        )
    }
}

/// Turn a non-success Twilio response into a [`ProviderError`], preferring
/// the structured `{code, message}` body when it parses.
async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api) if api.code.is_some() || api.message.is_some() => ProviderError {
            code: api.code,
            message: api
                .message
                .unwrap_or_else(|| format!("twilio request failed ({status})")),
        },
        _ => ProviderError::transport(format!("twilio request failed ({status}): {body}")),
    }
}

#[async_trait]
impl MessagingClient for TwilioClient {
    async fn send(
        &self,
        body: &str,
        from: &str,
        to: &str,
    ) -> Result<MessageReceipt, ProviderError> {
        self.require_credentials()?;

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Body", body), ("From", from), ("To", to)])
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("twilio send failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("cannot parse twilio response: {e}")))?;

        Ok(MessageReceipt {
            sid: parsed.sid,
            status: parsed.status,
        })
    }

    async fn fetch_status(&self, sid: &str) -> Result<MessageStatus, ProviderError> {
        self.require_credentials()?;

        let response = self
            .client
            .get(self.message_url(sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("twilio status fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("cannot parse twilio status: {e}")))?;

        Ok(MessageStatus {
            status: parsed.status,
            error_code: parsed.error_code,
            error_message: parsed.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TwilioClient {
        TwilioClient::new(&TwilioConfig {
            base_url: server.uri(),
            account_sid: "AC123".to_owned(),
            auth_token: "secret".to_owned(),
            ..TwilioConfig::default()
        })
    }

    #[tokio::test]
    async fn send_parses_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM1",
                "status": "queued"
            })))
            .mount(&server)
            .await;

        let receipt = client_for(&server)
            .send("hello", "whatsapp:+15550001111", "whatsapp:+15552223333")
            .await
            .expect("send succeeds");
        assert_eq!(receipt.sid, "SM1");
        assert_eq!(receipt.status, "queued");
    }

    #[tokio::test]
    async fn send_surfaces_structured_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number.",
                "status": 400
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send("hello", "+1", "+2")
            .await
            .expect_err("send fails");
        assert_eq!(err.code, Some(21211));
        assert!(err.message.contains("not a valid phone number"));
    }

    #[tokio::test]
    async fn send_without_credentials_is_a_config_failure() {
        let client = TwilioClient::new(&TwilioConfig::default());
        let err = client.send("hi", "a", "b").await.expect_err("must fail");
        assert!(err.code.is_none());
        assert!(err.message.contains("missing Twilio configuration"));
    }

    #[tokio::test]
    async fn fetch_status_parses_delivery_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2010-04-01/Accounts/AC123/Messages/SM1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "undelivered",
                "error_code": 63016,
                "error_message": "Failed to send freeform message"
            })))
            .mount(&server)
            .await;

        let status = client_for(&server)
            .fetch_status("SM1")
            .await
            .expect("status fetch succeeds");
        assert_eq!(status.status, "undelivered");
        assert_eq!(status.error_code, Some(63016));
    }
}
