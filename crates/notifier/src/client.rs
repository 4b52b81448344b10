//! Provider client trait and the WhatsApp Cloud API implementation.

use std::time::Duration;

use async_trait::async_trait;

use flock_common::config::AppConfig;

use crate::error::ProviderError;
use crate::request::{ProviderReceipt, ProviderRequest, WireSendResponse};

/// Outbound messaging provider. One call, one delivery attempt.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderReceipt, ProviderError>;
}

/// WhatsApp Cloud API client with bearer authentication.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    base_url: String,
    phone_number_id: String,
    token: String,
}

impl WhatsAppClient {
    pub fn new(
        base_url: impl Into<String>,
        phone_number_id: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.whatsapp_api_base_url,
            &config.whatsapp_phone_number_id,
            &config.whatsapp_api_token,
            Duration::from_secs(config.provider_timeout_secs),
        )
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }
}

#[async_trait]
impl ProviderClient for WhatsAppClient {
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderReceipt, ProviderError> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.token)
            .json(&request.to_wire())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Provider rejected message");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WireSendResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("{}: {}", e, body)))?;

        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| ProviderReceipt { message_id: m.id })
            .ok_or(ProviderError::MalformedResponse(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> WhatsAppClient {
        WhatsAppClient::new(server.uri(), "1234567890", "test-token", timeout).unwrap()
    }

    fn text_request() -> ProviderRequest {
        ProviderRequest::Text {
            to: "5511987654321".to_string(),
            body: "Olá Maria!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_returns_provider_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1234567890/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "5511987654321",
                "type": "text",
                "text": {"body": "Olá Maria!"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": "5511987654321", "wa_id": "5511987654321"}],
                "messages": [{"id": "wamid.HBgM"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client_for(&server, Duration::from_secs(5))
            .send(&text_request())
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "wamid.HBgM");
    }

    #[tokio::test]
    async fn test_template_request_reaches_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "type": "template",
                "template": {"name": "boas_vindas", "language": {"code": "pt_BR"}}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "wamid.T1"}]})),
            )
            .mount(&server)
            .await;

        let request = ProviderRequest::Template {
            to: "5511987654321".to_string(),
            template_name: "boas_vindas".to_string(),
            language: "pt_BR".to_string(),
            parameters: vec!["Maria".to_string()],
        };
        let receipt = client_for(&server, Duration::from_secs(5))
            .send(&request)
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "wamid.T1");
    }

    #[tokio::test]
    async fn test_error_status_surfaces_raw_body() {
        let server = MockServer::start().await;
        let error_body = r#"{"error":{"message":"(#131026) Message undeliverable","code":131026}}"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(error_body))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .send(&text_request())
            .await
            .unwrap_err();
        match err {
            ProviderError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, error_body);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_message_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .send(&text_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"messages": [{"id": "late"}]}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(200))
            .send(&text_request())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
