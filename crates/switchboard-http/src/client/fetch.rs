//! REST client for snapshot listings and message sends.

use crate::client::config::ClientConfig;
use crate::client::utils::{api_url, is_access_denied_status, unwrap_listing, unwrap_record};
use crate::error::{Result, TransportError};
use crate::traits::{ApiTransport, CredentialProvider};
use crate::types::{ConversationRecord, MessageRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// REST client for the messaging backend.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    pub config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_per_host as usize);

        if !config.proxy_url.is_empty() {
            if let Ok(proxy) = reqwest::Proxy::all(&config.proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(ApiClient {
            client,
            config: Arc::new(config),
            credentials,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        let response = self.authorize(builder).send().await?;
        let status = response.status().as_u16();

        if self.config.enable_logging {
            tracing::debug!("[Api] {} -> {}", url, status);
        }

        if is_access_denied_status(status) {
            self.credentials.report_expired();
            return Err(TransportError::Unauthorized(status));
        }

        let body = response.bytes().await?;
        if !(200..300).contains(&status) {
            let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            return Err(TransportError::Status {
                status,
                body: snippet,
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_listing<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = api_url(&self.config.base_url, path)?;
        let value = self.execute(self.client.get(url.clone()), url.as_str()).await?;
        unwrap_listing(value)?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(TransportError::from))
            .collect()
    }
}

#[async_trait]
impl ApiTransport for ApiClient {
    async fn fetch_conversations(&self) -> Result<Vec<ConversationRecord>> {
        self.get_listing("conversations").await
    }

    async fn fetch_messages(&self, conversation_id: u64) -> Result<Vec<MessageRecord>> {
        self.get_listing(&format!("conversations/{}/messages", conversation_id))
            .await
    }

    async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageRecord> {
        let url = api_url(
            &self.config.base_url,
            &format!("conversations/{}/messages", conversation_id),
        )?;
        let body = serde_json::json!({
            "content": content,
            "message_type": "outgoing",
        });
        let builder = self.client.post(url.clone()).json(&body);
        let value = self.execute(builder, url.as_str()).await?;
        let record: MessageRecord = serde_json::from_value(unwrap_record(value))?;
        if record.id.is_none() {
            return Err(TransportError::Malformed(
                "send response carried no message id".to_string(),
            ));
        }
        Ok(record)
    }
}
