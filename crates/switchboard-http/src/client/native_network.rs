use crate::client::config::ClientConfig;
use crate::client::utils::{is_access_denied_status, push_url};
use crate::error::{Result, TransportError};
use crate::traits::{CredentialProvider, PushConnection, PushTransport};
use crate::types::{Frame, Scope};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// WebSocket push transport.
pub struct WsTransport {
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialProvider>,
}

impl WsTransport {
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
        }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self, scope: &Scope) -> Result<Box<dyn PushConnection>> {
        let token = self.credentials.bearer_token();
        let url = push_url(&self.config.push_url, scope, token.as_deref())?;

        tracing::info!("[Push-Out] CONNECT {} channel={}", self.config.push_url, scope);

        let handshake = tokio::time::timeout(
            Duration::from_secs(self.config.connection_timeout_secs),
            connect_async(url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout)?;

        let (stream, response) = match handshake {
            Ok(value) => value,
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status().as_u16();
                if is_access_denied_status(status) {
                    self.credentials.report_expired();
                    return Err(TransportError::Unauthorized(status));
                }
                return Err(TransportError::Status {
                    status,
                    body: "push handshake rejected".to_string(),
                });
            }
            Err(e) => return Err(TransportError::WebSocket(e.to_string())),
        };

        tracing::debug!("[Push] Handshake status: {}", response.status());

        Ok(Box::new(WsConnection { stream }))
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Frame::Text(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(close))) => {
                    let frame = match close {
                        Some(close) => Frame::closed(u16::from(close.code), close.reason.to_string()),
                        // 1005: no status code present
                        None => Frame::closed(1005, ""),
                    };
                    return Ok(frame);
                }
                // Pings are answered by tungstenite on the next read
                Some(Ok(_)) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                    return Ok(Frame::closed(Frame::ABNORMAL_CLOSE, "stream ended"))
                }
                Some(Err(e)) => {
                    tracing::debug!("[Push] Read error: {}", e);
                    return Ok(Frame::closed(Frame::ABNORMAL_CLOSE, e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("[Push] Close handshake failed: {}", e);
        }
        let _ = self.stream.flush().await;
    }
}
