use crate::error::Result;
use crate::types::{ConversationRecord, Frame, MessageRecord, Scope};
use async_trait::async_trait;

/// Abstraction over the REST side of the backend.
#[async_trait]
pub trait ApiTransport: Send + Sync + 'static {
    async fn fetch_conversations(&self) -> Result<Vec<ConversationRecord>>;
    async fn fetch_messages(&self, conversation_id: u64) -> Result<Vec<MessageRecord>>;
    async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageRecord>;
}

/// Opens persistent push connections for a scope.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn connect(&self, scope: &Scope) -> Result<Box<dyn PushConnection>>;
}

/// One live push connection.
///
/// Dropping the connection releases it; `close` performs a clean shutdown.
#[async_trait]
pub trait PushConnection: Send {
    /// Wait for the next frame. A `Frame::Closed` is always the last frame.
    async fn next_frame(&mut self) -> Result<Frame>;
    async fn close(&mut self);
}

/// Supplies the bearer credential and receives expiry reports.
pub trait CredentialProvider: Send + Sync + 'static {
    fn bearer_token(&self) -> Option<String>;
    fn report_expired(&self);
}

/// Fixed token, for the console binary and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }

    fn report_expired(&self) {
        tracing::warn!("[Auth] Static credential rejected by server; restart with a fresh token");
    }
}
