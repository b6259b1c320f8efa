pub mod client;
pub mod error;
pub mod traits;
pub mod types;

pub use client::{ApiClient, ClientConfig, WsTransport};
pub use error::{Result, TransportError};
pub use traits::{ApiTransport, CredentialProvider, PushConnection, PushTransport, StaticToken};
pub use types::{
    ConversationRecord, ConversationStatus, Direction, Frame, MessageRecord, PushEvent, Scope,
};
