pub mod envelope;
pub mod records;
pub mod scope;
pub mod timestamp;

pub use envelope::{parse_envelope, Frame, PushEvent};
pub use records::{ConversationRecord, ConversationStatus, Direction, MessageRecord};
pub use scope::Scope;
