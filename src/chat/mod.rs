pub mod commands;
pub mod dispatch;
pub mod messages;
pub mod outbound;
pub mod types;

pub use dispatch::ChatService;
pub use outbound::{OutboundClient, OutboundError};
pub use types::{ChatUpdate, ReplyAction, UpdatePayload};
