//! Durable message store: every intercepted message and its lifecycle.

mod model;
mod repository;

pub use model::{
    Direction, HeldStats, HeldSummary, InterceptState, InterceptedMessage, MessageId,
};
pub use repository::MessageRepository;
