//! Message transport capability
//!
//! Services are exposed on topics; a topic handler receives each message and
//! answers the sender through [`Transport::send_response`].

mod local;

pub use local::{LocalTransport, SentResponse};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No handler registered for topic {0}")]
    UnknownTopic(String),

    #[error("Topic registration failed: {0}")]
    Register(String),

    #[error("Failed to send response: {0}")]
    Send(String),
}

/// Inbound message on a topic.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub topic: String,
    /// Address responses are sent back to
    pub sender: String,
    pub message_id: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn on_message(&self, message: TopicMessage);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Route messages on `topic` to `handler`, replacing any previous handler.
    async fn register_topic(
        &self,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<(), TransportError>;

    /// Answer `request` with `payload`.
    async fn send_response(
        &self,
        request: &TopicMessage,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;
}
