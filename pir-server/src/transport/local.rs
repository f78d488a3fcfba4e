//! In-process transport.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{TopicHandler, TopicMessage, Transport, TransportError};

/// Response captured by [`LocalTransport`].
#[derive(Debug, Clone)]
pub struct SentResponse {
    pub to: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport delivering messages to handlers in the same process.
///
/// Responses are kept by request message id until taken.
#[derive(Default)]
pub struct LocalTransport {
    handlers: DashMap<String, Arc<dyn TopicHandler>>,
    responses: DashMap<String, SentResponse>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` on `topic` and wait for the handler; returns the message id.
    pub async fn deliver(
        &self,
        topic: &str,
        sender: &str,
        payload: Vec<u8>,
    ) -> Result<String, TransportError> {
        let handler = self
            .handlers
            .get(topic)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))?;

        let message = TopicMessage {
            topic: topic.to_string(),
            sender: sender.to_string(),
            message_id: Uuid::new_v4().to_string(),
            payload,
        };
        let message_id = message.message_id.clone();
        handler.on_message(message).await;
        Ok(message_id)
    }

    pub fn take_response(&self, message_id: &str) -> Option<SentResponse> {
        self.responses.remove(message_id).map(|(_, response)| response)
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn register_topic(
        &self,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<(), TransportError> {
        if topic.is_empty() {
            return Err(TransportError::Register("empty topic".to_string()));
        }
        self.handlers.insert(topic.to_string(), handler);
        tracing::debug!(topic = %topic, "Topic registered");
        Ok(())
    }

    async fn send_response(
        &self,
        request: &TopicMessage,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.responses.insert(
            request.message_id.clone(),
            SentResponse {
                to: request.sender.clone(),
                topic: request.topic.clone(),
                payload,
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("topics", &self.handlers.len())
            .field("pending_responses", &self.responses.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(std::sync::Weak<LocalTransport>);

    #[async_trait]
    impl TopicHandler for Echo {
        async fn on_message(&self, message: TopicMessage) {
            if let Some(transport) = self.0.upgrade() {
                let payload = message.payload.clone();
                transport.send_response(&message, payload).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_deliver_and_respond() {
        let transport = Arc::new(LocalTransport::new());
        transport
            .register_topic("agency/PIR/svc", Arc::new(Echo(Arc::downgrade(&transport))))
            .await
            .unwrap();

        let id = transport
            .deliver("agency/PIR/svc", "peer-1", b"ping".to_vec())
            .await
            .unwrap();
        let response = transport.take_response(&id).unwrap();
        assert_eq!(response.to, "peer-1");
        assert_eq!(response.payload, b"ping");
        assert!(transport.take_response(&id).is_none());
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let transport = LocalTransport::new();
        assert!(matches!(
            transport.deliver("nope", "peer", vec![]).await,
            Err(TransportError::UnknownTopic(_))
        ));
    }
}
