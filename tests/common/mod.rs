#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use hearsay::driver::Driver;
use hearsay::message::{Answer, DeliveryResult, IncomingMessage, OutgoingMessage};
use std::sync::{Arc, Mutex};

/// Test driver: hands out a queued batch per `listen` call and records every
/// outbound reply.
pub struct MockDriver {
    name: String,
    bot: bool,
    queue: Mutex<Vec<IncomingMessage>>,
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl MockDriver {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bot: false,
            queue: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn bot(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bot: true,
            queue: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, message: IncomingMessage) {
        self.queue.lock().expect("queue lock").push(message);
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn messages(&self) -> Result<Vec<IncomingMessage>> {
        Ok(self.queue.lock().expect("queue lock").drain(..).collect())
    }

    fn is_bot(&self) -> bool {
        self.bot
    }

    async fn conversation_answer(&self, message: &IncomingMessage) -> Result<Answer> {
        // Interactive payloads (button taps) arrive in the `callback` extra
        if let Some(value) = message.extra("callback") {
            Ok(Answer::from_interactive(message, value.clone()))
        } else {
            Ok(Answer::from_message(message))
        }
    }

    async fn reply(
        &self,
        payload: &OutgoingMessage,
        _matching: &IncomingMessage,
    ) -> Result<DeliveryResult> {
        self.sent.lock().expect("sent lock").push(payload.clone());
        Ok(DeliveryResult {
            message_id: Some(format!("m{}", self.sent_count())),
            payload: serde_json::Value::Null,
        })
    }
}

pub fn inbound(content: &str) -> IncomingMessage {
    IncomingMessage::new("telegram", "user1", "chat1", content)
}

pub fn inbound_from(sender: &str, channel: &str, content: &str) -> IncomingMessage {
    IncomingMessage::new("telegram", sender, channel, content)
}
