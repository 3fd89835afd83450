use crate::message::{Answer, DeliveryResult, IncomingMessage, OutgoingMessage, User};
use anyhow::Result;
use async_trait::async_trait;

/// The capability surface a platform adapter exposes to the dispatcher.
///
/// This is the complete set: the dispatcher proxies nothing beyond these
/// methods. Webhook parsing, signature verification and outbound HTTP all
/// live behind this trait.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the adapter has the credentials/config it needs. Unconfigured
    /// drivers are skipped at dispatch time.
    fn is_configured(&self) -> bool;

    /// The inbound messages parsed from the current webhook delivery.
    async fn messages(&self) -> Result<Vec<IncomingMessage>>;

    /// Whether the current delivery originates from a bot sender.
    fn is_bot(&self) -> bool;

    /// Derive the conversation answer for a message. Interactive drivers
    /// override this to surface button/quick-reply payloads.
    async fn conversation_answer(&self, message: &IncomingMessage) -> Result<Answer> {
        Ok(Answer::from_message(message))
    }

    /// Deliver an outbound payload in reply to `matching`.
    async fn reply(
        &self,
        payload: &OutgoingMessage,
        matching: &IncomingMessage,
    ) -> Result<DeliveryResult>;

    /// Resolve the platform user behind a message. Default: sender id only.
    async fn user(&self, message: &IncomingMessage) -> Result<User> {
        Ok(User::with_id(message.sender_id.clone()))
    }

    /// Send a typing indicator. Best-effort; default is a no-op for platforms
    /// without one.
    async fn types(&self, _message: &IncomingMessage) -> Result<()> {
        Ok(())
    }
}
