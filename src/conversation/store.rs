use crate::cache::ConversationCache;
use crate::conversation::{
    Continuations, ConversationState, StepRegistry, StoredContinuation,
};
use crate::errors::HearsayError;
use crate::message::OutgoingMessage;
use anyhow::{Context as _, Result};
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Built-in conversation TTL, used when neither the conversation nor the
/// configuration defines one.
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Deterministic identifier for one dialogue slot: a SHA-256 digest over the
/// `(sender, channel)` pair. Distinct pairs never collide under ordinary
/// hashing.
pub fn conversation_id(sender_id: &str, channel_id: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", sender_id, channel_id).as_bytes());
    hex::encode(digest)
}

/// Serializes, persists and evicts conversation state through the cache seam.
pub struct ConversationStore {
    cache: Arc<dyn ConversationCache>,
    registry: Arc<StepRegistry>,
    default_ttl_secs: u64,
}

impl ConversationStore {
    pub fn new(
        cache: Arc<dyn ConversationCache>,
        registry: Arc<StepRegistry>,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            cache,
            registry,
            default_ttl_secs,
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// TTL precedence: conversation-defined > configured default > built-in.
    pub fn effective_ttl(&self, ttl_secs: Option<u64>) -> u64 {
        ttl_secs.unwrap_or(self.default_ttl_secs)
    }

    /// Persist a conversation. Every step ref is validated against the
    /// registry before anything is written.
    pub async fn store(
        &self,
        conversation_id: &str,
        owner: Value,
        next: &Continuations,
        question: Option<OutgoingMessage>,
        extra_params: Vec<Value>,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        for step_ref in next.step_refs() {
            self.registry.ensure(step_ref)?;
        }
        self.save(
            conversation_id,
            owner,
            next.to_stored(),
            question,
            extra_params,
            ttl_secs,
        )
        .await
    }

    pub(crate) async fn save(
        &self,
        conversation_id: &str,
        owner: Value,
        continuations: Vec<StoredContinuation>,
        question: Option<OutgoingMessage>,
        extra_params: Vec<Value>,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        for stored in &continuations {
            self.registry.ensure(&stored.step)?;
        }

        let state = ConversationState {
            conversation_id: conversation_id.to_string(),
            continuations,
            question,
            extra_params,
            owner,
            saved_at: Utc::now().timestamp_millis(),
            revision: Uuid::new_v4(),
            ttl_secs,
        };
        let ttl = Duration::from_secs(self.effective_ttl(ttl_secs));
        let value =
            serde_json::to_value(&state).context("Failed to serialize conversation state")?;
        self.cache
            .put(conversation_id, value, ttl)
            .await
            .map_err(|e| HearsayError::Cache(e.to_string()))?;
        debug!(
            conversation = %conversation_id,
            ttl_secs = ttl.as_secs(),
            steps = state.continuations.len(),
            "Stored conversation"
        );
        Ok(())
    }

    pub async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        let Some(value) = self
            .cache
            .get(conversation_id)
            .await
            .map_err(|e| HearsayError::Cache(e.to_string()))?
        else {
            return Ok(None);
        };
        let state = serde_json::from_value(value).map_err(|e| {
            HearsayError::Cache(format!(
                "malformed conversation state for {}: {}",
                conversation_id, e
            ))
        })?;
        Ok(Some(state))
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.cache
            .pull(conversation_id)
            .await
            .map_err(|e| HearsayError::Cache(e.to_string()))?;
        Ok(())
    }

    /// Evict the entry only if its revision is still the one that was read.
    /// A fresher write (the handler re-armed the conversation) is left
    /// untouched. Returns whether the entry was evicted.
    pub async fn evict_if_unchanged(
        &self,
        conversation_id: &str,
        revision: Uuid,
    ) -> Result<bool> {
        if let Some(current) = self.load(conversation_id).await?
            && current.revision == revision
        {
            self.delete(conversation_id).await?;
            return Ok(true);
        }
        Ok(false)
    }
}
