use crate::dispatch::Context;
use crate::errors::{HearsayError, HearsayResult};
use crate::message::{Answer, DeliveryResult, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

pub mod runner;
pub mod store;

pub use runner::ConversationRunner;
pub use store::{ConversationStore, DEFAULT_TTL_SECS, conversation_id};

/// Name of a pre-registered continuation step: `{conversation type, step}`.
///
/// Continuations are looked up through a [`StepRegistry`] at resume time;
/// executable code is never serialized into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef {
    pub conversation: String,
    pub step: String,
}

impl StepRef {
    pub fn new(conversation: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            step: step.into(),
        }
    }
}

impl std::fmt::Display for StepRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.conversation, self.step)
    }
}

/// The next step(s) a stored conversation resumes into.
#[derive(Debug, Clone)]
pub enum Continuations {
    /// One continuation, consuming whatever reply arrives.
    Single(StepRef),
    /// Ordered `(sub-pattern, step)` branches; the first matching branch wins.
    /// An empty pattern acts as a catch-all.
    Branches(Vec<(String, StepRef)>),
}

impl Continuations {
    pub(crate) fn to_stored(&self) -> Vec<StoredContinuation> {
        match self {
            Continuations::Single(step) => vec![StoredContinuation {
                pattern: None,
                step: step.clone(),
            }],
            Continuations::Branches(branches) => branches
                .iter()
                .map(|(pattern, step)| StoredContinuation {
                    pattern: if pattern.is_empty() {
                        None
                    } else {
                        Some(pattern.clone())
                    },
                    step: step.clone(),
                })
                .collect(),
        }
    }

    pub(crate) fn step_refs(&self) -> Vec<&StepRef> {
        match self {
            Continuations::Single(step) => vec![step],
            Continuations::Branches(branches) => branches.iter().map(|(_, s)| s).collect(),
        }
    }
}

impl From<StepRef> for Continuations {
    fn from(step: StepRef) -> Self {
        Continuations::Single(step)
    }
}

/// One serialized continuation entry inside [`ConversationState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContinuation {
    #[serde(default)]
    pub pattern: Option<String>,
    pub step: StepRef,
}

/// The cache payload for one suspended dialogue slot.
///
/// At most one state exists per conversation id; a `put` overwrites. The
/// `revision` is the optimistic token a resume compares before evicting, so a
/// handler that re-arms the same conversation during its own invocation is
/// not clobbered by the old resume's cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: String,
    pub continuations: Vec<StoredContinuation>,
    #[serde(default)]
    pub question: Option<OutgoingMessage>,
    #[serde(default)]
    pub extra_params: Vec<Value>,
    #[serde(default)]
    pub owner: Value,
    /// Epoch milliseconds of the write; metadata alongside `revision`.
    pub saved_at: i64,
    pub revision: Uuid,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

type StepFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A continuation step resumed when a matching reply arrives.
///
/// Fixed-arity contract: the answer comes first, extracted parameters in the
/// middle, and the owner-bound conversation handle last.
#[async_trait]
pub trait ConversationStep: Send + Sync + std::fmt::Debug {
    async fn run(
        &self,
        answer: Answer,
        params: Vec<Value>,
        conversation: ConversationHandle,
    ) -> Result<()>;
}

struct FnStep<F>(F);

impl<F> std::fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnStep")
    }
}

#[async_trait]
impl<F> ConversationStep for FnStep<F>
where
    F: Fn(Answer, Vec<Value>, ConversationHandle) -> StepFuture + Send + Sync,
{
    async fn run(
        &self,
        answer: Answer,
        params: Vec<Value>,
        conversation: ConversationHandle,
    ) -> Result<()> {
        (self.0)(answer, params, conversation).await
    }
}

/// Lookup table resolving [`StepRef`]s to executable steps.
///
/// Populated once at startup; an unknown ref is a configuration error raised
/// before any side effect.
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<StepRef, Arc<dyn ConversationStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_ref: StepRef, step: Arc<dyn ConversationStep>) {
        self.steps.insert(step_ref, step);
    }

    pub fn register_fn<F, Fut>(&mut self, step_ref: StepRef, f: F)
    where
        F: Fn(Answer, Vec<Value>, ConversationHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let wrapped = move |answer, params, conversation| -> StepFuture {
            Box::pin(f(answer, params, conversation))
        };
        self.steps.insert(step_ref, Arc::new(FnStep(wrapped)));
    }

    pub fn contains(&self, step_ref: &StepRef) -> bool {
        self.steps.contains_key(step_ref)
    }

    pub fn ensure(&self, step_ref: &StepRef) -> HearsayResult<()> {
        if self.contains(step_ref) {
            Ok(())
        } else {
            Err(HearsayError::Config(format!(
                "continuation step '{}' is not registered",
                step_ref
            )))
        }
    }

    pub fn resolve(&self, step_ref: &StepRef) -> HearsayResult<Arc<dyn ConversationStep>> {
        self.steps.get(step_ref).cloned().ok_or_else(|| {
            HearsayError::Config(format!(
                "continuation step '{}' is not registered",
                step_ref
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Owner-bound view of an active conversation, handed to a resumed step.
///
/// Carries the owner state exactly as it was stored, so inspection and
/// `repeat` observe consistent values regardless of cache churn in between.
pub struct ConversationHandle {
    ctx: Context,
    conversation_id: String,
    owner: Value,
}

impl ConversationHandle {
    pub(crate) fn new(ctx: Context, conversation_id: String, owner: Value) -> Self {
        Self {
            ctx,
            conversation_id,
            owner,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn owner(&self) -> &Value {
        &self.owner
    }

    /// Deserialize the owner state into a typed value.
    pub fn owner_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.owner.clone())?)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn say(&self, payload: impl Into<OutgoingMessage>) -> Result<DeliveryResult> {
        self.ctx.say(payload).await
    }

    /// Ask the next question and re-arm this conversation with (typically
    /// updated) owner state.
    pub async fn ask(
        &self,
        question: impl Into<OutgoingMessage>,
        next: impl Into<Continuations>,
        owner: Value,
    ) -> Result<()> {
        self.ctx.ask(question, next.into(), owner).await
    }

    /// Re-prompt after an invalid answer: reload the cached state for this
    /// conversation, deliver the (optionally substituted) question again and
    /// store the state afresh.
    pub async fn repeat(&self, question: Option<OutgoingMessage>) -> Result<()> {
        let store = self.ctx.store();
        let state = store
            .load(&self.conversation_id)
            .await?
            .ok_or_else(|| {
                HearsayError::Cache(format!(
                    "no active conversation to repeat for {}",
                    self.conversation_id
                ))
            })?;

        let question = question.or(state.question);
        if let Some(q) = &question {
            self.ctx.reply(q.clone()).await?;
        }
        store
            .save(
                &self.conversation_id,
                state.owner,
                state.continuations,
                question,
                state.extra_params,
                state.ttl_secs,
            )
            .await?;
        Ok(())
    }
}
