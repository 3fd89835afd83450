use crate::conversation::{
    ConversationHandle, ConversationState, ConversationStore, StepRef, conversation_id,
};
use crate::dispatch::Context;
use crate::middleware::MiddlewareStack;
use crate::pattern::{self, Captures, match_candidates};
use crate::router::{Interception, Router};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resumes stored continuations against new inbound messages.
pub struct ConversationRunner {
    store: Arc<ConversationStore>,
    middleware: Arc<MiddlewareStack>,
}

impl ConversationRunner {
    pub fn new(store: Arc<ConversationStore>, middleware: Arc<MiddlewareStack>) -> Self {
        Self { store, middleware }
    }

    /// Attempt to resume an active conversation with this message.
    ///
    /// Returns `true` when the message was consumed by a continuation. A
    /// message matching a skip/stop command is never consumed: the stored
    /// state is kept (skip) or evicted (stop) and routing proceeds normally.
    pub async fn try_resume(&self, ctx: Context, router: &Router) -> Result<bool> {
        let message = ctx.message().clone();
        let driver = Arc::clone(ctx.driver());
        if driver.is_bot() || message.from_bot {
            return Ok(false);
        }

        let id = conversation_id(&message.sender_id, &message.channel_id);
        let Some(state) = self.store.load(&id).await? else {
            return Ok(false);
        };

        let mut answer = driver.conversation_answer(&message).await?;
        let candidates = match_candidates(&message, &answer);

        match router.conversation_interception(driver.name(), &message, &candidates) {
            Some(Interception::Stop) => {
                debug!(conversation = %id, "Stop command matched; evicting conversation");
                self.store.delete(&id).await?;
                return Ok(false);
            }
            Some(Interception::Skip) => {
                debug!(conversation = %id, "Skip command matched; conversation kept");
                return Ok(false);
            }
            None => {}
        }

        let Some((step_ref, captures)) = pick_continuation(&state, &candidates) else {
            debug!(conversation = %id, "No continuation branch matched; conversation kept");
            return Ok(false);
        };

        self.middleware.apply_capturing(&mut answer, &message);
        let step = self.store.registry().resolve(&step_ref)?;

        let mut params = captures.to_values();
        params.extend(state.extra_params.iter().cloned());
        let handle = ConversationHandle::new(ctx, id.clone(), state.owner.clone());

        debug!(conversation = %id, step = %step_ref, "Resuming conversation");
        step.run(answer, params, handle).await?;

        let evicted = self.store.evict_if_unchanged(&id, state.revision).await?;
        if !evicted {
            debug!(
                conversation = %id,
                "Conversation was re-armed during resume; fresher state kept"
            );
        }
        Ok(true)
    }
}

/// Select the continuation for this message: a lone catch-all consumes
/// unconditionally; otherwise branches are evaluated in stored order with the
/// same matcher the router uses, first match wins.
fn pick_continuation(
    state: &ConversationState,
    candidates: &[String],
) -> Option<(StepRef, Captures)> {
    if let [only] = state.continuations.as_slice()
        && only.pattern.is_none()
    {
        return Some((only.step.clone(), Captures::empty()));
    }

    for stored in &state.continuations {
        match &stored.pattern {
            None => return Some((stored.step.clone(), Captures::empty())),
            Some(sub_pattern) => match pattern::compile(sub_pattern) {
                Ok(compiled) => {
                    if let Some(captures) =
                        compiled.match_first(candidates.iter().map(String::as_str))
                    {
                        return Some((stored.step.clone(), captures));
                    }
                }
                Err(e) => {
                    warn!(
                        "Stored sub-pattern '{}' failed to compile: {}",
                        sub_pattern, e
                    );
                }
            },
        }
    }
    None
}
