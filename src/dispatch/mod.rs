use crate::cache::ConversationCache;
use crate::config::Config;
use crate::conversation::{
    Continuations, ConversationRunner, ConversationStore, StepRegistry, conversation_id,
};
use crate::driver::Driver;
use crate::message::{DeliveryResult, IncomingMessage, OutgoingMessage, User};
use crate::middleware::{AppliedSet, Middleware, MiddlewareStack};
use crate::pattern::{Captures, match_candidates};
use crate::router::Router;
use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A registered command or fallback handler.
pub type Handler = Arc<dyn Fn(Context, Captures) -> HandlerFuture + Send + Sync>;

pub fn into_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, Captures) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, captures| Box::pin(f(ctx, captures)))
}

/// Handler-facing dispatch surface: the matched message plus the operations a
/// handler may perform through the active driver and the conversation store.
#[derive(Clone)]
pub struct Context {
    driver: Arc<dyn Driver>,
    store: Arc<ConversationStore>,
    middleware: Arc<MiddlewareStack>,
    config: Arc<Config>,
    message: IncomingMessage,
}

impl Context {
    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// The conversation slot this message belongs to.
    pub fn conversation_id(&self) -> String {
        conversation_id(&self.message.sender_id, &self.message.channel_id)
    }

    /// Send a payload in reply to the current message. Sending middleware is
    /// applied before the driver delivers.
    pub async fn say(&self, payload: impl Into<OutgoingMessage>) -> Result<DeliveryResult> {
        self.reply(payload.into()).await
    }

    pub async fn reply(&self, mut payload: OutgoingMessage) -> Result<DeliveryResult> {
        self.middleware.apply_sending(&mut payload, &self.message);
        self.driver.reply(&payload, &self.message).await
    }

    /// Best-effort typing indicator.
    pub async fn types(&self) -> Result<()> {
        self.driver.types(&self.message).await
    }

    pub async fn user(&self) -> Result<User> {
        self.driver.user(&self.message).await
    }

    /// Ask a question and suspend the dialogue until a reply arrives.
    ///
    /// Step refs are validated first, then the question is delivered, then
    /// the continuation state is stored under this message's conversation id.
    pub async fn ask(
        &self,
        question: impl Into<OutgoingMessage>,
        next: impl Into<Continuations>,
        owner: Value,
    ) -> Result<()> {
        self.ask_with(question, next, owner, Vec::new(), None).await
    }

    pub async fn ask_with(
        &self,
        question: impl Into<OutgoingMessage>,
        next: impl Into<Continuations>,
        owner: Value,
        extra_params: Vec<Value>,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        let next = next.into();
        for step_ref in next.step_refs() {
            self.store.registry().ensure(step_ref)?;
        }

        let question = question.into();
        self.reply(question.clone()).await?;
        self.store
            .store(
                &self.conversation_id(),
                owner,
                &next,
                Some(question),
                extra_params,
                ttl_secs,
            )
            .await
    }

    /// Store a conversation without sending a question first.
    pub async fn store_conversation(
        &self,
        owner: Value,
        next: impl Into<Continuations>,
        question: Option<OutgoingMessage>,
        extra_params: Vec<Value>,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        self.store
            .store(
                &self.conversation_id(),
                owner,
                &next.into(),
                question,
                extra_params,
                ttl_secs,
            )
            .await
    }
}

/// Summary of one `listen` call, for logging and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub messages: usize,
    pub resumed: usize,
    pub heard: usize,
    pub fallback: bool,
}

/// Orchestrates one inbound batch: resume stored conversations, route
/// unconsumed messages through the command registry, then fall back.
pub struct Dispatcher {
    driver: Arc<dyn Driver>,
    cache: Arc<dyn ConversationCache>,
    config: Arc<Config>,
    router: Router,
    middleware: Arc<MiddlewareStack>,
    store: Arc<ConversationStore>,
}

impl Dispatcher {
    pub fn new(
        driver: Arc<dyn Driver>,
        cache: Arc<dyn ConversationCache>,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(ConversationStore::new(
            Arc::clone(&cache),
            Arc::new(StepRegistry::new()),
            config.conversation.cache_time_secs,
        ));
        Self {
            driver,
            cache,
            config,
            router: Router::new(),
            middleware: Arc::new(MiddlewareStack::new()),
            store,
        }
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Install the continuation step registry.
    pub fn with_steps(mut self, registry: StepRegistry) -> Self {
        self.store = Arc::new(ConversationStore::new(
            Arc::clone(&self.cache),
            Arc::new(registry),
            self.config.conversation.cache_time_secs,
        ));
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        Arc::make_mut(&mut self.middleware).push(middleware);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn context_for(&self, message: IncomingMessage) -> Context {
        Context {
            driver: Arc::clone(&self.driver),
            store: Arc::clone(&self.store),
            middleware: Arc::clone(&self.middleware),
            config: Arc::clone(&self.config),
            message,
        }
    }

    /// Process one inbound batch to completion.
    ///
    /// Handler and continuation errors propagate uncaught; cache failures
    /// surface here rather than silently dropping conversation state.
    pub async fn listen(&self) -> Result<DispatchOutcome> {
        if !self.driver.is_configured() {
            debug!(driver = self.driver.name(), "Driver not configured; skipping dispatch");
            return Ok(DispatchOutcome::default());
        }

        let mut messages = self.driver.messages().await?;
        let bot_delivery = self.driver.is_bot();
        let mut outcome = DispatchOutcome {
            messages: messages.len(),
            ..DispatchOutcome::default()
        };

        let runner = ConversationRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.middleware),
        );

        // Phase 1: resume stored conversations.
        let mut consumed = vec![false; messages.len()];
        if !bot_delivery {
            for (i, message) in messages.iter().enumerate() {
                if message.from_bot {
                    continue;
                }
                let ctx = self.context_for(message.clone());
                if runner.try_resume(ctx, &self.router).await? {
                    consumed[i] = true;
                    outcome.resumed += 1;
                }
            }
        }

        // Phase 2: route unconsumed messages through the command registry.
        let mut applied = AppliedSet::new();
        for (i, message) in messages.iter_mut().enumerate() {
            if consumed[i] || bot_delivery || message.from_bot {
                continue;
            }
            self.middleware.apply_received(&[], message, &mut applied);
            for command in self.router.commands() {
                self.middleware
                    .apply_received(command.middleware(), message, &mut applied);
                if !command.constraints().allow(self.driver.name(), message) {
                    continue;
                }

                let answer = self.driver.conversation_answer(message).await?;
                let candidates = match_candidates(message, &answer);
                let base = command.matches_raw(&candidates);
                let matched = self.middleware.decide_match(
                    command.middleware(),
                    message,
                    command.pattern(),
                    base.is_some(),
                );
                if !matched {
                    continue;
                }

                debug!(
                    pattern = command.pattern(),
                    driver = self.driver.name(),
                    "Command matched"
                );
                let ctx = self.context_for(message.clone());
                let captures = base.unwrap_or_default();
                command.handler().as_ref()(ctx, captures).await?;
                outcome.heard += 1;
                break;
            }
        }

        // Phase 3: fallback.
        if outcome.heard == 0
            && outcome.resumed == 0
            && !bot_delivery
            && let Some(fallback) = self.router.fallback_handler()
            && let Some(first) = messages.first().filter(|m| !m.from_bot)
        {
            debug!("No command matched; invoking fallback");
            let ctx = self.context_for(first.clone());
            fallback.as_ref()(ctx, Captures::empty()).await?;
            outcome.fallback = true;
        }

        debug!(
            messages = outcome.messages,
            resumed = outcome.resumed,
            heard = outcome.heard,
            fallback = outcome.fallback,
            "Dispatch complete"
        );
        Ok(outcome)
    }
}
