use crate::dispatch::{Context, Handler, into_handler};
use crate::message::{ChannelKind, IncomingMessage};
use crate::middleware::Middleware;
use crate::pattern::{self, Captures, CompiledPattern};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Where a command is allowed to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelScope {
    Any,
    Direct,
    Public,
    /// Exact channel id.
    Id(String),
}

impl ChannelScope {
    pub fn allows(&self, message: &IncomingMessage) -> bool {
        match self {
            ChannelScope::Any => true,
            ChannelScope::Direct => message.channel_kind == ChannelKind::Direct,
            ChannelScope::Public => message.channel_kind == ChannelKind::Public,
            ChannelScope::Id(id) => message.channel_id == *id,
        }
    }
}

/// Per-command constraints. A mismatch is a non-match, never an error.
#[derive(Debug, Clone)]
pub struct Constraints {
    pub drivers: Option<Vec<String>>,
    pub channel: ChannelScope,
    pub skips_conversation: bool,
    pub stops_conversation: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            drivers: None,
            channel: ChannelScope::Any,
            skips_conversation: false,
            stops_conversation: false,
        }
    }
}

impl Constraints {
    pub fn allow(&self, driver_name: &str, message: &IncomingMessage) -> bool {
        if let Some(drivers) = &self.drivers
            && !drivers.iter().any(|d| d.eq_ignore_ascii_case(driver_name))
        {
            return false;
        }
        self.channel.allows(message)
    }
}

/// One registered route: pattern, handler and constraints.
///
/// Returned by [`Router::hears`] for builder-style chaining; read-only once
/// dispatch starts.
pub struct Command {
    pattern: String,
    compiled: Option<CompiledPattern>,
    handler: Handler,
    constraints: Constraints,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Command {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn compiled(&self) -> Option<&CompiledPattern> {
        self.compiled.as_ref()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Restrict this command to the named drivers.
    pub fn for_drivers<I, S>(&mut self, drivers: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.drivers = Some(drivers.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_channel(&mut self, scope: ChannelScope) -> &mut Self {
        self.constraints.channel = scope;
        self
    }

    /// Fire even while a conversation is active, leaving its state intact.
    pub fn skips_conversation(&mut self) -> &mut Self {
        self.constraints.skips_conversation = true;
        self
    }

    /// Fire even while a conversation is active and evict its state.
    pub fn stops_conversation(&mut self) -> &mut Self {
        self.constraints.stops_conversation = true;
        self
    }

    pub fn with_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Raw pattern match against the candidate texts, without the
    /// matching-phase middleware override.
    pub(crate) fn matches_raw(&self, candidates: &[String]) -> Option<Captures> {
        self.compiled
            .as_ref()
            .and_then(|p| p.match_first(candidates.iter().map(String::as_str)))
    }
}

/// Default constraints applied to every command registered inside a
/// [`Router::group`] block.
#[derive(Default, Clone)]
pub struct GroupAttributes {
    pub drivers: Option<Vec<String>>,
    pub channel: Option<ChannelScope>,
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl GroupAttributes {
    pub fn for_drivers<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drivers = Some(drivers.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_channel(mut self, scope: ChannelScope) -> Self {
        self.channel = Some(scope);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

/// How an active conversation reacts to a message that also matches a
/// skip/stop command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interception {
    Skip,
    Stop,
}

/// Registry of commands, tried in registration order at dispatch time.
///
/// Group defaults live on an explicit stack owned by this value; registration
/// takes `&mut self` and is meant to happen once at startup, not concurrently.
#[derive(Default)]
pub struct Router {
    commands: Vec<Command>,
    fallback: Option<Handler>,
    group_stack: Vec<GroupAttributes>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. The innermost active group's defaults are merged
    /// into the new command's constraints; an invalid pattern is kept as a
    /// never-matching command and logged.
    pub fn hears<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Command
    where
        F: Fn(Context, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let compiled = match pattern::compile(pattern) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!("Command pattern '{}' failed to compile: {}", pattern, e);
                None
            }
        };

        let mut constraints = Constraints::default();
        let mut middleware = Vec::new();
        for group in &self.group_stack {
            if let Some(drivers) = &group.drivers {
                constraints.drivers = Some(drivers.clone());
            }
            if let Some(channel) = &group.channel {
                constraints.channel = channel.clone();
            }
            middleware.extend(group.middleware.iter().cloned());
        }

        self.commands.push(Command {
            pattern: pattern.to_string(),
            compiled,
            handler: into_handler(handler),
            constraints,
            middleware,
        });
        self.commands.last_mut().expect("command just pushed")
    }

    /// Register commands under shared default constraints. The attributes
    /// apply only inside `f`; afterwards the previous defaults are restored.
    pub fn group(&mut self, attrs: GroupAttributes, f: impl FnOnce(&mut Router)) {
        self.group_stack.push(attrs);
        f(self);
        self.group_stack.pop();
    }

    /// Register the handler invoked when nothing matched and no conversation
    /// was active.
    pub fn fallback<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Context, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.fallback = Some(into_handler(handler));
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn fallback_handler(&self) -> Option<&Handler> {
        self.fallback.as_ref()
    }

    /// First matching skip/stop command for this message, if any. Used by the
    /// conversation runner before it consumes a message.
    pub(crate) fn conversation_interception(
        &self,
        driver_name: &str,
        message: &IncomingMessage,
        candidates: &[String],
    ) -> Option<Interception> {
        for command in &self.commands {
            let flags = &command.constraints;
            if !flags.skips_conversation && !flags.stops_conversation {
                continue;
            }
            if !flags.allow(driver_name, message) {
                continue;
            }
            if command.matches_raw(candidates).is_some() {
                return Some(if flags.stops_conversation {
                    Interception::Stop
                } else {
                    Interception::Skip
                });
            }
        }
        None
    }
}
