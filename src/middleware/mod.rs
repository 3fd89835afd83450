use crate::message::{Answer, IncomingMessage, OutgoingMessage};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// An interceptor participating in one or more dispatch phases.
///
/// Implement only the phases you care about; the rest default to no-ops.
/// Execution is synchronous and in registration order.
pub trait Middleware: Send + Sync {
    /// Inbound normalization. Runs exactly once per distinct inbound message,
    /// regardless of how many commands are tested against it.
    fn received(&self, _message: &mut IncomingMessage) {}

    /// May override the match verdict for a command pattern. When several
    /// middlewares are registered the last one evaluated is authoritative.
    fn matching(&self, _message: &IncomingMessage, _pattern: &str, matched: bool) -> bool {
        matched
    }

    /// Applied when extracting an answer during an active conversation.
    fn capturing(&self, _answer: &mut Answer, _message: &IncomingMessage) {}

    /// Transforms an outbound payload before the driver delivers it.
    fn sending(&self, _payload: &mut OutgoingMessage, _message: &IncomingMessage) {}
}

fn identity(mw: &Arc<dyn Middleware>) -> usize {
    Arc::as_ptr(mw).cast::<()>() as usize
}

/// Ordered middleware entries plus the received-phase bookkeeping key.
///
/// The `(message id, middleware identity)` pair tracks which entries already
/// saw a given message instance, so the received phase stays idempotent while
/// commands contribute their own middleware mid-iteration.
pub type AppliedSet = HashSet<(Uuid, usize)>;

#[derive(Default, Clone)]
pub struct MiddlewareStack {
    entries: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.entries.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the received phase for every entry (global first, then the
    /// command's own) that has not yet seen this message instance.
    pub fn apply_received(
        &self,
        command_middleware: &[Arc<dyn Middleware>],
        message: &mut IncomingMessage,
        applied: &mut AppliedSet,
    ) {
        for mw in self.entries.iter().chain(command_middleware) {
            if applied.insert((message.id, identity(mw))) {
                mw.received(message);
            }
        }
    }

    /// Fold the matching phase over the base verdict. Every entry is
    /// evaluated; the last return value is authoritative.
    pub fn decide_match(
        &self,
        command_middleware: &[Arc<dyn Middleware>],
        message: &IncomingMessage,
        pattern: &str,
        base: bool,
    ) -> bool {
        let mut verdict = base;
        for mw in self.entries.iter().chain(command_middleware) {
            verdict = mw.matching(message, pattern, verdict);
        }
        verdict
    }

    pub fn apply_capturing(&self, answer: &mut Answer, message: &IncomingMessage) {
        for mw in &self.entries {
            mw.capturing(answer, message);
        }
    }

    pub fn apply_sending(&self, payload: &mut OutgoingMessage, message: &IncomingMessage) {
        for mw in &self.entries {
            mw.sending(payload, message);
        }
    }
}
