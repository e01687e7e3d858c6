use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::domain::types::{DEFAULT_MAX_ATTEMPTS, OutboxEvent};

/// Outcome of a failed handler run.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Worth retrying after backoff (network, upstream 5xx, timeouts).
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
    /// Will never succeed (malformed payload, unknown topic). Dead-lettered at once.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Side effect for one topic. Must be safe to run more than once for the same event.
pub trait EventHandler: Send + Sync {
    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> BoxFuture<'a, Result<(), HandlerError>>;
}

struct Registration {
    handler: Arc<dyn EventHandler>,
    max_attempts: u32,
}

/// Topic to handler mapping, built once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, topic: impl Into<String>, handler: impl EventHandler + 'static) -> Self {
        self.register_with_max_attempts(topic, handler, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn register_with_max_attempts(
        mut self,
        topic: impl Into<String>,
        handler: impl EventHandler + 'static,
        max_attempts: u32,
    ) -> Self {
        self.handlers.insert(
            topic.into(),
            Registration {
                handler: Arc::new(handler),
                max_attempts: max_attempts.max(1),
            },
        );
        self
    }

    pub fn get(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(topic).map(|r| Arc::clone(&r.handler))
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Registered topics in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Retry budget stamped onto newly enqueued events of `topic`.
    pub fn max_attempts_for(&self, topic: &str) -> u32 {
        self.handlers
            .get(topic)
            .map_or(DEFAULT_MAX_ATTEMPTS, |r| r.max_attempts)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("topics", &self.topics().collect::<Vec<_>>())
            .finish()
    }
}
