use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Message, MessageType};
use crate::error::{Code, Error, Result};

/// Handles one inbound message type.
///
/// Returning an error schedules the message for another attempt after the
/// processor's retry interval.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered for message type {0}")]
    DuplicateHandler(MessageType),
    #[error("no handler registered for message type {0}")]
    HandlerNotFound(MessageType),
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        let code = match err {
            RegistryError::DuplicateHandler(_) => Code::Exists,
            RegistryError::HandlerNotFound(_) => Code::NotFound,
        };
        Error::new(code).with_message(err.to_string()).with_cause(err)
    }
}

/// Message type -> handler.
///
/// Filled in during setup, then shared read-only behind an `Arc`. The
/// registered types double as the processor's allow-list.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        message_type: impl Into<MessageType>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), RegistryError> {
        let message_type = message_type.into();
        if self.handlers.contains_key(&message_type) {
            return Err(RegistryError::DuplicateHandler(message_type));
        }
        self.handlers.insert(message_type, handler);
        Ok(())
    }

    pub fn get(&self, message_type: &MessageType) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(message_type)
    }

    /// Registered types, sorted.
    pub fn message_types(&self) -> Vec<MessageType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn dispatch(&self, message: &Message) -> Result<()> {
        let handler = self
            .get(&message.message_type)
            .ok_or_else(|| RegistryError::HandlerNotFound(message.message_type.clone()))?;
        handler.handle(message).await
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> Result<()> {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(message_type: &str) -> Message {
        Message::new("m1", message_type, b"{}".to_vec())
    }

    #[tokio::test]
    async fn dispatches_to_the_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut reg = HandlerRegistry::new();
        reg.register(
            "user.created",
            handler_fn(move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();

        reg.dispatch(&message("user.created")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_handler_is_not_found() {
        let reg = HandlerRegistry::new();
        let err = reg.dispatch(&message("user.deleted")).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert!(err.to_string().contains("user.deleted"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register("a", handler_fn(|_| async { Ok(()) })).unwrap();
        let err = reg.register("a", handler_fn(|_| async { Ok(()) })).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler(ref t) if t.as_str() == "a"));
        assert_eq!(Error::from(err).code(), Code::Exists);
    }

    #[test]
    fn message_types_are_sorted() {
        let mut reg = HandlerRegistry::new();
        reg.register("b", handler_fn(|_| async { Ok(()) })).unwrap();
        reg.register("a", handler_fn(|_| async { Ok(()) })).unwrap();
        assert_eq!(reg.message_types(), vec![MessageType::new("a"), MessageType::new("b")]);
        assert_eq!(reg.len(), 2);
    }
}
