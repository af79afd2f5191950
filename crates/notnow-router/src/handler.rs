//! Handlers bound to outbound channels.

use std::future::Future;

use async_trait::async_trait;
use notnow_core::{InboundSender, PortError};
use serde_json::Value;
use thiserror::Error;

/// Error returned by a port handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap any error as a handler failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Box::new(err))
    }
}

/// Trait for handlers of outbound channel payloads.
///
/// `send` delivers on any inbound channel of the same instance.
#[async_trait]
pub trait PortHandler: Send + Sync {
    async fn handle(&self, payload: Value, send: InboundSender) -> Result<(), HandlerError>;
}

/// Handler built from an async closure.
pub struct FnHandler<F>(F);

/// Adapt an async closure into a [`PortHandler`].
pub const fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value, InboundSender) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> PortHandler for FnHandler<F>
where
    F: Fn(Value, InboundSender) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, payload: Value, send: InboundSender) -> Result<(), HandlerError> {
        (self.0)(payload, send).await
    }
}
