use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Request, Response};
use crate::error::TransportError;

/// The raw network collaborator the pipeline wraps.
///
/// Implementations decide what counts as success; any `Err` is treated as a
/// retryable attempt failure, timeouts included.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}
