//! The injected resolution function.

use crate::cancel::AbortSignal;
use crate::error::ResolveError;
use async_trait::async_trait;
use std::future::Future;

/// Turns track metadata into playable sources.
///
/// Implementations deliver their results themselves (cache write, callback, event);
/// the scheduler only looks at whether the call succeeded, failed, or was cancelled.
/// The signal must be observed before and periodically during expensive work, and a
/// fired signal should end the call promptly with [`ResolveError::Cancelled`].
#[async_trait]
pub trait Resolver<P>: Send + Sync
where
    P: Send + 'static,
{
    async fn resolve(&self, payload: P, signal: AbortSignal) -> Result<(), ResolveError>;
}

#[async_trait]
impl<P, F, Fut> Resolver<P> for F
where
    P: Send + 'static,
    F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ResolveError>> + Send + 'static,
{
    async fn resolve(&self, payload: P, signal: AbortSignal) -> Result<(), ResolveError> {
        (self)(payload, signal).await
    }
}
