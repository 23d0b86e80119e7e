//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is held by the scheduler; resolvers only ever see the
//! read side, an [`AbortSignal`]. Triggering is one-way: once cancelled a token never
//! becomes live again.

use crate::error::ResolveError;
use std::future::Future;

/// Owner side of a cancellation pair.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the token. Later calls are no-ops.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: self.inner.clone(),
        }
    }
}

/// Observer side of a cancellation pair, handed to resolvers.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    inner: tokio_util::sync::CancellationToken,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Completes once the signal has fired (immediately if it already has).
    pub async fn aborted(&self) {
        self.inner.cancelled().await
    }

    /// `Err(ResolveError::Cancelled)` once the signal has fired.
    pub fn check(&self) -> Result<(), ResolveError> {
        if self.is_aborted() {
            Err(ResolveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the signal fires first, in which case `fut` is dropped.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, ResolveError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(ResolveError::Cancelled),
            value = fut => Ok(value),
        }
    }
}
