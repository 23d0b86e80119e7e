//! The serial drain loop.
//!
//! One task per scheduler at most. It runs while there is pending work and a
//! registered resolver, invoking the resolver for one entry at a time and pausing
//! for the configured inter-item delay between invocations.

use super::state::{Completion, NextStep};
use super::Inner;
use crate::error::ResolveError;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

type Outcome = Result<Result<(), ResolveError>, Box<dyn Any + Send>>;

/// Owns the Draining state for one drain task.
///
/// Created before the task is spawned, so the state is released even if the task
/// is dropped unpolled (runtime shut down) or unwinds (panicking event sink).
pub(crate) struct DrainGuard<P: Clone + Send + 'static> {
    inner: Arc<Inner<P>>,
    armed: bool,
}

impl<P: Clone + Send + 'static> DrainGuard<P> {
    pub fn new(inner: Arc<Inner<P>>) -> Self {
        Self { inner, armed: true }
    }

    /// The loop left through `next_step`, which already went Idle under the lock.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<P: Clone + Send + 'static> Drop for DrainGuard<P> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Resolution drain exited abnormally; returning to idle");
            let events = {
                let mut state = self.inner.state.lock();
                state.stop_drain();
                state.take_events()
            };
            // A second panic while unwinding would abort the process.
            if !std::thread::panicking() {
                self.inner.events.emit_all(events);
            }
        }
        self.inner.idle.notify_waiters();
    }
}

pub(crate) async fn drain<P>(mut guard: DrainGuard<P>)
where
    P: Clone + Send + 'static,
{
    let inner = Arc::clone(&guard.inner);
    info!("Resolution drain started");
    let delay = inner.config.inter_item_delay();
    let mut processed = 0u64;

    loop {
        let (next, resolver) = match inner.with_state(|state| state.next_step()) {
            NextStep::Run(next, resolver) => (next, resolver),
            NextStep::Stop => {
                guard.disarm();
                break;
            }
        };

        // Aborted between selection and dispatch: move on without charging the delay.
        let Some(dispatch) = inner.with_state(|state| state.begin(next)) else {
            continue;
        };

        debug!(
            track_key = %dispatch.track_key,
            seq = dispatch.seq,
            "Dispatching track to resolver"
        );
        let started = Instant::now();
        let outcome: Outcome =
            AssertUnwindSafe(resolver.resolve(dispatch.payload, dispatch.signal))
                .catch_unwind()
                .await;
        let completion = classify(&dispatch.track_key, outcome, started.elapsed());

        let current = inner.with_state(|state| {
            state.complete(&dispatch.track_key, dispatch.seq, completion)
        });
        if !current {
            debug!(
                track_key = %dispatch.track_key,
                "Discarded result for track aborted during resolution"
            );
        }
        processed += 1;

        sleep(delay).await;
    }

    info!(processed, "Resolution drain stopped");
}

fn classify(track_key: &str, outcome: Outcome, elapsed: Duration) -> Completion {
    match outcome {
        Ok(Ok(())) => {
            debug!(
                track_key = %track_key,
                duration_ms = elapsed.as_millis(),
                "Track resolved"
            );
            Completion::Resolved {
                duration_ms: elapsed.as_millis() as u64,
            }
        }
        Ok(Err(err)) if err.is_cancellation() => {
            debug!(track_key = %track_key, "Track resolution cancelled");
            Completion::Cancelled
        }
        Ok(Err(err)) => {
            warn!(
                track_key = %track_key,
                error_kind = err.kind(),
                error = %err,
                duration_ms = elapsed.as_millis(),
                "Track resolution failed"
            );
            Completion::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }
        }
        Err(panic) => {
            let err = ResolveError::Panicked(panic_message(panic.as_ref()));
            error!(track_key = %track_key, error = %err, "Resolver panicked");
            Completion::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(no message)".to_string())
}
