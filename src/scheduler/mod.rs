//! Resolution Scheduler
//!
//! Priority-ordered, cancellable work queue that decides which track to resolve next
//! across every active visibility surface. Surfaces register a context, report what
//! is visible, and the scheduler derives the enqueue/abort diff. A single drain task
//! hands one entry at a time to the injected [`Resolver`], throttled by a fixed
//! inter-item delay.
//!
//! All operations are synchronous and never fail on unknown context ids or track
//! keys; they are meant to be called straight from UI callbacks.

mod processor;
mod state;

pub use state::{HoverPointer, NextTrack};

use crate::cancel::AbortSignal;
use crate::config::SchedulerConfig;
use crate::context::{AbortContextOptions, ContextKind, ContextOptions};
use crate::error::{SchedulerError, SchedulerResult};
use crate::events::{EventEmitter, EventSink, SchedulerStats};
use crate::resolver::Resolver;
use crate::types::{ContextId, TrackKey, VisibleTrack};
use parking_lot::Mutex;
use state::SchedulerState;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub(crate) struct Inner<P: Send + 'static> {
    state: Mutex<SchedulerState<P>>,
    config: SchedulerConfig,
    events: EventEmitter,
    /// Signalled whenever the drain task goes idle.
    idle: Notify,
    runtime: Option<Handle>,
}

impl<P: Clone + Send + 'static> Inner<P> {
    /// Run `f` under the state lock, then emit whatever events it recorded.
    fn with_state<R>(&self, f: impl FnOnce(&mut SchedulerState<P>) -> R) -> R {
        let (result, events) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, state.take_events())
        };
        self.events.emit_all(events);
        result
    }
}

/// Start the drain task if the scheduler is idle and has work plus a resolver.
fn wake<P: Clone + Send + 'static>(inner: &Arc<Inner<P>>) {
    if !inner.with_state(|state| state.try_start_drain()) {
        return;
    }
    // The ambient runtime wins; an explicit handle covers callers outside any runtime.
    match Handle::try_current().ok().or_else(|| inner.runtime.clone()) {
        Some(handle) => {
            let guard = processor::DrainGuard::new(Arc::clone(inner));
            handle.spawn(processor::drain(guard));
        }
        None => {
            warn!("No tokio runtime available; resolution drain stays idle");
            inner.with_state(|state| state.stop_drain());
            inner.idle.notify_waiters();
        }
    }
}

/// Handle to a resolution scheduler. Cloning shares the same scheduler.
pub struct ResolutionScheduler<P: Send + 'static> {
    inner: Arc<Inner<P>>,
}

impl<P: Send + 'static> Clone for ResolutionScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Clone + Send + 'static> Default for ResolutionScheduler<P> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<P: Clone + Send + 'static> ResolutionScheduler<P> {
    /// Create a scheduler. The drain task runs on whichever tokio runtime is current
    /// when work arrives.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::build(config, None, None)
    }

    /// Create a scheduler that reports lifecycle events to `sink`.
    pub fn with_event_sink(config: SchedulerConfig, sink: impl EventSink + 'static) -> Self {
        Self::build(config, Some(Box::new(sink)), None)
    }

    /// Create a scheduler whose drain task falls back to `runtime` when called from
    /// outside any runtime (e.g. a UI thread).
    pub fn with_runtime(
        config: SchedulerConfig,
        sink: Option<Box<dyn EventSink>>,
        runtime: Handle,
    ) -> Self {
        Self::build(config, sink, Some(runtime))
    }

    fn build(
        config: SchedulerConfig,
        sink: Option<Box<dyn EventSink>>,
        runtime: Option<Handle>,
    ) -> Self {
        let events = EventEmitter::new(sink);
        let state = SchedulerState::new(config.default_playback_lookahead, events.is_enabled());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                config,
                events,
                idle: Notify::new(),
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Register (or replace) the resolve function and start draining pending work.
    pub fn set_resolver(&self, resolver: impl Resolver<P> + 'static) {
        let resolver: Arc<dyn Resolver<P>> = Arc::new(resolver);
        self.inner
            .with_state(|state| state.resolver = Some(resolver));
        debug!("Resolver registered");
        wake(&self.inner);
    }

    /// Remove the resolve function. A running drain stops before its next item.
    pub fn clear_resolver(&self) {
        self.inner.with_state(|state| state.resolver = None);
        debug!("Resolver cleared");
    }

    pub fn register_context(
        &self,
        id: impl Into<ContextId>,
        kind: ContextKind,
        options: ContextOptions,
    ) {
        let id = id.into();
        self.inner
            .with_state(|state| state.register_context(id, kind, options.playback_lookahead));
    }

    /// Register a context by its kind name, failing with
    /// [`SchedulerError::InvalidContextType`] for an unrecognized name.
    pub fn register_context_named(
        &self,
        id: impl Into<ContextId>,
        kind: &str,
        options: ContextOptions,
    ) -> SchedulerResult<()> {
        let kind = kind.parse::<ContextKind>()?;
        self.register_context(id, kind, options);
        Ok(())
    }

    /// Abort all of the context's pending work and forget it. Unknown ids are ignored.
    pub fn unregister_context(&self, id: &str) {
        if self.inner.with_state(|state| state.unregister_context(id)) {
            info!(context_id = %id, "Unregistered context");
        }
    }

    pub fn has_context(&self, id: &str) -> bool {
        self.inner.with_state(|state| state.has_context(id))
    }

    pub fn context_kind(&self, id: &str) -> Option<ContextKind> {
        self.inner
            .with_state(|state| state.context(id).map(|context| context.kind))
    }

    /// Keys currently recorded as visible for the context.
    pub fn visible_keys(&self, id: &str) -> Vec<TrackKey> {
        self.inner.with_state(|state| {
            let mut keys: Vec<TrackKey> = state
                .context(id)
                .map(|context| context.visible.iter().cloned().collect())
                .unwrap_or_default();
            keys.sort();
            keys
        })
    }

    /// The context's coarse scope signal, fired by `abort_context`/`unregister_context`.
    pub fn context_signal(&self, id: &str) -> Option<AbortSignal> {
        self.inner
            .with_state(|state| state.context(id).map(|context| context.scope.signal()))
    }

    /// Record the now-playing position of a queue context. Other contexts are ignored.
    pub fn set_playback_index(&self, id: &str, index: usize) {
        self.inner
            .with_state(|state| state.set_playback_index(id, index));
    }

    /// `[index, index + lookahead)` for a queue context with a known playback index.
    pub fn playback_lookahead_range(&self, id: &str) -> Option<Range<usize>> {
        self.inner
            .with_state(|state| state.context(id).and_then(|context| context.lookahead_range()))
    }

    pub fn is_in_playback_lookahead(&self, id: &str, index: usize) -> bool {
        self.playback_lookahead_range(id)
            .is_some_and(|range| range.contains(&index))
    }

    /// Report the full set of tracks now visible on a surface.
    ///
    /// Keys no longer visible are aborted; newly visible keys that are neither pending
    /// nor already resolved are enqueued. The whole diff is applied atomically.
    pub fn update_visibility<I, T>(&self, id: &str, visible: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<VisibleTrack<P>>,
    {
        let visible: Vec<VisibleTrack<P>> = visible.into_iter().map(Into::into).collect();
        let applied = self
            .inner
            .with_state(|state| state.update_visibility(id, visible));
        if let Some((_, enqueued)) = applied {
            if enqueued > 0 {
                wake(&self.inner);
            }
        }
    }

    /// Add one track. No-op when already pending, already resolved, or when the
    /// context is unknown. Returns whether an entry was created.
    pub fn enqueue(&self, key: impl Into<TrackKey>, context_id: &str, payload: P) -> bool {
        let key = key.into();
        let created = self
            .inner
            .with_state(|state| state.enqueue(key, context_id, payload));
        if created {
            wake(&self.inner);
        }
        created
    }

    /// Drop a key from the pending table without triggering its token.
    pub fn dequeue(&self, key: &str) {
        self.inner.with_state(|state| state.dequeue(key));
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.with_state(|state| state.is_pending(key))
    }

    pub fn is_resolved(&self, key: &str) -> bool {
        self.inner.with_state(|state| state.is_resolved(key))
    }

    pub fn is_in_progress(&self, key: &str) -> bool {
        self.inner.with_state(|state| state.is_in_progress(key))
    }

    /// Forget that `key` resolved, so it can be enqueued again.
    pub fn invalidate_resolved(&self, key: &str) -> bool {
        self.inner.with_state(|state| state.invalidate_resolved(key))
    }

    pub fn clear_resolved(&self) -> usize {
        self.inner.with_state(|state| state.clear_resolved())
    }

    /// The entry the processor would pick next.
    pub fn peek_next(&self) -> Option<NextTrack<P>> {
        self.inner.with_state(|state| state.peek_next())
    }

    pub fn set_hover_track(&self, key: impl Into<TrackKey>, context_id: impl Into<ContextId>) {
        let (key, context_id) = (key.into(), context_id.into());
        debug!(track_key = %key, context_id = %context_id, "Hover track set");
        self.inner.with_state(|state| state.set_hover(key, context_id));
    }

    pub fn clear_hover_track(&self) {
        self.inner.with_state(|state| state.clear_hover());
    }

    pub fn hover_track(&self) -> Option<HoverPointer> {
        self.inner.with_state(|state| state.hover().cloned())
    }

    /// Live cancellation signal of a pending key.
    pub fn abort_signal(&self, key: &str) -> Option<AbortSignal> {
        self.inner.with_state(|state| state.abort_signal(key))
    }

    /// Trigger the key's token and drop it from all bookkeeping.
    pub fn abort(&self, key: &str) {
        self.inner.with_state(|state| state.abort(key));
    }

    /// Cancel a context's work. With `after_current_batch`, entries already inside a
    /// resolver invocation are left to finish. Returns the number of entries aborted.
    pub fn abort_context(&self, id: &str, options: AbortContextOptions) -> usize {
        self.inner
            .with_state(|state| state.abort_context(id, options))
    }

    /// Abort every pending entry across all contexts.
    pub fn abort_all(&self) -> usize {
        let aborted = self.inner.with_state(|state| state.abort_all());
        if aborted > 0 {
            info!(aborted, "Aborted all pending resolutions");
        }
        aborted
    }

    pub fn mark_in_progress(&self, key: &str) {
        self.inner.with_state(|state| state.mark_in_progress(key));
    }

    pub fn in_progress_count(&self) -> usize {
        self.inner.with_state(|state| state.in_progress_count())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.with_state(|state| state.pending_count())
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.with_state(|state| state.stats())
    }

    pub fn is_draining(&self) -> bool {
        self.inner.with_state(|state| state.draining)
    }

    /// Wait until the drain task has gone idle.
    pub async fn wait_until_idle(&self, timeout: Option<Duration>) -> SchedulerResult<()> {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.is_draining() {
                    return;
                }
                notified.await;
            }
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| {
                SchedulerError::Timeout("waiting for resolution drain to go idle".to_string())
            }),
            None => {
                wait.await;
                Ok(())
            }
        }
    }
}
