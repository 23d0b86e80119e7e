//! Scheduler bookkeeping: contexts, pending table, in-progress set, resolved memo
//! and hover pointer. Everything here is synchronous and runs under the scheduler
//! lock; the drain loop and the public handle only call into these methods.

use crate::cancel::{AbortSignal, CancellationToken};
use crate::context::{AbortContextOptions, Context, ContextKind, Priority};
use crate::events::{EventEnvelope, SchedulerEvent, SchedulerStats};
use crate::resolver::Resolver;
use crate::types::{ContextId, TrackKey, VisibleTrack};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The single global hover override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverPointer {
    pub track_key: TrackKey,
    pub context_id: ContextId,
}

/// The entry `peek_next` would hand to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTrack<P> {
    pub track_key: TrackKey,
    pub context_id: ContextId,
    pub payload: P,
    /// Effective priority, hover override applied.
    pub priority: Priority,
    pub is_hover: bool,
    pub(crate) seq: u64,
}

#[derive(Debug)]
struct PendingEntry<P> {
    context_id: ContextId,
    payload: P,
    priority: Priority,
    token: CancellationToken,
    seq: u64,
}

/// What the processor needs to run one resolver invocation.
pub(crate) struct Dispatch<P> {
    pub track_key: TrackKey,
    pub payload: P,
    pub signal: AbortSignal,
    pub seq: u64,
}

/// Classified result of one resolver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Completion {
    Resolved { duration_ms: u64 },
    Cancelled,
    Failed { kind: String, message: String },
}

/// Whether the drain loop should keep going.
pub(crate) enum NextStep<P: Send + 'static> {
    Run(NextTrack<P>, Arc<dyn Resolver<P>>),
    Stop,
}

pub(crate) struct SchedulerState<P: Send + 'static> {
    contexts: HashMap<ContextId, Context>,
    pending: HashMap<TrackKey, PendingEntry<P>>,
    /// `(priority, seq)` ordering of `pending`; insertion order breaks ties.
    order: BTreeMap<(Priority, u64), TrackKey>,
    in_progress: HashSet<TrackKey>,
    resolved: HashSet<TrackKey>,
    hover: Option<HoverPointer>,
    next_seq: u64,
    pub resolver: Option<Arc<dyn Resolver<P>>>,
    pub draining: bool,
    default_lookahead: usize,
    stats: SchedulerStats,
    record_events: bool,
    /// `seq` of the next recorded envelope.
    next_event_seq: u64,
    outbox: Vec<EventEnvelope>,
}

impl<P: Clone + Send + 'static> SchedulerState<P> {
    pub fn new(default_lookahead: usize, record_events: bool) -> Self {
        Self {
            contexts: HashMap::new(),
            pending: HashMap::new(),
            order: BTreeMap::new(),
            in_progress: HashSet::new(),
            resolved: HashSet::new(),
            hover: None,
            next_seq: 0,
            resolver: None,
            draining: false,
            default_lookahead,
            stats: SchedulerStats::default(),
            record_events,
            next_event_seq: 1,
            outbox: Vec::new(),
        }
    }

    pub fn record(&mut self, event: SchedulerEvent) {
        if self.record_events {
            let seq = self.next_event_seq;
            self.next_event_seq += 1;
            self.outbox.push(EventEnvelope::with_now(seq, event));
        }
    }

    pub fn take_events(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.outbox)
    }

    pub fn register_context(
        &mut self,
        id: ContextId,
        kind: ContextKind,
        playback_lookahead: Option<usize>,
    ) {
        let lookahead = playback_lookahead.unwrap_or(self.default_lookahead);
        match self.contexts.get_mut(&id) {
            Some(existing) => {
                debug!(context_id = %id, kind = %kind, "Reconfigured context");
                existing.reconfigure(kind, lookahead);
            }
            None => {
                info!(context_id = %id, kind = %kind, lookahead, "Registered context");
                self.contexts.insert(id.clone(), Context::new(kind, lookahead));
            }
        }
        self.record(SchedulerEvent::ContextRegistered {
            context_id: id,
            kind,
        });
    }

    pub fn unregister_context(&mut self, id: &str) -> bool {
        if !self.contexts.contains_key(id) {
            return false;
        }
        let aborted = self.abort_context(id, AbortContextOptions::default());
        if let Some(mut context) = self.contexts.remove(id) {
            context.scope.cancel();
            context.visible.clear();
        }
        debug!(context_id = %id, aborted, "Unregistered context");
        self.record(SchedulerEvent::ContextUnregistered {
            context_id: id.to_string(),
            aborted,
        });
        true
    }

    pub fn has_context(&self, id: &str) -> bool {
        self.contexts.contains_key(id)
    }

    pub fn context(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }

    pub fn set_playback_index(&mut self, id: &str, index: usize) {
        if let Some(context) = self.contexts.get_mut(id) {
            if context.kind == ContextKind::Queue {
                context.playback_index = Some(index);
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_resolved(&self, key: &str) -> bool {
        self.resolved.contains(key)
    }

    pub fn is_in_progress(&self, key: &str) -> bool {
        self.in_progress.contains(key)
    }

    /// Returns `true` when a new entry was created.
    pub fn enqueue(&mut self, key: TrackKey, context_id: &str, payload: P) -> bool {
        if self.pending.contains_key(&key) || self.resolved.contains(&key) {
            return false;
        }
        let Some(context) = self.contexts.get(context_id) else {
            return false;
        };
        let priority = context.priority();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.order.insert((priority, seq), key.clone());
        self.pending.insert(
            key.clone(),
            PendingEntry {
                context_id: context_id.to_string(),
                payload,
                priority,
                token: CancellationToken::new(),
                seq,
            },
        );

        debug!(
            track_key = %key,
            context_id = %context_id,
            priority = ?priority,
            seq,
            pending = self.pending.len(),
            "Enqueued track"
        );
        self.record(SchedulerEvent::Enqueued {
            track_key: key,
            context_id: context_id.to_string(),
            priority,
        });
        true
    }

    /// Remove `key` from pending, in-progress and its owner's visible set.
    /// Returns the removed entry's token and owner.
    fn remove_entry(&mut self, key: &str) -> Option<(CancellationToken, ContextId)> {
        self.in_progress.remove(key);
        let entry = self.pending.remove(key)?;
        self.order.remove(&(entry.priority, entry.seq));
        if let Some(context) = self.contexts.get_mut(&entry.context_id) {
            context.visible.remove(key);
        }
        Some((entry.token, entry.context_id))
    }

    pub fn dequeue(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    pub fn abort(&mut self, key: &str) -> bool {
        let Some((token, context_id)) = self.remove_entry(key) else {
            return false;
        };
        token.cancel();
        if self
            .hover
            .as_ref()
            .is_some_and(|hover| hover.track_key == key)
        {
            self.hover = None;
        }
        self.stats.aborted += 1;
        debug!(track_key = %key, context_id = %context_id, "Aborted track");
        self.record(SchedulerEvent::Aborted {
            track_key: key.to_string(),
            context_id,
        });
        true
    }

    pub fn abort_signal(&self, key: &str) -> Option<AbortSignal> {
        self.pending.get(key).map(|entry| entry.token.signal())
    }

    pub fn mark_in_progress(&mut self, key: &str) -> bool {
        if !self.pending.contains_key(key) {
            return false;
        }
        self.in_progress.insert(key.to_string())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn invalidate_resolved(&mut self, key: &str) -> bool {
        self.resolved.remove(key)
    }

    pub fn clear_resolved(&mut self) -> usize {
        let count = self.resolved.len();
        self.resolved.clear();
        count
    }

    /// Apply the diff between the recorded visible set and `visible`.
    /// Returns `(aborted, enqueued)` counts; `None` for unknown contexts.
    pub fn update_visibility(
        &mut self,
        context_id: &str,
        visible: Vec<VisibleTrack<P>>,
    ) -> Option<(usize, usize)> {
        let previous = std::mem::take(&mut self.contexts.get_mut(context_id)?.visible);
        let next: HashSet<TrackKey> = visible.iter().map(|track| track.key.clone()).collect();

        let mut aborted = 0;
        for key in previous.difference(&next) {
            if self.abort(key) {
                aborted += 1;
            }
        }

        let mut enqueued = 0;
        for track in visible {
            if previous.contains(&track.key) {
                continue;
            }
            if self.enqueue(track.key, context_id, track.payload) {
                enqueued += 1;
            }
        }

        if let Some(context) = self.contexts.get_mut(context_id) {
            context.visible = next;
        }
        debug!(
            context_id = %context_id,
            aborted,
            enqueued,
            pending = self.pending.len(),
            "Applied visibility update"
        );
        Some((aborted, enqueued))
    }

    pub fn set_hover(&mut self, track_key: TrackKey, context_id: ContextId) {
        self.hover = Some(HoverPointer {
            track_key,
            context_id,
        });
    }

    pub fn clear_hover(&mut self) {
        self.hover = None;
    }

    pub fn hover(&self) -> Option<&HoverPointer> {
        self.hover.as_ref()
    }

    pub fn peek_next(&self) -> Option<NextTrack<P>> {
        let head = self.order.iter().next();
        let hovered = self.hover.as_ref().and_then(|hover| {
            self.pending
                .get(&hover.track_key)
                .map(|entry| (hover.track_key.as_str(), entry))
        });

        let (key, is_hover) = match (head, hovered) {
            (None, _) => return None,
            (Some((_, head_key)), None) => (head_key.as_str(), false),
            (Some((&(head_priority, head_seq), head_key)), Some((hover_key, entry))) => {
                let hover_rank = (entry.priority.with_hover(), entry.seq);
                if hover_rank <= (head_priority, head_seq) {
                    (hover_key, true)
                } else {
                    (head_key.as_str(), false)
                }
            }
        };

        let entry = self.pending.get(key)?;
        let priority = if is_hover {
            entry.priority.with_hover()
        } else {
            entry.priority
        };
        Some(NextTrack {
            track_key: key.to_string(),
            context_id: entry.context_id.clone(),
            payload: entry.payload.clone(),
            priority,
            is_hover,
            seq: entry.seq,
        })
    }

    /// Returns the number of entries aborted.
    pub fn abort_context(&mut self, context_id: &str, options: AbortContextOptions) -> usize {
        let Some(context) = self.contexts.get_mut(context_id) else {
            return 0;
        };
        context.scope.cancel();

        let owned: Vec<TrackKey> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.context_id == context_id)
            .map(|(key, _)| key.clone())
            .collect();

        let mut aborted = 0;
        for key in owned {
            if options.after_current_batch && self.in_progress.contains(&key) {
                continue;
            }
            if self.abort(&key) {
                aborted += 1;
            }
        }

        if let Some(context) = self.contexts.get_mut(context_id) {
            context.visible.clear();
            context.reset_scope();
        }
        debug!(
            context_id = %context_id,
            aborted,
            after_current_batch = options.after_current_batch,
            "Aborted context"
        );
        aborted
    }

    pub fn abort_all(&mut self) -> usize {
        let keys: Vec<TrackKey> = self.pending.keys().cloned().collect();
        keys.iter().filter(|key| self.abort(key)).count()
    }

    /// Top of the drain loop: pick the next entry, or flip to Idle.
    pub fn next_step(&mut self) -> NextStep<P> {
        let next = self.peek_next();
        match (next, self.resolver.clone()) {
            (Some(next), Some(resolver)) => NextStep::Run(next, resolver),
            _ => {
                self.stop_drain();
                NextStep::Stop
            }
        }
    }

    /// Draining -> Idle.
    pub fn stop_drain(&mut self) {
        self.draining = false;
        self.record(SchedulerEvent::DrainStopped);
    }

    /// Idle -> Draining, if there is anything to drain and something to drain it with.
    pub fn try_start_drain(&mut self) -> bool {
        if self.draining || self.resolver.is_none() || self.pending.is_empty() {
            return false;
        }
        self.draining = true;
        self.record(SchedulerEvent::DrainStarted);
        true
    }

    /// Mark `next` in progress if it is still the same pending entry.
    pub fn begin(&mut self, next: NextTrack<P>) -> Option<Dispatch<P>> {
        let entry = self.pending.get(&next.track_key)?;
        if entry.seq != next.seq {
            return None;
        }
        let signal = entry.token.signal();
        self.in_progress.insert(next.track_key.clone());
        self.stats.dispatched += 1;
        self.record(SchedulerEvent::Dispatched {
            track_key: next.track_key.clone(),
            context_id: next.context_id,
            priority: next.priority,
            is_hover: next.is_hover,
        });
        Some(Dispatch {
            track_key: next.track_key,
            payload: next.payload,
            signal,
            seq: next.seq,
        })
    }

    /// Record a resolver outcome. Results for entries aborted (or replaced) while
    /// the resolver ran are discarded. Returns `false` in that case.
    pub fn complete(&mut self, key: &str, seq: u64, completion: Completion) -> bool {
        let current = self.pending.get(key).is_some_and(|entry| entry.seq == seq);
        if !current {
            self.stats.discarded += 1;
            self.record(SchedulerEvent::Discarded {
                track_key: key.to_string(),
            });
            return false;
        }

        self.remove_entry(key);
        match completion {
            Completion::Resolved { duration_ms } => {
                self.resolved.insert(key.to_string());
                self.record(SchedulerEvent::Resolved {
                    track_key: key.to_string(),
                    duration_ms,
                });
            }
            Completion::Cancelled => {
                self.stats.cancelled += 1;
                self.record(SchedulerEvent::Cancelled {
                    track_key: key.to_string(),
                });
            }
            Completion::Failed { kind, message } => {
                self.stats.failed += 1;
                self.record(SchedulerEvent::Failed {
                    track_key: key.to_string(),
                    error_kind: kind,
                    error: message,
                });
            }
        }
        true
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            contexts: self.contexts.len(),
            pending: self.pending.len(),
            in_progress: self.in_progress.len(),
            resolved: self.resolved.len(),
            ..self.stats.clone()
        }
    }
}
