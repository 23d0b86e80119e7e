//! Scheduler events and statistics for external instrumentation.

use crate::context::{ContextKind, Priority};
use crate::types::{ContextId, TrackKey};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Lifecycle events emitted by a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    ContextRegistered {
        context_id: ContextId,
        kind: ContextKind,
    },
    ContextUnregistered {
        context_id: ContextId,
        aborted: usize,
    },
    Enqueued {
        track_key: TrackKey,
        context_id: ContextId,
        priority: Priority,
    },
    Aborted {
        track_key: TrackKey,
        context_id: ContextId,
    },
    Dispatched {
        track_key: TrackKey,
        context_id: ContextId,
        priority: Priority,
        is_hover: bool,
    },
    Resolved {
        track_key: TrackKey,
        duration_ms: u64,
    },
    Cancelled {
        track_key: TrackKey,
    },
    Failed {
        track_key: TrackKey,
        error_kind: String,
        error: String,
    },
    /// A resolver finished for a key that had been aborted meanwhile.
    Discarded {
        track_key: TrackKey,
    },
    DrainStarted,
    DrainStopped,
}

/// A timestamped, sequenced event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub ts: String,
    pub seq: u64,
    #[serde(flatten)]
    pub event: SchedulerEvent,
}

impl EventEnvelope {
    pub fn with_now(seq: u64, event: SchedulerEvent) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            seq,
            event,
        }
    }
}

/// Destination for scheduler events (log shipper, metrics bridge, UI devtools).
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope);
}

/// Forwards events over an unbounded tokio channel. Dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<EventEnvelope>,
}

impl ChannelSink {
    pub fn new_pair() -> (Self, UnboundedReceiver<EventEnvelope>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, envelope: EventEnvelope) {
        let _ = self.sender.send(envelope);
    }
}

/// Hands already-sequenced envelopes to the sink, if one is installed.
pub(crate) struct EventEmitter {
    sink: Option<Box<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new(sink: Option<Box<dyn EventSink>>) -> Self {
        Self { sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn emit_all(&self, envelopes: Vec<EventEnvelope>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        for envelope in envelopes {
            sink.emit(envelope);
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub contexts: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub dispatched: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub aborted: u64,
    pub discarded: u64,
}
