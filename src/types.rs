//! Shared identifier and value types.

use serde::{Deserialize, Serialize};

/// Unique identifier for one resolution task instance.
pub type TrackKey = String;

/// Identifier of a registered visibility surface.
pub type ContextId = String;

/// A track currently visible on some surface, as reported by that surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleTrack<P> {
    pub key: TrackKey,
    pub payload: P,
}

impl<P> VisibleTrack<P> {
    pub fn new(key: impl Into<TrackKey>, payload: P) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

impl<K: Into<TrackKey>, P> From<(K, P)> for VisibleTrack<P> {
    fn from((key, payload): (K, P)) -> Self {
        Self::new(key, payload)
    }
}
