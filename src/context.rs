//! Visibility contexts and their priority classes.

use crate::cancel::CancellationToken;
use crate::error::SchedulerError;
use crate::types::TrackKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Priority class of a pending entry. Lower is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    Queue = 1,
    Hover = 2,
    Pool = 3,
    Page = 4,
    Sidebar = 5,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Effective priority of a key under the hover override: clamped to `Hover`
    /// unless the natural class is already more urgent.
    pub fn with_hover(self) -> Priority {
        self.min(Priority::Hover)
    }
}

/// Kind of visibility surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Queue,
    Hover,
    Pool,
    Page,
    Sidebar,
}

impl ContextKind {
    pub const ALL: [ContextKind; 5] = [
        ContextKind::Queue,
        ContextKind::Hover,
        ContextKind::Pool,
        ContextKind::Page,
        ContextKind::Sidebar,
    ];

    pub const fn priority(self) -> Priority {
        match self {
            ContextKind::Queue => Priority::Queue,
            ContextKind::Hover => Priority::Hover,
            ContextKind::Pool => Priority::Pool,
            ContextKind::Page => Priority::Page,
            ContextKind::Sidebar => Priority::Sidebar,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Queue => "queue",
            ContextKind::Hover => "hover",
            ContextKind::Pool => "pool",
            ContextKind::Page => "page",
            ContextKind::Sidebar => "sidebar",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SchedulerError::InvalidContextType(s.to_string()))
    }
}

/// Registration options for a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// Forward window of queue positions considered imminent. Only applies to queue
    /// contexts; `None` uses the configured default.
    pub playback_lookahead: Option<usize>,
}

impl ContextOptions {
    pub fn with_playback_lookahead(lookahead: usize) -> Self {
        Self {
            playback_lookahead: Some(lookahead),
        }
    }
}

/// Options for [`abort_context`](crate::scheduler::ResolutionScheduler::abort_context).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortContextOptions {
    /// Leave entries already inside a resolver invocation alone.
    pub after_current_batch: bool,
}

/// A registered visibility surface.
#[derive(Debug)]
pub(crate) struct Context {
    pub kind: ContextKind,
    pub visible: HashSet<TrackKey>,
    pub playback_lookahead: usize,
    pub playback_index: Option<usize>,
    pub scope: CancellationToken,
}

impl Context {
    pub fn new(kind: ContextKind, playback_lookahead: usize) -> Self {
        Self {
            kind,
            visible: HashSet::new(),
            playback_lookahead: Self::effective_lookahead(kind, playback_lookahead),
            playback_index: None,
            scope: CancellationToken::new(),
        }
    }

    fn effective_lookahead(kind: ContextKind, requested: usize) -> usize {
        if kind == ContextKind::Queue {
            requested
        } else {
            0
        }
    }

    pub fn reconfigure(&mut self, kind: ContextKind, playback_lookahead: usize) {
        self.kind = kind;
        self.playback_lookahead = Self::effective_lookahead(kind, playback_lookahead);
        if kind != ContextKind::Queue {
            self.playback_index = None;
        }
    }

    pub fn priority(&self) -> Priority {
        self.kind.priority()
    }

    /// `[index, index + lookahead)` once a playback index is known.
    pub fn lookahead_range(&self) -> Option<Range<usize>> {
        if self.kind != ContextKind::Queue {
            return None;
        }
        self.playback_index
            .map(|index| index..index.saturating_add(self.playback_lookahead))
    }

    /// Trigger the current scope token and install a fresh one.
    pub fn reset_scope(&mut self) {
        self.scope.cancel();
        self.scope = CancellationToken::new();
    }
}
