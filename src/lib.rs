//! Tracksched: Track Resolution Scheduling
//!
//! Decides which track to resolve next across every surface that shows tracks
//! (playback queue, hovered item, prefetch pools, browse pages, sidebars), cancels
//! work that stops being relevant, and keeps the outbound resolution rate bounded.
//! Matching a track to a playable source is delegated to an injected [`Resolver`].

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod resolver;
pub mod scheduler;
pub mod types;

pub use cancel::{AbortSignal, CancellationToken};
pub use config::{ConfigLoader, SchedulerConfig};
pub use context::{AbortContextOptions, ContextKind, ContextOptions, Priority};
pub use error::{ResolveError, SchedulerError, SchedulerResult};
pub use events::{ChannelSink, EventEnvelope, EventSink, SchedulerEvent, SchedulerStats};
pub use resolver::Resolver;
pub use scheduler::{HoverPointer, NextTrack, ResolutionScheduler};
pub use types::{ContextId, TrackKey, VisibleTrack};
