//! Integration tests for scheduler bookkeeping
//!
//! Tests cover:
//! - Priority selection and hover override
//! - Visibility diffing
//! - Per-track and per-context cancellation
//! - Context registry and playback lookahead
//! - Idempotence on unknown ids and keys

use crate::integration::test_utils::{meta, scheduler_with_contexts, visible, TrackMeta};
use tracksched::{
    AbortContextOptions, ContextKind, ContextOptions, Priority, ResolutionScheduler,
    SchedulerConfig, SchedulerError,
};

fn scheduler() -> ResolutionScheduler<TrackMeta> {
    scheduler_with_contexts(SchedulerConfig::default())
}

#[test]
fn test_queue_entry_beats_earlier_page_entry() {
    let scheduler = scheduler();
    scheduler.enqueue("a", "p", meta("a"));
    scheduler.enqueue("b", "q", meta("b"));

    let next = scheduler.peek_next().unwrap();
    assert_eq!(next.track_key, "b");
    assert_eq!(next.priority, Priority::Queue);
    assert!(!next.is_hover);
}

#[test]
fn test_hover_never_outranks_queue() {
    let scheduler = scheduler();
    scheduler.enqueue("a", "p", meta("a"));
    scheduler.enqueue("b", "q", meta("b"));
    scheduler.set_hover_track("a", "p");

    assert_eq!(scheduler.peek_next().unwrap().track_key, "b");

    scheduler.dequeue("b");
    let next = scheduler.peek_next().unwrap();
    assert_eq!(next.track_key, "a");
    assert!(next.is_hover);
    assert_eq!(next.priority, Priority::Hover);
    assert_eq!(next.payload, meta("a"));
}

#[test]
fn test_clear_hover_restores_natural_order() {
    let scheduler = scheduler();
    scheduler.register_context("pool", ContextKind::Pool, ContextOptions::default());
    scheduler.enqueue("pooled", "pool", meta("pooled"));
    scheduler.enqueue("paged", "p", meta("paged"));
    scheduler.set_hover_track("paged", "p");
    assert_eq!(scheduler.peek_next().unwrap().track_key, "paged");

    scheduler.clear_hover_track();
    assert!(scheduler.hover_track().is_none());
    assert_eq!(scheduler.peek_next().unwrap().track_key, "pooled");
}

#[test]
fn test_visibility_updates_diff_previous_set() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["x", "y"]));
    let x_signal = scheduler.abort_signal("x").unwrap();
    let y_signal = scheduler.abort_signal("y").unwrap();

    scheduler.update_visibility("p", visible(&["y", "z"]));

    assert!(!scheduler.is_pending("x"));
    assert!(scheduler.is_pending("y"));
    assert!(scheduler.is_pending("z"));
    assert!(x_signal.is_aborted());
    assert!(!y_signal.is_aborted());
    assert_eq!(scheduler.visible_keys("p"), vec!["y".to_string(), "z".to_string()]);
}

#[test]
fn test_visibility_skips_keys_pending_elsewhere() {
    let scheduler = scheduler();
    scheduler.enqueue("shared", "q", meta("shared"));
    scheduler.update_visibility("p", visible(&["shared", "own"]));

    assert_eq!(scheduler.pending_count(), 2);
    assert_eq!(scheduler.peek_next().unwrap().context_id, "q");
}

#[test]
fn test_visibility_accepts_tuples() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", vec![("t1", meta("t1")), ("t2", meta("t2"))]);
    assert_eq!(scheduler.pending_count(), 2);
}

#[test]
fn test_abort_triggers_signal_and_removes_entry() {
    let scheduler = scheduler();
    scheduler.enqueue("c", "p", meta("c"));
    let signal = scheduler.abort_signal("c").unwrap();

    scheduler.abort("c");

    assert!(signal.is_aborted());
    assert!(!scheduler.is_pending("c"));
    assert!(scheduler.abort_signal("c").is_none());
}

#[test]
fn test_abort_context_after_current_batch_keeps_in_flight() {
    let scheduler = scheduler();
    let batch = AbortContextOptions {
        after_current_batch: true,
    };

    scheduler.enqueue("d", "p", meta("d"));
    scheduler.mark_in_progress("d");
    scheduler.abort_context("p", batch);
    assert!(scheduler.is_pending("d"));
    assert_eq!(scheduler.in_progress_count(), 1);

    scheduler.enqueue("e", "p", meta("e"));
    scheduler.abort_context("p", batch);
    assert!(!scheduler.is_pending("e"));
    assert!(scheduler.is_pending("d"));
}

#[test]
fn test_abort_context_leaves_no_owned_entries() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["a", "b", "c"]));
    scheduler.mark_in_progress("a");
    scheduler.enqueue("queued", "q", meta("queued"));
    let scope = scheduler.context_signal("p").unwrap();

    let aborted = scheduler.abort_context("p", AbortContextOptions::default());

    assert_eq!(aborted, 3);
    assert_eq!(scheduler.pending_count(), 1);
    assert!(scheduler.is_pending("queued"));
    assert!(scheduler.visible_keys("p").is_empty());
    assert!(scope.is_aborted());
    assert!(!scheduler.context_signal("p").unwrap().is_aborted());
}

#[test]
fn test_work_after_abort_context_is_unaffected() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["a"]));
    scheduler.abort_context("p", AbortContextOptions::default());

    scheduler.update_visibility("p", visible(&["a"]));
    assert!(scheduler.is_pending("a"));
    assert!(!scheduler.abort_signal("a").unwrap().is_aborted());
}

#[test]
fn test_unregister_aborts_pending_work() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["a", "b"]));
    let signal = scheduler.abort_signal("a").unwrap();

    scheduler.unregister_context("p");

    assert!(!scheduler.has_context("p"));
    assert!(signal.is_aborted());
    assert_eq!(scheduler.pending_count(), 0);
    assert!(!scheduler.enqueue("late", "p", meta("late")));
}

#[test]
fn test_unknown_ids_and_keys_are_ignored() {
    let scheduler = scheduler();
    scheduler.enqueue("a", "p", meta("a"));
    let before = scheduler.stats();

    scheduler.unregister_context("ghost");
    scheduler.dequeue("ghost");
    scheduler.abort("ghost");
    scheduler.mark_in_progress("ghost");
    scheduler.set_playback_index("ghost", 3);
    scheduler.update_visibility("ghost", visible(&["a", "z"]));
    assert_eq!(scheduler.abort_context("ghost", AbortContextOptions::default()), 0);
    assert!(!scheduler.enqueue("z", "ghost", meta("z")));

    assert_eq!(scheduler.stats(), before);
    assert_eq!(scheduler.in_progress_count(), 0);
}

#[test]
fn test_enqueue_dequeue_round_trip() {
    let scheduler = scheduler();
    assert!(scheduler.enqueue("a", "p", meta("a")));
    assert!(scheduler.is_pending("a"));
    scheduler.dequeue("a");
    assert!(!scheduler.is_pending("a"));
    assert!(scheduler.peek_next().is_none());
}

#[test]
fn test_register_rejects_unknown_kind_name() {
    let scheduler = scheduler();
    let err = scheduler
        .register_context_named("c", "carousel", ContextOptions::default())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidContextType(_)));
    assert!(!scheduler.has_context("c"));

    scheduler
        .register_context_named("s", "sidebar", ContextOptions::default())
        .unwrap();
    assert_eq!(scheduler.context_kind("s"), Some(ContextKind::Sidebar));
}

#[test]
fn test_playback_lookahead_window() {
    let scheduler: ResolutionScheduler<TrackMeta> = ResolutionScheduler::default();
    scheduler.register_context(
        "queue",
        ContextKind::Queue,
        ContextOptions::with_playback_lookahead(3),
    );
    assert_eq!(scheduler.playback_lookahead_range("queue"), None);

    scheduler.set_playback_index("queue", 5);
    assert_eq!(scheduler.playback_lookahead_range("queue"), Some(5..8));
    assert!(scheduler.is_in_playback_lookahead("queue", 5));
    assert!(scheduler.is_in_playback_lookahead("queue", 7));
    assert!(!scheduler.is_in_playback_lookahead("queue", 8));
    assert!(!scheduler.is_in_playback_lookahead("queue", 4));
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_playback_index_ignored_for_non_queue() {
    let scheduler = scheduler();
    scheduler.set_playback_index("p", 2);
    assert_eq!(scheduler.playback_lookahead_range("p"), None);
    assert!(!scheduler.is_in_playback_lookahead("p", 2));
}

#[test]
fn test_configured_default_lookahead() {
    let config = SchedulerConfig {
        default_playback_lookahead: 2,
        ..SchedulerConfig::default()
    };
    let scheduler: ResolutionScheduler<TrackMeta> = ResolutionScheduler::new(config);
    scheduler.register_context("queue", ContextKind::Queue, ContextOptions::default());
    scheduler.set_playback_index("queue", 0);
    assert_eq!(scheduler.playback_lookahead_range("queue"), Some(0..2));
}

#[test]
fn test_reregister_keeps_pending_work() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["a"]));
    scheduler.register_context("p", ContextKind::Sidebar, ContextOptions::default());

    assert_eq!(scheduler.context_kind("p"), Some(ContextKind::Sidebar));
    assert!(scheduler.is_pending("a"));
    // Priority was snapshotted at enqueue time.
    assert_eq!(scheduler.peek_next().unwrap().priority, Priority::Page);
}

#[test]
fn test_abort_all() {
    let scheduler = scheduler();
    scheduler.update_visibility("p", visible(&["a", "b"]));
    scheduler.enqueue("c", "q", meta("c"));
    assert_eq!(scheduler.abort_all(), 3);
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.stats().aborted, 3);
}
