#![allow(missing_docs)]
//! Live priority mutation: queue migration, ordering across the move, and
//! the weak signal registry.

use parking_lot::Mutex;
use std::sync::Arc;
use tasklane::test_utils::init_test_logging;
use tasklane::{
    ErrorKind, Priority, Scheduler, SimulatedHost, SubmitOptions, TaskController,
};

fn init_test(name: &str) {
    init_test_logging();
    tasklane::test_phase!(name);
}

fn fixture() -> (Arc<SimulatedHost>, Scheduler, Arc<Mutex<Vec<&'static str>>>) {
    let host = Arc::new(SimulatedHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler, Arc::new(Mutex::new(Vec::new())))
}

fn log_task(
    scheduler: &Scheduler,
    log: &Arc<Mutex<Vec<&'static str>>>,
    tag: &'static str,
    options: SubmitOptions,
) {
    let log = Arc::clone(log);
    let _handle = scheduler.post_task(
        move || {
            log.lock().push(tag);
        },
        options,
    );
}

#[test]
fn raising_a_signal_moves_its_tasks_ahead_of_earlier_work() {
    init_test("raising_signal_moves_tasks_ahead");
    let (host, scheduler, log) = fixture();

    // C is user-visible and submitted before the signal tasks.
    log_task(&scheduler, &log, "C", SubmitOptions::new());
    let controller = TaskController::with_priority(Priority::UserVisible);
    log_task(
        &scheduler,
        &log,
        "A",
        SubmitOptions::new().with_signal(controller.signal()),
    );
    log_task(
        &scheduler,
        &log,
        "B",
        SubmitOptions::new().with_signal(controller.signal()),
    );

    controller.set_priority(Priority::UserBlocking).unwrap();
    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["A", "B", "C"],
        "signal tasks moved above older user-visible work, keeping their order",
        vec!["A", "B", "C"],
        order
    );
    tasklane::test_complete!("raising_signal_moves_tasks_ahead");
}

#[test]
fn lowering_a_signal_interleaves_by_submission_order() {
    init_test("lowering_signal_interleaves_by_sequence");
    let (host, scheduler, log) = fixture();

    // Background queue already holds "old"; the demoted tasks are younger
    // and land after it, in their own submission order.
    log_task(
        &scheduler,
        &log,
        "old",
        SubmitOptions::new().with_priority(Priority::Background),
    );
    let controller = TaskController::with_priority(Priority::UserVisible);
    log_task(
        &scheduler,
        &log,
        "demoted-1",
        SubmitOptions::new().with_signal(controller.signal()),
    );
    log_task(
        &scheduler,
        &log,
        "demoted-2",
        SubmitOptions::new().with_signal(controller.signal()),
    );

    controller.set_priority(Priority::Background).unwrap();
    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["old", "demoted-1", "demoted-2"],
        "migration interleaves by sequence id in the destination",
        vec!["old", "demoted-1", "demoted-2"],
        order
    );
    tasklane::test_complete!("lowering_signal_interleaves_by_sequence");
}

#[test]
fn migration_only_moves_the_changed_signals_tasks() {
    init_test("migration_only_moves_matching_tasks");
    let (host, scheduler, log) = fixture();

    let moving = TaskController::with_priority(Priority::UserVisible);
    let staying = TaskController::with_priority(Priority::UserVisible);

    log_task(
        &scheduler,
        &log,
        "stays",
        SubmitOptions::new().with_signal(staying.signal()),
    );
    log_task(
        &scheduler,
        &log,
        "moves",
        SubmitOptions::new().with_signal(moving.signal()),
    );

    moving.set_priority(Priority::UserBlocking).unwrap();
    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["moves", "stays"],
        "only the mutated signal's tasks migrated",
        vec!["moves", "stays"],
        order
    );
    tasklane::assert_with_log!(
        staying.signal().priority() == Priority::UserVisible,
        "the other signal is untouched",
        Priority::UserVisible,
        staying.signal().priority()
    );
    tasklane::test_complete!("migration_only_moves_matching_tasks");
}

#[test]
fn explicit_option_priority_is_immune_to_signal_changes() {
    init_test("explicit_priority_wins_over_signal");
    let (host, scheduler, log) = fixture();

    let controller = TaskController::with_priority(Priority::UserVisible);
    // Explicit background priority overrides the signal for this task only.
    log_task(
        &scheduler,
        &log,
        "pinned-background",
        SubmitOptions::new()
            .with_priority(Priority::Background)
            .with_signal(controller.signal()),
    );
    log_task(
        &scheduler,
        &log,
        "follows-signal",
        SubmitOptions::new().with_signal(controller.signal()),
    );

    controller.set_priority(Priority::UserBlocking).unwrap();
    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["follows-signal", "pinned-background"],
        "the explicitly-prioritized task did not migrate",
        vec!["follows-signal", "pinned-background"],
        order
    );
    tasklane::test_complete!("explicit_priority_wins_over_signal");
}

#[test]
fn unchanged_priority_reorders_nothing() {
    init_test("unchanged_priority_reorders_nothing");
    let (host, scheduler, log) = fixture();

    let controller = TaskController::with_priority(Priority::UserVisible);
    log_task(&scheduler, &log, "plain", SubmitOptions::new());
    log_task(
        &scheduler,
        &log,
        "signal",
        SubmitOptions::new().with_signal(controller.signal()),
    );

    // Same tag: no event, no migration.
    controller.set_priority(Priority::UserVisible).unwrap();
    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["plain", "signal"],
        "a no-op priority change keeps FIFO order",
        vec!["plain", "signal"],
        order
    );
    tasklane::test_complete!("unchanged_priority_reorders_nothing");
}

#[test]
fn reentrant_set_priority_fails_and_leaves_migration_consistent() {
    init_test("reentrant_set_priority_rejected");
    let (host, scheduler, log) = fixture();

    let controller = Arc::new(TaskController::with_priority(Priority::UserVisible));
    log_task(
        &scheduler,
        &log,
        "task",
        SubmitOptions::new().with_signal(controller.signal()),
    );

    let nested = Arc::clone(&controller);
    let nested_error = Arc::new(Mutex::new(None));
    let nested_error_slot = Arc::clone(&nested_error);
    controller.signal().on_priority_change(move |_| {
        let err = nested.set_priority(Priority::Background).unwrap_err();
        *nested_error_slot.lock() = Some(err.kind());
    });

    controller.set_priority(Priority::UserBlocking).unwrap();

    tasklane::assert_with_log!(
        *nested_error.lock() == Some(ErrorKind::ReentrantPriorityChange),
        "nested set_priority raised the disallowed-operation error",
        Some(ErrorKind::ReentrantPriorityChange),
        *nested_error.lock()
    );
    tasklane::assert_with_log!(
        controller.signal().priority() == Priority::UserBlocking,
        "the outer change stuck",
        Priority::UserBlocking,
        controller.signal().priority()
    );

    host.run_until_quiescent();
    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["task"],
        "the task still dispatched exactly once",
        vec!["task"],
        order
    );
    tasklane::test_complete!("reentrant_set_priority_rejected");
}

#[test]
fn registry_entries_die_with_their_signals() {
    init_test("registry_entries_die_with_signals");
    let (host, scheduler, log) = fixture();

    {
        let controller = TaskController::with_priority(Priority::UserVisible);
        log_task(
            &scheduler,
            &log,
            "tracked",
            SubmitOptions::new().with_signal(controller.signal()),
        );
        tasklane::assert_with_log!(
            scheduler.tracked_signal_count() == 1,
            "signal registered on first sight",
            1,
            scheduler.tracked_signal_count()
        );
        host.run_until_quiescent();
        // Controller (and with it every signal handle) drops here.
    }

    tasklane::assert_with_log!(
        scheduler.tracked_signal_count() == 0,
        "dead signals fall out of the registry",
        0,
        scheduler.tracked_signal_count()
    );
    tasklane::test_complete!("registry_entries_die_with_signals");
}

#[test]
fn migration_while_queues_hold_both_kinds() {
    init_test("migration_moves_both_kinds");
    let (host, scheduler, log) = fixture();

    let controller = TaskController::with_priority(Priority::Background);
    log_task(
        &scheduler,
        &log,
        "fresh",
        SubmitOptions::new().with_signal(controller.signal()),
    );
    let continuation = scheduler.yield_with(SubmitOptions::new().with_signal(controller.signal()));
    log_task(&scheduler, &log, "visible", SubmitOptions::new());

    controller.set_priority(Priority::UserBlocking).unwrap();

    tasklane::test_section!("first tick dispatches the migrated continuation");
    host.step();
    tasklane::assert_with_log!(
        continuation.is_finished(),
        "continuation migrated and kept its kind precedence",
        true,
        continuation.is_finished()
    );

    host.run_until_quiescent();
    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["fresh", "visible"],
        "both kinds migrated; the plain task ran last",
        vec!["fresh", "visible"],
        order
    );
    tasklane::test_complete!("migration_moves_both_kinds");
}
