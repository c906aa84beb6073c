#![allow(missing_docs)]
//! Dispatch-order tests: priority precedence, FIFO within a priority, and
//! the continuation-before-fresh tie-break.
//!
//! These tests verify observable dispatch order on a simulated host rather
//! than scheduler internals.

use parking_lot::Mutex;
use std::sync::Arc;
use tasklane::test_utils::init_test_logging;
use tasklane::{Priority, Scheduler, SimulatedHost, SubmitOptions};

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
fn higher_priorities_dispatch_first() {
    init_test("higher_priorities_dispatch_first");
    let (host, scheduler, log) = fixture();

    tasklane::test_section!("submit A(background), B(user-blocking), C(user-visible)");
    log_task(
        &scheduler,
        &log,
        "A",
        SubmitOptions::new().with_priority(Priority::Background),
    );
    log_task(
        &scheduler,
        &log,
        "B",
        SubmitOptions::new().with_priority(Priority::UserBlocking),
    );
    log_task(
        &scheduler,
        &log,
        "C",
        SubmitOptions::new().with_priority(Priority::UserVisible),
    );

    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["B", "C", "A"],
        "dispatch order follows priority",
        vec!["B", "C", "A"],
        order
    );
    tasklane::test_complete!("higher_priorities_dispatch_first");
}

#[test]
fn fifo_within_a_priority() {
    init_test("fifo_within_a_priority");
    let (host, scheduler, log) = fixture();

    for tag in ["first", "second", "third", "fourth"] {
        log_task(
            &scheduler,
            &log,
            tag,
            SubmitOptions::new().with_priority(Priority::UserVisible),
        );
    }

    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["first", "second", "third", "fourth"],
        "same-priority tasks run in submission order",
        vec!["first", "second", "third", "fourth"],
        order
    );
    tasklane::test_complete!("fifo_within_a_priority");
}

#[test]
fn continuations_run_before_fresh_tasks_at_the_same_priority() {
    init_test("continuations_run_before_fresh_tasks");
    let (host, scheduler, log) = fixture();

    // The fresh task is submitted first, so it holds the older sequence id;
    // the continuation still wins the tie at equal priority.
    log_task(&scheduler, &log, "fresh", SubmitOptions::new());
    let continuation = scheduler.yield_now();

    tasklane::test_section!("first tick");
    host.step();
    tasklane::assert_with_log!(
        continuation.is_finished(),
        "continuation dispatched on the first tick",
        true,
        continuation.is_finished()
    );
    tasklane::assert_with_log!(
        log.lock().is_empty(),
        "fresh task has not run yet",
        0,
        log.lock().len()
    );

    tasklane::test_section!("drain");
    host.run_until_quiescent();
    tasklane::assert_with_log!(
        continuation.try_result() == Some(Ok::<(), tasklane::TaskError>(())),
        "continuation settled",
        Some(Ok::<(), tasklane::TaskError>(())),
        continuation.try_result()
    );
    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["fresh"],
        "fresh task ran after the continuation",
        vec!["fresh"],
        order
    );
    tasklane::test_complete!("continuations_run_before_fresh_tasks");
}

#[test]
fn yield_from_a_running_task_outranks_an_older_fresh_task() {
    init_test("yield_outranks_older_fresh_task");
    let (host, scheduler, log) = fixture();

    // From inside a running task, post a fresh task and then yield. The
    // continuation is younger but dispatches first at equal priority.
    let outer_scheduler = scheduler.clone();
    let outer_log = Arc::clone(&log);
    let continuation = Arc::new(Mutex::new(None));
    let continuation_slot = Arc::clone(&continuation);
    let _handle = scheduler.post_task(
        move || {
            outer_log.lock().push("outer");
            let log_fresh = Arc::clone(&outer_log);
            let _fresh = outer_scheduler.post_task(
                move || {
                    log_fresh.lock().push("fresh");
                },
                SubmitOptions::new(),
            );
            *continuation_slot.lock() = Some(outer_scheduler.yield_now());
        },
        SubmitOptions::new(),
    );

    tasklane::test_section!("outer task tick");
    host.step();
    tasklane::assert_with_log!(
        log.lock().clone() == vec!["outer"],
        "outer ran first",
        vec!["outer"],
        log.lock().clone()
    );

    tasklane::test_section!("continuation tick");
    host.step();
    let cont_finished = continuation
        .lock()
        .as_ref()
        .map(tasklane::TaskHandle::is_finished);
    tasklane::assert_with_log!(
        cont_finished == Some(true),
        "continuation beat the older fresh task",
        Some(true),
        cont_finished
    );
    tasklane::assert_with_log!(
        log.lock().clone() == vec!["outer"],
        "fresh task still waiting",
        vec!["outer"],
        log.lock().clone()
    );

    host.run_until_quiescent();
    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["outer", "fresh"],
        "fresh task ran last",
        vec!["outer", "fresh"],
        order
    );
    tasklane::test_complete!("yield_outranks_older_fresh_task");
}

#[test]
fn lower_priorities_starve_while_higher_work_remains() {
    init_test("lower_priorities_starve");
    let (host, scheduler, log) = fixture();

    // The first user-blocking task submits a second one from inside its
    // callback; background work still runs last.
    log_task(
        &scheduler,
        &log,
        "background",
        SubmitOptions::new().with_priority(Priority::Background),
    );
    let chain_scheduler = scheduler.clone();
    let chain_log = Arc::clone(&log);
    let _handle = scheduler.post_task(
        move || {
            chain_log.lock().push("blocking-1");
            let log = Arc::clone(&chain_log);
            let _second = chain_scheduler.post_task(
                move || {
                    log.lock().push("blocking-2");
                },
                SubmitOptions::new().with_priority(Priority::UserBlocking),
            );
        },
        SubmitOptions::new().with_priority(Priority::UserBlocking),
    );

    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["blocking-1", "blocking-2", "background"],
        "background waits for the user-blocking stream to drain",
        vec!["blocking-1", "blocking-2", "background"],
        order
    );
    tasklane::test_complete!("lower_priorities_starve");
}

#[test]
fn at_most_one_wakeup_is_pending() {
    init_test("at_most_one_wakeup_is_pending");
    let (host, scheduler, log) = fixture();

    tasklane::assert_with_log!(
        !scheduler.has_pending_wakeup(),
        "no wakeup before any submission",
        false,
        scheduler.has_pending_wakeup()
    );

    for tag in ["a", "b", "c"] {
        log_task(&scheduler, &log, tag, SubmitOptions::new());
    }
    tasklane::assert_with_log!(
        scheduler.has_pending_wakeup(),
        "one wakeup after submissions",
        true,
        scheduler.has_pending_wakeup()
    );

    host.run_until_quiescent();
    tasklane::assert_with_log!(
        !scheduler.has_pending_wakeup(),
        "wakeup released once queues drain",
        false,
        scheduler.has_pending_wakeup()
    );
    tasklane::assert_with_log!(
        scheduler.task_count() == 0,
        "no tasks left",
        0,
        scheduler.task_count()
    );
    tasklane::test_complete!("at_most_one_wakeup_is_pending");
}

#[test]
fn background_only_work_runs_from_the_idle_callback() {
    init_test("background_only_work_runs_from_idle");
    let (host, scheduler, log) = fixture();

    log_task(
        &scheduler,
        &log,
        "idle-work",
        SubmitOptions::new().with_priority(Priority::Background),
    );

    host.run_until_quiescent();
    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["idle-work"],
        "background task ran at idle time",
        vec!["idle-work"],
        order
    );
    tasklane::test_complete!("background_only_work_runs_from_idle");
}

#[test]
fn higher_submission_upgrades_a_lazy_idle_wakeup() {
    init_test("higher_submission_upgrades_idle_wakeup");
    let (host, scheduler, log) = fixture();

    // Arm an idle wakeup for background work, then submit user-visible work
    // without giving the host a chance to run anything in between.
    log_task(
        &scheduler,
        &log,
        "background",
        SubmitOptions::new().with_priority(Priority::Background),
    );
    log_task(
        &scheduler,
        &log,
        "visible",
        SubmitOptions::new().with_priority(Priority::UserVisible),
    );

    host.run_until_quiescent();

    let order = log.lock().clone();
    tasklane::assert_with_log!(
        order == vec!["visible", "background"],
        "the idle wakeup was replaced and priority order held",
        vec!["visible", "background"],
        order
    );
    tasklane::test_complete!("higher_submission_upgrades_idle_wakeup");
}
