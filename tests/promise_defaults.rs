#![allow(missing_docs)]
//! The process-wide default controller options for scheduled promises.
//!
//! This lives in its own test binary: the default record is process-wide
//! state, and tests that mutate it must not share a process with tests that
//! rely on the initial value.

use std::sync::Arc;
use tasklane::test_utils::init_test_logging;
use tasklane::{
    default_options, set_default_options, Priority, PromiseOptions, ScheduledPromise, Scheduler,
    SimulatedHost,
};

#[test]
fn default_record_starts_at_background_and_is_replaceable() {
    init_test_logging();
    tasklane::test_phase!("default_record_is_replaceable");

    tasklane::assert_with_log!(
        default_options().priority == Priority::Background,
        "the initial default record is background",
        Priority::Background,
        default_options().priority
    );

    let host = Arc::new(SimulatedHost::new());
    let scheduler = Scheduler::new(host.clone());

    set_default_options(PromiseOptions {
        priority: Priority::UserBlocking,
    });
    let promise = ScheduledPromise::new(&scheduler, |resolvers| resolvers.resolve(1));
    tasklane::assert_with_log!(
        promise.controller().signal().priority() == Priority::UserBlocking,
        "new promises pick up the replaced record",
        Priority::UserBlocking,
        promise.controller().signal().priority()
    );

    // Existing controllers are unaffected by later replacement.
    set_default_options(PromiseOptions {
        priority: Priority::Background,
    });
    tasklane::assert_with_log!(
        promise.controller().signal().priority() == Priority::UserBlocking,
        "replacement does not rewrite live controllers",
        Priority::UserBlocking,
        promise.controller().signal().priority()
    );

    host.run_until_quiescent();
    tasklane::assert_with_log!(
        promise.try_outcome() == Some(Ok::<i32, tasklane::TaskError>(1)),
        "the promise still settles",
        Some(Ok::<i32, tasklane::TaskError>(1)),
        promise.try_outcome()
    );
    tasklane::test_complete!("default_record_is_replaceable");
}
