//! Channel primitives used by task handles.

pub mod oneshot;
