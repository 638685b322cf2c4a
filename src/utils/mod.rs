//! Caller-side helpers for running watchers.

mod async_task;

pub use async_task::*;
