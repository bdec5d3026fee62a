//! Poll-transform-publish scheduling
//!
//! This module drives the exporter: each cycle reads metadata and the latest
//! positions, updates the published snapshot and then sleeps for whatever is
//! left of the interval.

mod r#loop;

pub use r#loop::{sleep_budget, CycleReport, PollConfig, PollLoop, PollLoopBuilder, PollState};
