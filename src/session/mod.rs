//! Session state for the listening study.
//!
//! This module provides the context-keyed session aggregator and the
//! pieces it is built from.

pub mod aggregator;
pub mod clock;
pub mod context;

pub use aggregator::{format_time, ProgressGates, SessionAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::ContextKey;
