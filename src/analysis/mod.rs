//! Session statistics.
//!
//! This module derives per-context and per-session figures from an
//! exported session document.

pub mod aggregator;

pub use aggregator::*;
