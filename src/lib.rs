//! Session state and data staging for an A/B music listening study.
//!
//! The [`session::SessionAggregator`] records what a participant does in
//! guided and free exploration tasks and what they answer in the
//! questionnaires. [`submit::Submitter`] stages the result: a local backup
//! first, then a best-effort POST to the study backend.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod models;
pub mod report;
pub mod script;
pub mod session;
pub mod storage;
pub mod submit;
