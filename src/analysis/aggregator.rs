//! Per-context and per-session statistics.
//!
//! This module provides utilities for summarizing the buckets of a
//! session document for reporting.

use crate::models::{Condition, ContextBucket, EventKind, PathStep, SessionDocument, TaskType};
use crate::session::ContextKey;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Figures for one context bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStats {
    pub key: ContextKey,
    pub task_type: Option<TaskType>,
    /// Condition behind the bucket's version, when the mapping is known.
    pub condition: Option<Condition>,
    pub events: usize,
    pub clicks: usize,
    pub plays: usize,
    pub listened_seconds: f64,
    pub liked: usize,
    pub responses: usize,
    pub path_steps: usize,
}

impl ContextStats {
    fn from_bucket(key: &ContextKey, bucket: &ContextBucket, doc: &SessionDocument) -> Self {
        let condition = match (doc.version_mapping, bucket.version) {
            (Some(mapping), Some(version)) => Some(mapping.condition(version)),
            _ => None,
        };

        Self {
            key: key.clone(),
            task_type: bucket.task_type,
            condition,
            events: bucket.events.len(),
            clicks: bucket.count_events("click"),
            plays: bucket.count_events("play_start"),
            listened_seconds: bucket.listened_seconds(),
            liked: bucket.liked_songs.len(),
            responses: bucket.responses.len(),
            path_steps: bucket.path.len(),
        }
    }
}

/// Statistics for every bucket, in key order.
pub fn context_stats(doc: &SessionDocument) -> Vec<ContextStats> {
    doc.data
        .iter()
        .map(|(key, bucket)| ContextStats::from_bucket(key, bucket, doc))
        .collect()
}

/// Totals across the whole session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub contexts: usize,
    pub total_events: usize,
    pub total_listened_seconds: f64,
    /// Distinct songs liked in any context.
    pub liked_songs: usize,
    pub responses: usize,
    /// Listening seconds per condition ("GT" / "Model").
    pub listened_by_condition: BTreeMap<String, f64>,
}

impl SessionSummary {
    pub fn from_document(doc: &SessionDocument) -> Self {
        let mut summary = Self::default();
        let mut liked = BTreeSet::new();

        for stats in context_stats(doc) {
            summary.contexts += 1;
            summary.total_events += stats.events;
            summary.total_listened_seconds += stats.listened_seconds;
            summary.responses += stats.responses;

            if let Some(condition) = stats.condition {
                *summary
                    .listened_by_condition
                    .entry(condition.to_string())
                    .or_insert(0.0) += stats.listened_seconds;
            }
        }

        for bucket in doc.data.values() {
            liked.extend(bucket.liked_songs.iter().cloned());
        }
        summary.liked_songs = liked.len();

        summary
    }
}

/// The `n` songs with the most accumulated listening, longest first.
pub fn most_played_songs(doc: &SessionDocument, n: usize) -> Vec<(String, f64)> {
    let mut totals: HashMap<&str, f64> = HashMap::new();

    for bucket in doc.data.values() {
        for event in &bucket.events {
            if let EventKind::PlayEnd { song_id, duration } = &event.kind {
                *totals.entry(song_id.as_str()).or_default() += duration;
            }
        }
    }

    let mut songs: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(song, secs)| (song.to_string(), secs))
        .collect();

    songs.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    songs.truncate(n);
    songs
}

/// Free-exploration paths that recorded at least one step.
pub fn free_paths(doc: &SessionDocument) -> Vec<(&ContextKey, &[PathStep])> {
    doc.data
        .iter()
        .filter(|(key, bucket)| key.is_free() && !bucket.path.is_empty())
        .map(|(key, bucket)| (key, bucket.path.as_slice()))
        .collect()
}
