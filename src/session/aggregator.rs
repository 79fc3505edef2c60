//! Session aggregation.
//!
//! The [`SessionAggregator`] holds the session metadata, the navigation
//! state of the experiment wizard and every context bucket recorded so
//! far. Views mutate it through `&mut` and read it back synchronously.

use crate::models::{
    ContextBucket, Event, EventKind, ListenedEntry, ListenedState, PathStep, Playback,
    SessionDocument, TaskStep, TaskType, Version, VersionMapping, BUILTIN_EVENT_TYPES,
};
use crate::session::clock::{Clock, SystemClock};
use crate::session::context::{ContextKey, MIXED};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Seconds of accumulated listening at which a song counts as listened.
pub const LISTENED_THRESHOLD_SECS: f64 = 5.0;

/// Default interface language.
pub const DEFAULT_LANGUAGE: &str = "zh";

/// Thresholds a participant must reach before leaving a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressGates {
    /// When false every gate passes.
    pub enforce: bool,
    pub guided_min_listened: usize,
    pub free_min_listened: usize,
    pub free_min_liked: usize,
}

impl Default for ProgressGates {
    fn default() -> Self {
        Self {
            enforce: false,
            guided_min_listened: 1,
            free_min_listened: 3,
            free_min_liked: 1,
        }
    }
}

impl From<&crate::config::GatesConfig> for ProgressGates {
    fn from(config: &crate::config::GatesConfig) -> Self {
        Self {
            enforce: config.enforce,
            guided_min_listened: config.guided_min_listened,
            free_min_listened: config.free_min_listened,
            free_min_liked: config.free_min_liked,
        }
    }
}

/// State of one participant's session.
pub struct SessionAggregator {
    clock: Box<dyn Clock>,
    gates: ProgressGates,

    user_id: Option<String>,
    language: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    version_mapping: Option<VersionMapping>,

    current_version: Version,
    current_genre: Option<String>,
    current_emotion: Option<String>,
    current_task_type: TaskType,
    explorations_count: u32,
    task_step: TaskStep,

    buckets: BTreeMap<ContextKey, ContextBucket>,
    listened: BTreeMap<String, ListenedEntry>,
    playback: Option<Playback>,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    /// Create an aggregator using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    /// Create an aggregator reading time from the given clock.
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            gates: ProgressGates::default(),
            user_id: None,
            language: DEFAULT_LANGUAGE.to_string(),
            start_time: None,
            end_time: None,
            version_mapping: None,
            current_version: Version::A,
            current_genre: None,
            current_emotion: None,
            current_task_type: TaskType::Guided,
            explorations_count: 0,
            task_step: TaskStep::Welcome,
            buckets: BTreeMap::new(),
            listened: BTreeMap::new(),
            playback: None,
        }
    }

    /// Replace the progress gates.
    pub fn with_gates(mut self, gates: ProgressGates) -> Self {
        self.gates = gates;
        self
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a session with a fresh identity and a random version mapping.
    pub fn init_session(&mut self) {
        self.init_session_with_rng(&mut rand::thread_rng());
    }

    /// Like [`init_session`](Self::init_session), drawing the coin flip from `rng`.
    pub fn init_session_with_rng<R: Rng>(&mut self, rng: &mut R) {
        self.user_id = Some(Uuid::new_v4().to_string());
        self.start_time = Some(self.clock.now());
        self.version_mapping = Some(VersionMapping::from_coin(rng.gen_bool(0.5)));

        info!(
            "Session initialized: user {} mapping {:?}",
            self.user_id.as_deref().unwrap_or_default(),
            self.version_mapping
        );
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn version_mapping(&self) -> Option<VersionMapping> {
        self.version_mapping
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn task_step(&self) -> TaskStep {
        self.task_step
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn current_task_type(&self) -> TaskType {
        self.current_task_type
    }

    pub fn current_genre(&self) -> Option<&str> {
        self.current_genre.as_deref()
    }

    pub fn current_emotion(&self) -> Option<&str> {
        self.current_emotion.as_deref()
    }

    pub fn explorations_count(&self) -> u32 {
        self.explorations_count
    }

    pub fn set_version(&mut self, version: Version) {
        self.current_version = version;
    }

    pub fn set_task_type(&mut self, task_type: TaskType) {
        self.current_task_type = task_type;
    }

    /// Point the session at a genre/emotion pair.
    pub fn set_context(&mut self, genre: Option<String>, emotion: Option<String>) {
        self.current_genre = genre;
        self.current_emotion = emotion;
    }

    /// Point the session at a genre/emotion pair and count a new exploration.
    pub fn begin_exploration(&mut self, genre: impl Into<String>, emotion: impl Into<String>) {
        self.set_context(Some(genre.into()), Some(emotion.into()));
        self.explorations_count += 1;
        debug!(
            "Exploration {} started in {}",
            self.explorations_count,
            self.context_key()
        );
    }

    /// Jump to a wizard step, adopting the version and task type it implies.
    pub fn set_step(&mut self, step: TaskStep) {
        self.task_step = step;
        if let Some((version, task_type)) = step.task() {
            self.current_version = version;
            self.current_task_type = task_type;
        }
        info!("Task step: {}", step);
    }

    /// Move to the next wizard step and return it.
    pub fn advance_step(&mut self) -> TaskStep {
        let next = self.task_step.next();
        self.set_step(next);
        next
    }

    // ------------------------------------------------------------------
    // Key derivation
    // ------------------------------------------------------------------

    /// Key of the bucket events currently go to.
    pub fn context_key(&self) -> ContextKey {
        if self.task_step == TaskStep::Final {
            return ContextKey::Final;
        }
        ContextKey::task(
            self.current_genre.as_deref(),
            self.current_emotion.as_deref(),
            self.current_version,
            self.current_task_type,
        )
    }

    /// Key of the bucket questionnaire answers currently go to.
    ///
    /// Free tasks of one version share a single summary bucket; guided tasks
    /// keep one bucket per genre/emotion.
    pub fn questionnaire_key(&self) -> ContextKey {
        if self.task_step == TaskStep::Final {
            return ContextKey::Final;
        }
        match self.current_task_type {
            TaskType::Free => ContextKey::Summary(self.current_version),
            TaskType::Guided => self.context_key(),
        }
    }

    /// Bucket for the current context, created on first use.
    ///
    /// The final bucket carries no descriptors, whichever call creates it.
    fn ensure_context(&mut self) -> &mut ContextBucket {
        let key = self.context_key();
        if key == ContextKey::Final {
            return self.buckets.entry(key).or_default();
        }
        let (genre, emotion) = (self.current_genre.clone(), self.current_emotion.clone());
        let (version, task_type) = (self.current_version, self.current_task_type);
        self.buckets
            .entry(key)
            .or_insert_with(|| ContextBucket::new(genre, emotion, Some(version), Some(task_type)))
    }

    /// Read a bucket.
    pub fn bucket(&self, key: &ContextKey) -> Option<&ContextBucket> {
        self.buckets.get(key)
    }

    /// All buckets, ordered by key.
    pub fn buckets(&self) -> &BTreeMap<ContextKey, ContextBucket> {
        &self.buckets
    }

    // ------------------------------------------------------------------
    // Event recording
    // ------------------------------------------------------------------

    /// Append an event to the current context.
    ///
    /// Custom events named like a built-in type are recorded under a
    /// `view_` prefix.
    pub fn record_event(&mut self, kind: EventKind) {
        let kind = match kind {
            EventKind::Custom { name, data } => {
                if BUILTIN_EVENT_TYPES.contains(&name.as_str()) {
                    warn!("Custom event {} clashes with a built-in type, prefixing it", name);
                }
                EventKind::custom(name, data)
            }
            other => other,
        };
        let timestamp = self.clock.now_millis();
        self.ensure_context().events.push(Event { timestamp, kind });
    }

    /// Record a click on a song point. Free exploration also extends the path.
    pub fn record_click(&mut self, song_id: &str, x: f64, y: f64) {
        self.record_event(EventKind::Click {
            song_id: song_id.to_string(),
            x,
            y,
        });

        if self.current_task_type == TaskType::Free {
            let timestamp = self.clock.now_millis();
            self.ensure_context().path.push(PathStep {
                song_id: song_id.to_string(),
                x,
                y,
                timestamp,
                duration: None,
            });
        }
    }

    /// Start playing a song, ending whatever was playing before.
    pub fn record_play_start(&mut self, song_id: &str) {
        if self.playback.is_some() {
            self.record_play_end();
        }

        self.playback = Some(Playback {
            song_id: song_id.to_string(),
            started_at: self.clock.now_millis(),
            context: self.context_key(),
        });
        self.record_event(EventKind::PlayStart {
            song_id: song_id.to_string(),
        });
    }

    /// End the current playback, if any, and return its duration in seconds.
    ///
    /// The duration is charged to the context that was active when playback
    /// started, even if the participant has moved on since.
    pub fn record_play_end(&mut self) -> Option<f64> {
        let playback = self.playback.take()?;

        let now = self.clock.now_millis();
        let duration = now.saturating_sub(playback.started_at).max(0) as f64 / 1000.0;

        let bucket = self.buckets.entry(playback.context.clone()).or_default();
        bucket.events.push(Event {
            timestamp: now,
            kind: EventKind::PlayEnd {
                song_id: playback.song_id.clone(),
                duration,
            },
        });

        if playback.context.is_free() {
            if let Some(step) = bucket
                .path
                .iter_mut()
                .find(|p| p.song_id == playback.song_id && p.duration.is_none())
            {
                step.duration = Some(duration);
            }
        }

        self.listened
            .entry(playback.song_id.clone())
            .or_insert(ListenedEntry {
                duration: 0.0,
                timestamp: now,
            })
            .duration += duration;

        debug!(
            "Played {} for {:.1}s in {}",
            playback.song_id, duration, playback.context
        );
        Some(duration)
    }

    /// Song currently playing, if any.
    pub fn current_playback(&self) -> Option<&Playback> {
        self.playback.as_ref()
    }

    // ------------------------------------------------------------------
    // Likes
    // ------------------------------------------------------------------

    /// Flip whether a song is liked in the current context. Returns the new state.
    pub fn toggle_like(&mut self, song_id: &str) -> bool {
        let bucket = self.ensure_context();
        let liked = match bucket.liked_songs.iter().position(|s| s == song_id) {
            Some(index) => {
                bucket.liked_songs.remove(index);
                false
            }
            None => {
                bucket.liked_songs.push(song_id.to_string());
                true
            }
        };

        let song_id = song_id.to_string();
        self.record_event(if liked {
            EventKind::Like { song_id }
        } else {
            EventKind::Unlike { song_id }
        });
        liked
    }

    pub fn is_liked(&self, song_id: &str) -> bool {
        self.buckets
            .get(&self.context_key())
            .is_some_and(|b| b.liked_songs.iter().any(|s| s == song_id))
    }

    pub fn liked_count(&self) -> usize {
        self.buckets
            .get(&self.context_key())
            .map_or(0, |b| b.liked_songs.len())
    }

    // ------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------

    pub fn listened_state(&self, song_id: &str) -> ListenedState {
        match self.listened.get(song_id) {
            None => ListenedState::Unheard,
            Some(entry) if entry.duration < LISTENED_THRESHOLD_SECS => ListenedState::Skipped,
            Some(_) => ListenedState::Listened,
        }
    }

    /// Number of songs listened to for at least the threshold.
    pub fn listened_count(&self) -> usize {
        self.listened
            .values()
            .filter(|e| e.duration >= LISTENED_THRESHOLD_SECS)
            .count()
    }

    pub fn listened_songs(&self) -> &BTreeMap<String, ListenedEntry> {
        &self.listened
    }

    /// Forget listening history, e.g. when switching tasks.
    pub fn reset_listened(&mut self) {
        self.listened.clear();
    }

    // ------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------

    pub fn set_response(&mut self, question_id: impl Into<String>, value: Value) {
        let key = self.questionnaire_key();
        let (version, task_type) = (self.current_version, self.current_task_type);
        let bucket = self.buckets.entry(key).or_insert_with(|| {
            ContextBucket::new(
                Some(MIXED.to_string()),
                Some(MIXED.to_string()),
                Some(version),
                Some(task_type),
            )
        });
        bucket.responses.insert(question_id.into(), value);
    }

    pub fn response(&self, question_id: &str) -> Option<&Value> {
        self.buckets
            .get(&self.questionnaire_key())
            .and_then(|b| b.responses.get(question_id))
    }

    pub fn set_final_response(&mut self, question_id: impl Into<String>, value: Value) {
        self.buckets
            .entry(ContextKey::Final)
            .or_default()
            .responses
            .insert(question_id.into(), value);
    }

    pub fn final_response(&self, question_id: &str) -> Option<&Value> {
        self.buckets
            .get(&ContextKey::Final)
            .and_then(|b| b.responses.get(question_id))
    }

    // ------------------------------------------------------------------
    // Progress gates
    // ------------------------------------------------------------------

    pub fn can_proceed_from_guided(&self) -> bool {
        !self.gates.enforce || self.listened_count() >= self.gates.guided_min_listened
    }

    pub fn can_proceed_from_free(&self) -> bool {
        !self.gates.enforce
            || (self.listened_count() >= self.gates.free_min_listened
                && self.liked_count() >= self.gates.free_min_liked)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Stamp the end time and return the whole session under a fresh id.
    pub fn session_data(&mut self) -> SessionDocument {
        let end_time = self.clock.now();
        self.end_time = Some(end_time);

        SessionDocument {
            session_id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone().unwrap_or_default(),
            language: self.language.clone(),
            start_time: self.start_time.map(format_time),
            end_time: Some(format_time(end_time)),
            version_mapping: self.version_mapping,
            data: self.buckets.clone(),
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
