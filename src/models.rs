//! Data models for the listening study.
//!
//! This module contains the core data structures recorded during a
//! session: version labels, task steps, events, path steps, context
//! buckets and the exported session document.

use crate::session::context::ContextKey;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Blinded version label shown to the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Version {
    A,
    B,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::A => write!(f, "A"),
            Version::B => write!(f, "B"),
        }
    }
}

impl Version {
    /// Parse a version label ("A" or "B").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Version::A),
            "B" => Some(Version::B),
            _ => None,
        }
    }
}

/// Underlying condition a version is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Ground-truth embedding space.
    #[serde(rename = "GT")]
    GroundTruth,
    /// Model-generated embedding space.
    Model,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::GroundTruth => write!(f, "GT"),
            Condition::Model => write!(f, "Model"),
        }
    }
}

/// Assignment of the blinded labels to conditions.
///
/// Always one of `{A: GT, B: Model}` or `{A: Model, B: GT}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMapping {
    #[serde(rename = "A")]
    pub a: Condition,
    #[serde(rename = "B")]
    pub b: Condition,
}

impl VersionMapping {
    /// Build the mapping from the result of a single coin flip.
    pub fn from_coin(a_is_ground_truth: bool) -> Self {
        if a_is_ground_truth {
            Self {
                a: Condition::GroundTruth,
                b: Condition::Model,
            }
        } else {
            Self {
                a: Condition::Model,
                b: Condition::GroundTruth,
            }
        }
    }

    /// Condition behind a version label.
    pub fn condition(&self, version: Version) -> Condition {
        match version {
            Version::A => self.a,
            Version::B => self.b,
        }
    }
}

/// Kind of exploration task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Structured exploration with fixed genre/emotion targets.
    Guided,
    /// Open-ended exploration; the only mode recording a path.
    Free,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Guided => write!(f, "guided"),
            TaskType::Free => write!(f, "free"),
        }
    }
}

impl TaskType {
    /// Parse a task type ("guided" or "free").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guided" => Some(TaskType::Guided),
            "free" => Some(TaskType::Free),
            _ => None,
        }
    }
}

/// Step of the experiment wizard, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskStep {
    #[default]
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "guided_A")]
    GuidedA,
    #[serde(rename = "guided_B")]
    GuidedB,
    #[serde(rename = "transition")]
    Transition,
    #[serde(rename = "free_A")]
    FreeA,
    #[serde(rename = "free_B")]
    FreeB,
    #[serde(rename = "final")]
    Final,
    #[serde(rename = "complete")]
    Complete,
}

impl TaskStep {
    /// The step that follows this one. `Complete` is terminal.
    pub fn next(self) -> Self {
        match self {
            TaskStep::Welcome => TaskStep::GuidedA,
            TaskStep::GuidedA => TaskStep::GuidedB,
            TaskStep::GuidedB => TaskStep::Transition,
            TaskStep::Transition => TaskStep::FreeA,
            TaskStep::FreeA => TaskStep::FreeB,
            TaskStep::FreeB => TaskStep::Final,
            TaskStep::Final | TaskStep::Complete => TaskStep::Complete,
        }
    }

    /// Version and task type the step puts the participant in, if any.
    pub fn task(self) -> Option<(Version, TaskType)> {
        match self {
            TaskStep::GuidedA => Some((Version::A, TaskType::Guided)),
            TaskStep::GuidedB => Some((Version::B, TaskType::Guided)),
            TaskStep::FreeA => Some((Version::A, TaskType::Free)),
            TaskStep::FreeB => Some((Version::B, TaskType::Free)),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStep::Welcome => "welcome",
            TaskStep::GuidedA => "guided_A",
            TaskStep::GuidedB => "guided_B",
            TaskStep::Transition => "transition",
            TaskStep::FreeA => "free_A",
            TaskStep::FreeB => "free_B",
            TaskStep::Final => "final",
            TaskStep::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Event types with a fixed payload. Custom events may not reuse these names.
pub const BUILTIN_EVENT_TYPES: [&str; 5] = ["click", "play_start", "play_end", "like", "unlike"];

/// What happened, with its payload.
///
/// Serialized through [`Event`], which flattens the payload next to `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventKind {
    Click { song_id: String, x: f64, y: f64 },
    PlayStart { song_id: String },
    PlayEnd { song_id: String, duration: f64 },
    Like { song_id: String },
    Unlike { song_id: String },
    /// Any other view-level event. `name` is written as `type` and the
    /// entries of `data` sit at the top level of the event.
    #[serde(skip)]
    Custom {
        name: String,
        data: Map<String, Value>,
    },
}

impl EventKind {
    /// Build a custom event, prefixing names that clash with a built-in type.
    pub fn custom(name: impl Into<String>, data: Map<String, Value>) -> Self {
        let name = name.into();
        let name = if BUILTIN_EVENT_TYPES.contains(&name.as_str()) {
            format!("view_{}", name)
        } else {
            name
        };
        EventKind::Custom { name, data }
    }

    /// Short name of the event type.
    pub fn name(&self) -> &str {
        match self {
            EventKind::Click { .. } => "click",
            EventKind::PlayStart { .. } => "play_start",
            EventKind::PlayEnd { .. } => "play_end",
            EventKind::Like { .. } => "like",
            EventKind::Unlike { .. } => "unlike",
            EventKind::Custom { name, .. } => name,
        }
    }
}

/// A timestamped event in a context bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub kind: EventKind,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = match &self.kind {
            EventKind::Custom { name, data } => {
                let mut fields = data.clone();
                fields.insert("type".to_string(), Value::String(name.clone()));
                fields
            }
            kind => match serde_json::to_value(kind).map_err(S::Error::custom)? {
                Value::Object(fields) => fields,
                other => {
                    return Err(S::Error::custom(format!(
                        "event payload is not an object: {}",
                        other
                    )))
                }
            },
        };
        fields.insert("timestamp".to_string(), Value::from(self.timestamp));
        fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;

        let timestamp = fields
            .remove("timestamp")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| D::Error::missing_field("timestamp"))?;
        let name = match fields.get("type") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(D::Error::missing_field("type")),
        };

        let kind = if BUILTIN_EVENT_TYPES.contains(&name.as_str()) {
            serde_json::from_value(Value::Object(fields)).map_err(D::Error::custom)?
        } else {
            fields.remove("type");
            EventKind::Custom { name, data: fields }
        };

        Ok(Event { timestamp, kind })
    }
}

/// One step of the spatial path recorded during free exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    pub song_id: String,
    pub x: f64,
    pub y: f64,
    pub timestamp: i64,
    /// Listening time in seconds, filled in when the playback ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Everything recorded for one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    pub events: Vec<Event>,
    pub path: Vec<PathStep>,
    /// Liked song ids in the order they were liked. Never holds duplicates.
    pub liked_songs: Vec<String>,
    pub responses: BTreeMap<String, Value>,
}

impl ContextBucket {
    /// Create an empty bucket with the given descriptors.
    pub fn new(
        genre: Option<String>,
        emotion: Option<String>,
        version: Option<Version>,
        task_type: Option<TaskType>,
    ) -> Self {
        Self {
            genre,
            emotion,
            version,
            task_type,
            ..Self::default()
        }
    }

    /// Number of events of a given type.
    pub fn count_events(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.kind.name() == name).count()
    }

    /// Total seconds of playback that ended in this context.
    pub fn listened_seconds(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e.kind {
                EventKind::PlayEnd { duration, .. } => duration,
                _ => 0.0,
            })
            .sum()
    }
}

/// Accumulated listening for one song, across all contexts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenedEntry {
    /// Total seconds listened.
    pub duration: f64,
    /// When the song was first played to the end (epoch ms).
    pub timestamp: i64,
}

/// How much of a song the participant has heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenedState {
    Unheard,
    Skipped,
    Listened,
}

impl fmt::Display for ListenedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenedState::Unheard => write!(f, "unheard"),
            ListenedState::Skipped => write!(f, "skipped"),
            ListenedState::Listened => write!(f, "listened"),
        }
    }
}

/// The playback currently running, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    pub song_id: String,
    /// Epoch ms at which playback started.
    pub started_at: i64,
    /// Context that was active when playback started.
    pub context: ContextKey,
}

/// Full session as exported and submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Fresh identifier minted for each export.
    pub session_id: String,
    pub user_id: String,
    pub language: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub version_mapping: Option<VersionMapping>,
    pub data: BTreeMap<ContextKey, ContextBucket>,
}
