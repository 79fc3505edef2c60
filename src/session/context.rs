//! Context keys.
//!
//! Every event and response lands in a bucket identified by a context key.
//! Keys are typed here and only rendered to strings at the JSON boundary.

use crate::models::{TaskType, Version};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder used in the string form when genre or emotion is unset.
pub const UNKNOWN: &str = "Unknown";

/// Descriptor stored on summary buckets, which span several genres.
pub const MIXED: &str = "Mixed";

/// Identifies one event/response bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextKey {
    /// A single exploration: `<genre>_<emotion>_<version>_<taskType>`.
    Task {
        genre: String,
        emotion: String,
        version: Version,
        task_type: TaskType,
    },
    /// All free-task questionnaire answers of one version: `Summary_<version>_free`.
    Summary(Version),
    /// The closing questionnaire: `final`.
    Final,
}

impl ContextKey {
    /// Build a task key, substituting `Unknown` for missing parts.
    pub fn task(
        genre: Option<&str>,
        emotion: Option<&str>,
        version: Version,
        task_type: TaskType,
    ) -> Self {
        ContextKey::Task {
            genre: genre.unwrap_or(UNKNOWN).to_string(),
            emotion: emotion.unwrap_or(UNKNOWN).to_string(),
            version,
            task_type,
        }
    }

    /// Whether playback in this context contributes to a free-task path.
    pub fn is_free(&self) -> bool {
        matches!(
            self,
            ContextKey::Task {
                task_type: TaskType::Free,
                ..
            } | ContextKey::Summary(_)
        )
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Task {
                genre,
                emotion,
                version,
                task_type,
            } => write!(f, "{}_{}_{}_{}", genre, emotion, version, task_type),
            ContextKey::Summary(version) => write!(f, "Summary_{}_free", version),
            ContextKey::Final => write!(f, "final"),
        }
    }
}

/// Error returned when a string is not a valid context key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid context key: {0}")]
pub struct ParseContextKeyError(String);

impl FromStr for ContextKey {
    type Err = ParseContextKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "final" {
            return Ok(ContextKey::Final);
        }

        let invalid = || ParseContextKeyError(s.to_string());

        // Split from the right: the genre is the only part that may
        // itself contain underscores.
        let mut parts = s.rsplitn(4, '_');
        let task_type = parts.next().and_then(TaskType::parse).ok_or_else(invalid)?;
        let version = parts.next().and_then(Version::parse).ok_or_else(invalid)?;
        let third = parts.next().ok_or_else(invalid)?;

        match parts.next() {
            Some(genre) if !genre.is_empty() && !third.is_empty() => Ok(ContextKey::Task {
                genre: genre.to_string(),
                emotion: third.to_string(),
                version,
                task_type,
            }),
            None if third == "Summary" && task_type == TaskType::Free => {
                Ok(ContextKey::Summary(version))
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for ContextKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContextKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
