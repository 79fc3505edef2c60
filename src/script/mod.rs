//! Interaction scripts.
//!
//! A script is a JSON-lines file describing what a participant did, one
//! action per line. Replaying it drives a [`SessionAggregator`] exactly as
//! the study views would, with a manual clock standing in for real time.

use crate::models::{EventKind, TaskStep, TaskType, Version};
use crate::session::{ManualClock, SessionAggregator};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// Longest single `wait` a script may ask for: one day.
pub const MAX_WAIT_SECS: f64 = 86_400.0;

/// One participant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SetLanguage {
        language: String,
    },
    SetContext {
        #[serde(default)]
        genre: Option<String>,
        #[serde(default)]
        emotion: Option<String>,
    },
    BeginExploration {
        genre: String,
        emotion: String,
    },
    SetVersion {
        version: Version,
    },
    SetTaskType {
        task_type: TaskType,
    },
    SetStep {
        step: TaskStep,
    },
    AdvanceStep,
    Click {
        song_id: String,
        x: f64,
        y: f64,
    },
    PlayStart {
        song_id: String,
    },
    PlayEnd,
    ToggleLike {
        song_id: String,
    },
    /// A view-level event with free-form data.
    Event {
        name: String,
        #[serde(default)]
        data: Map<String, Value>,
    },
    /// Let time pass.
    Wait {
        seconds: f64,
    },
    Response {
        question_id: String,
        value: Value,
    },
    FinalResponse {
        question_id: String,
        value: Value,
    },
    ResetListened,
}

/// Parse a script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(content: &str) -> Result<Vec<Action>> {
    let mut actions = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let action: Action = serde_json::from_str(line)
            .with_context(|| format!("Invalid action on line {}", index + 1))?;
        actions.push(action);
    }

    Ok(actions)
}

/// Read and parse a script file.
pub fn load_script(path: &Path) -> Result<Vec<Action>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    parse_script(&content).with_context(|| format!("Failed to parse script: {}", path.display()))
}

/// Counters collected while replaying.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplayStats {
    pub actions: usize,
    pub blocked_advances: usize,
    pub elapsed_seconds: f64,
}

/// Apply actions to a session, advancing `clock` on `wait`.
///
/// Leaving a guided or free step while its progress gate is closed is
/// refused and counted, the same way the wizard keeps its "next" button
/// disabled.
pub fn replay(
    session: &mut SessionAggregator,
    clock: &ManualClock,
    actions: &[Action],
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for action in actions {
        debug!("Replaying {:?}", action);
        stats.actions += 1;

        match action {
            Action::SetLanguage { language } => session.set_language(language.clone()),
            Action::SetContext { genre, emotion } => {
                session.set_context(genre.clone(), emotion.clone())
            }
            Action::BeginExploration { genre, emotion } => {
                session.begin_exploration(genre.clone(), emotion.clone())
            }
            Action::SetVersion { version } => session.set_version(*version),
            Action::SetTaskType { task_type } => session.set_task_type(*task_type),
            Action::SetStep { step } => session.set_step(*step),
            Action::AdvanceStep => {
                if gate_open(session) {
                    session.advance_step();
                } else {
                    info!("Progress gate closed at step {}", session.task_step());
                    stats.blocked_advances += 1;
                }
            }
            Action::Click { song_id, x, y } => session.record_click(song_id, *x, *y),
            Action::PlayStart { song_id } => session.record_play_start(song_id),
            Action::PlayEnd => {
                session.record_play_end();
            }
            Action::ToggleLike { song_id } => {
                session.toggle_like(song_id);
            }
            Action::Event { name, data } => session.record_event(EventKind::Custom {
                name: name.clone(),
                data: data.clone(),
            }),
            Action::Wait { seconds } => {
                if !seconds.is_finite() || *seconds < 0.0 || *seconds > MAX_WAIT_SECS {
                    bail!(
                        "Wait must be between 0 and {} seconds, got {}",
                        MAX_WAIT_SECS,
                        seconds
                    );
                }
                clock.advance_secs(*seconds);
                stats.elapsed_seconds += seconds;
            }
            Action::Response { question_id, value } => {
                session.set_response(question_id.clone(), value.clone())
            }
            Action::FinalResponse { question_id, value } => {
                session.set_final_response(question_id.clone(), value.clone())
            }
            Action::ResetListened => session.reset_listened(),
        }
    }

    Ok(stats)
}

fn gate_open(session: &SessionAggregator) -> bool {
    match session.task_step().task() {
        Some((_, TaskType::Guided)) => session.can_proceed_from_guided(),
        Some((_, TaskType::Free)) => session.can_proceed_from_free(),
        None => true,
    }
}
