//! Markdown session report generation.
//!
//! This module renders a human-readable summary of a session document,
//! mainly for the researcher checking a run before it is submitted.

use crate::analysis::{context_stats, free_paths, most_played_songs, ContextStats, SessionSummary};
use crate::models::{ContextBucket, PathStep, SessionDocument};
use crate::session::ContextKey;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(doc: &SessionDocument) -> String {
    let mut output = String::new();

    output.push_str("# Listening Study Session\n\n");

    output.push_str(&generate_metadata_section(doc));

    let summary = SessionSummary::from_document(doc);
    output.push_str(&generate_summary_section(&summary, doc));

    output.push_str(&generate_contexts_section(&context_stats(doc)));

    output.push_str(&generate_paths_section(&free_paths(doc)));

    output.push_str(&generate_responses_section(doc));

    output
}

/// Generate the metadata section.
fn generate_metadata_section(doc: &SessionDocument) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", doc.session_id));
    section.push_str(&format!("- **Participant:** `{}`\n", doc.user_id));
    section.push_str(&format!("- **Language:** {}\n", doc.language));
    if let Some(mapping) = doc.version_mapping {
        section.push_str(&format!(
            "- **Version Mapping:** A = {}, B = {}\n",
            mapping.a, mapping.b
        ));
    }
    section.push_str(&format!(
        "- **Started:** {}\n",
        doc.start_time.as_deref().unwrap_or("-")
    ));
    section.push_str(&format!(
        "- **Ended:** {}\n",
        doc.end_time.as_deref().unwrap_or("-")
    ));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &SessionSummary, doc: &SessionDocument) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Contexts | Events | Listened (s) | Liked Songs | Responses |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {:.1} | {} | {} |\n\n",
        summary.contexts,
        summary.total_events,
        summary.total_listened_seconds,
        summary.liked_songs,
        summary.responses
    ));

    if !summary.listened_by_condition.is_empty() {
        section.push_str("### Listening by Condition\n\n");
        section.push_str("| Condition | Listened (s) |\n");
        section.push_str("|:---|:---:|\n");
        for (condition, secs) in &summary.listened_by_condition {
            section.push_str(&format!("| {} | {:.1} |\n", condition, secs));
        }
        section.push('\n');
    }

    let top = most_played_songs(doc, 5);
    if !top.is_empty() {
        section.push_str("### Most Played Songs\n\n");
        section.push_str("| Song | Listened (s) |\n");
        section.push_str("|:---|:---:|\n");
        for (song, secs) in top {
            section.push_str(&format!("| `{}` | {:.1} |\n", song, secs));
        }
        section.push('\n');
    }

    section
}

/// Generate the per-context table.
fn generate_contexts_section(stats: &[ContextStats]) -> String {
    let mut section = String::new();

    section.push_str("## Contexts\n\n");

    if stats.is_empty() {
        section.push_str("Nothing was recorded in this session.\n\n");
        return section;
    }

    section.push_str(
        "| Context | Condition | Events | Clicks | Plays | Listened (s) | Liked | Responses |\n",
    );
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");

    for s in stats {
        let condition = s
            .condition
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {:.1} | {} | {} |\n",
            s.key,
            condition,
            s.events,
            s.clicks,
            s.plays,
            s.listened_seconds,
            s.liked,
            s.responses
        ));
    }
    section.push('\n');

    section
}

/// Generate the free-exploration paths section.
fn generate_paths_section(paths: &[(&ContextKey, &[PathStep])]) -> String {
    if paths.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Exploration Paths\n\n");

    for (key, steps) in paths {
        section.push_str(&format!("### {}\n\n", key));
        for (i, step) in steps.iter().enumerate() {
            let duration = step
                .duration
                .map(|d| format!("{:.1}s", d))
                .unwrap_or_else(|| "not played".to_string());
            section.push_str(&format!(
                "{}. `{}` at ({:.3}, {:.3}), {}\n",
                i + 1,
                step.song_id,
                step.x,
                step.y,
                duration
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the questionnaire answers, final questionnaire last.
fn generate_responses_section(doc: &SessionDocument) -> String {
    let answered: Vec<(&ContextKey, &ContextBucket)> = doc
        .data
        .iter()
        .filter(|(key, bucket)| **key != ContextKey::Final && !bucket.responses.is_empty())
        .collect();
    let final_responses = doc
        .data
        .get(&ContextKey::Final)
        .map(|b| &b.responses)
        .filter(|r| !r.is_empty());

    if answered.is_empty() && final_responses.is_none() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Questionnaires\n\n");

    for (key, bucket) in answered {
        section.push_str(&format!("### {}\n\n", key));
        section.push_str(&generate_answers_table(&bucket.responses));
    }

    if let Some(responses) = final_responses {
        section.push_str("### Final Questionnaire\n\n");
        section.push_str(&generate_answers_table(responses));
    }

    section
}

fn generate_answers_table(responses: &BTreeMap<String, Value>) -> String {
    let mut table = String::new();
    table.push_str("| Question | Answer |\n");
    table.push_str("|:---|:---|\n");
    for (question, answer) in responses {
        let answer = match answer {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        table.push_str(&format!(
            "| {} | {} |\n",
            escape_cell(question),
            escape_cell(&answer)
        ));
    }
    table.push('\n');
    table
}

/// Make free text safe inside a Markdown table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
}

/// Generate a JSON report.
pub fn generate_json_report(doc: &SessionDocument) -> Result<String> {
    serde_json::to_string_pretty(doc).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventKind, TaskType, Version, VersionMapping};
    use serde_json::json;

    fn create_test_document() -> SessionDocument {
        let mut free = ContextBucket::new(
            Some("Rock".to_string()),
            Some("Calm".to_string()),
            Some(Version::A),
            Some(TaskType::Free),
        );
        free.events.push(Event {
            timestamp: 0,
            kind: EventKind::PlayEnd {
                song_id: "song-9".to_string(),
                duration: 7.5,
            },
        });
        free.path.push(PathStep {
            song_id: "song-9".to_string(),
            x: 0.5,
            y: 0.25,
            timestamp: 0,
            duration: Some(7.5),
        });

        let mut summary = ContextBucket::default();
        summary
            .responses
            .insert("enjoyment".to_string(), json!("very much"));

        let mut final_bucket = ContextBucket::default();
        final_bucket.responses.insert("preferred".to_string(), json!("B"));

        let mut data = BTreeMap::new();
        data.insert(
            ContextKey::task(Some("Rock"), Some("Calm"), Version::A, TaskType::Free),
            free,
        );
        data.insert(ContextKey::Summary(Version::A), summary);
        data.insert(ContextKey::Final, final_bucket);

        SessionDocument {
            session_id: "session-1".to_string(),
            user_id: "participant-1".to_string(),
            language: "en".to_string(),
            start_time: Some("2026-10-19T08:00:00.000Z".to_string()),
            end_time: Some("2026-10-19T08:30:00.000Z".to_string()),
            version_mapping: Some(VersionMapping::from_coin(false)),
            data,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_document());

        assert!(markdown.contains("# Listening Study Session"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("A = Model, B = GT"));
        assert!(markdown.contains("## Contexts"));
        assert!(markdown.contains("`Rock_Calm_A_free`"));
        assert!(markdown.contains("## Exploration Paths"));
        assert!(markdown.contains("`song-9` at (0.500, 0.250), 7.5s"));
        assert!(markdown.contains("### Summary_A_free"));
        assert!(markdown.contains("| enjoyment | very much |"));
        assert!(markdown.contains("### Final Questionnaire"));
        assert!(markdown.contains("| preferred | B |"));
    }

    #[test]
    fn test_answers_with_pipes_and_newlines_stay_in_one_row() {
        let mut doc = create_test_document();
        doc.data
            .get_mut(&ContextKey::Final)
            .unwrap()
            .responses
            .insert("comments".to_string(), json!("A|B felt\nsimilar\r\noverall"));

        let markdown = generate_markdown_report(&doc);
        assert!(markdown.contains("| comments | A\\|B felt<br>similar<br>overall |\n"));
    }

    #[test]
    fn test_empty_session_report() {
        let mut doc = create_test_document();
        doc.data.clear();

        let markdown = generate_markdown_report(&doc);
        assert!(markdown.contains("Nothing was recorded"));
        assert!(!markdown.contains("## Questionnaires"));
        assert!(!markdown.contains("## Exploration Paths"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_document()).unwrap();

        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"Summary_A_free\""));
        assert!(json.contains("\"versionMapping\""));
    }
}
