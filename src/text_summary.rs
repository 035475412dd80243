//! Text summary builders for CLI output.
//!
//! Each function formats one kind of result as human-readable lines for text mode.

use crate::model::{FlowSummary, Generated, JobSnapshot, Transcript, VectorRecord};
use crate::storage::HistoryEntry;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn pretty_json(v: &serde_json::Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}

pub(crate) fn job_summary(snap: &JobSnapshot) -> TextSummary {
    let mut lines = vec![format!("Job {}: {}", snap.id, snap.status)];
    if let Some(err) = snap.error.as_deref() {
        lines.push(format!("Error: {err}"));
    }
    if let Some(result) = snap.result.as_ref() {
        lines.push("Result:".into());
        lines.extend(pretty_json(result).lines().map(|l| format!("  {l}")));
    }
    TextSummary { lines }
}

/// Records with the first line of their content and a few metadata keys.
pub(crate) fn vector_summary(records: &[VectorRecord]) -> TextSummary {
    if records.is_empty() {
        return TextSummary {
            lines: vec!["No matching records.".into()],
        };
    }
    let mut lines = Vec::with_capacity(records.len() * 2);
    for (i, rec) in records.iter().enumerate() {
        let id = rec.id.as_deref().unwrap_or("-");
        let first = rec.content.lines().next().unwrap_or("").trim();
        lines.push(format!("{:>2}. [{id}] {}", i + 1, truncate(first, 100)));
        let meta: Vec<String> = rec
            .metadata
            .iter()
            .take(4)
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{k}={s}"),
                None => format!("{k}={v}"),
            })
            .collect();
        if !meta.is_empty() {
            lines.push(format!("    {}", meta.join("  ")));
        }
    }
    TextSummary { lines }
}

pub(crate) fn flows_summary(flows: &[FlowSummary]) -> TextSummary {
    if flows.is_empty() {
        return TextSummary {
            lines: vec!["No recorded flows.".into()],
        };
    }
    let lines = flows
        .iter()
        .map(|f| {
            format!(
                "{} ({}) steps={} {}",
                f.flow_name,
                f.flow_slug,
                f.step_count,
                f.timestamp.as_deref().unwrap_or("")
            )
            .trim_end()
            .to_string()
        })
        .collect();
    TextSummary { lines }
}

pub(crate) fn history_summary(entries: &[HistoryEntry]) -> TextSummary {
    if entries.is_empty() {
        return TextSummary {
            lines: vec!["No Jira ingestions recorded.".into()],
        };
    }
    let lines = entries
        .iter()
        .map(|e| format!("{}  {}  {}", e.timestamp, e.job_id, e.query))
        .collect();
    TextSummary { lines }
}

pub(crate) fn generated_summary(generated: &Generated) -> TextSummary {
    let lines = match generated {
        Generated::Script { flow_name, script } => {
            let mut lines = vec![format!("// flow: {flow_name}")];
            lines.extend(script.lines().map(str::to_string));
            lines
        }
        Generated::Payloads(v)
        | Generated::Inspection(v)
        | Generated::Persisted(v)
        | Generated::RecorderStatus(v) => pretty_json(v).lines().map(str::to_string).collect(),
    };
    TextSummary { lines }
}

pub(crate) fn transcript_summary(t: &Transcript) -> TextSummary {
    let state = if t.stopped {
        "stopped"
    } else if t.finished {
        "finished"
    } else {
        "ended"
    };
    TextSummary {
        lines: vec![format!("Stream {state} ({} line(s) kept)", t.lines.len())],
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, JobStatus};

    #[test]
    fn failed_job_shows_error() {
        let snap = JobSnapshot {
            id: JobId::new("j9"),
            status: JobStatus::Failed,
            result: None,
            error: Some("crawler timed out".into()),
        };
        let s = job_summary(&snap);
        assert_eq!(s.lines[0], "Job j9: failed");
        assert_eq!(s.lines[1], "Error: crawler timed out");
    }

    #[test]
    fn vector_lines_include_metadata() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source".into(), serde_json::json!("jira"));
        let recs = vec![VectorRecord {
            id: Some("r1".into()),
            content: "Login works\nsecond line".into(),
            metadata,
        }];
        let s = vector_summary(&recs);
        assert_eq!(s.lines[0], " 1. [r1] Login works");
        assert_eq!(s.lines[1], "    source=jira");
        assert_eq!(vector_summary(&[]).lines, vec!["No matching records."]);
    }

    #[test]
    fn stopped_transcript_is_reported() {
        let t = Transcript {
            lines: vec!["a".into(), "b".into()],
            stopped: true,
            finished: false,
        };
        assert_eq!(
            transcript_summary(&t).lines,
            vec!["Stream stopped (2 line(s) kept)"]
        );
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
