//! Post-submission processing.
//!
//! Turns the outcome of a form submission into events for presentation layers and hands
//! newly created jobs to the poller.

use crate::forms::Outcome;
use crate::jobs::JobPoller;
use crate::model::{AppEvent, Generated, Notice};

pub(crate) fn process_outcome(outcome: Outcome, poller: &mut JobPoller) -> Vec<AppEvent> {
    let mut events = Vec::new();
    match outcome {
        Outcome::Job {
            kind,
            job_id,
            history,
        } => {
            events.push(AppEvent::Notice(Notice::info(format!(
                "{} queued (job {job_id})",
                kind.label()
            ))));
            events.push(AppEvent::Submitted {
                kind,
                job_id: job_id.clone(),
            });
            if let Some(entries) = history {
                events.push(AppEvent::HistoryChanged(entries));
            }
            poller.watch(Some(job_id), kind.label());
        }
        Outcome::Session(session_id) => {
            events.push(AppEvent::Notice(Notice::success(format!(
                "Recorder session {session_id} started"
            ))));
            events.push(AppEvent::RecorderStarted { session_id });
        }
        Outcome::Generated(generated) => {
            let msg = match &generated {
                Generated::Script { flow_name, .. } => format!("Script generated for {flow_name}"),
                Generated::Payloads(_) => "Payloads generated".to_string(),
                Generated::Inspection(_) => "Keyword inspection ready".to_string(),
                Generated::Persisted(_) => "Script saved".to_string(),
                Generated::RecorderStatus(_) => "Recorder status updated".to_string(),
            };
            events.push(AppEvent::Notice(Notice::success(msg)));
            events.push(AppEvent::Generated(generated));
        }
        Outcome::VectorResults(records) => {
            events.push(AppEvent::FilterError(None));
            events.push(AppEvent::Notice(Notice::info(format!(
                "{} record(s) found",
                records.len()
            ))));
            events.push(AppEvent::VectorResults(records));
        }
        Outcome::Flows(flows) => events.push(AppEvent::Flows(flows)),
        Outcome::Deleted(n) => {
            events.push(AppEvent::Notice(Notice::success(format!("Deleted {n} record(s)"))));
        }
        Outcome::Rejected(notice) => events.push(AppEvent::Notice(notice)),
        Outcome::InvalidFilter(msg) => events.push(AppEvent::FilterError(Some(msg))),
        Outcome::Failed(e) => events.push(AppEvent::Notice(e.to_notice())),
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{PollerConfig, StatusSource};
    use crate::model::{JobId, JobKind, NoticeLevel};
    use std::sync::Arc;

    fn poller() -> JobPoller {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let backend: Arc<dyn StatusSource> = Arc::new(crate::api::fake::FakeBackend::default());
        JobPoller::new(backend, PollerConfig::default(), tx)
    }

    #[tokio::test]
    async fn jobs_are_handed_to_the_poller() {
        let mut p = poller();
        let events = process_outcome(
            Outcome::Job {
                kind: JobKind::IngestWebsite,
                job_id: JobId::new("w-9"),
                history: None,
            },
            &mut p,
        );
        assert_eq!(p.current().map(|j| j.as_str()), Some("w-9"));
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Submitted { kind: JobKind::IngestWebsite, .. })));
    }

    #[tokio::test]
    async fn invalid_filter_becomes_inline_error_only() {
        let mut p = poller();
        let events = process_outcome(Outcome::InvalidFilter("Invalid filter: eof".into()), &mut p);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AppEvent::FilterError(Some(m)) if m.contains("eof")));
        assert!(p.current().is_none());
    }

    #[tokio::test]
    async fn rejected_forms_surface_the_warning() {
        let mut p = poller();
        let events = process_outcome(Outcome::Rejected(Notice::warning("JQL is required")), &mut p);
        assert!(matches!(
            &events[0],
            AppEvent::Notice(n) if n.level == NoticeLevel::Warning
        ));
    }
}
