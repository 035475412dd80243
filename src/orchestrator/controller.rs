//! Console controller.
//!
//! Owns request dispatch, the single job poller and the active log stream, and emits
//! events for presentation layers.

use crate::api::stream::{drive_stream, StreamControl};
use crate::api::{Backend, BackendClient};
use crate::forms::{self, Outcome, Submission, TrialForm};
use crate::jobs::{JobPoller, PollerConfig, StatusSource};
use crate::model::{AppEvent, JobId, Notice, SessionId, Transcript};
use crate::storage::HistoryStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(Submission),
    /// A wizard submission. Its events come back wrapped in [`AppEvent::InFlow`].
    FlowSubmit {
        flow: u64,
        sub: Submission,
    },
    /// Poll an existing job, or stop polling with `None`.
    Watch {
        job_id: Option<JobId>,
        label: String,
    },
    StartTrial {
        flow: u64,
        form: TrialForm,
    },
    FollowRecorder {
        flow: u64,
        session_id: SessionId,
    },
    StopStream,
    ClearHistory,
    Quit,
}

/// What the controller talks to.
pub(crate) struct Services<B> {
    pub backend: Arc<B>,
    /// Streaming endpoints are only available over HTTP.
    pub streams: Option<Arc<BackendClient>>,
    pub history: Option<HistoryStore>,
    pub poller: PollerConfig,
}

/// The currently running log stream.
struct StreamCtx {
    flow: u64,
    ctrl_tx: UnboundedSender<StreamControl>,
    handle: Option<JoinHandle<Transcript>>,
}

enum StreamTarget {
    Trial(crate::api::TrialRunRequest),
    Recorder(SessionId),
}

fn start_stream(
    client: Arc<BackendClient>,
    flow: u64,
    target: StreamTarget,
    event_tx: UnboundedSender<AppEvent>,
) -> StreamCtx {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<StreamControl>();
    let handle = tokio::spawn(async move {
        let opened = match &target {
            StreamTarget::Trial(req) => client.open_trial_stream(req).await,
            StreamTarget::Recorder(id) => client.open_recorder_events(id).await,
        };
        match opened {
            Ok(body) => {
                drive_stream(body, ctrl_rx, |ev| {
                    let _ = event_tx.send(AppEvent::Stream(ev).in_flow(Some(flow)));
                })
                .await
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not open log stream");
                let _ = event_tx.send(AppEvent::Notice(e.to_notice()));
                Transcript {
                    lines: vec![format!("error: {e}")],
                    ..Transcript::default()
                }
            }
        }
    });
    StreamCtx {
        flow,
        ctrl_tx,
        handle: Some(handle),
    }
}

/// Serve UI commands until `Quit` or until the command channel closes.
pub(crate) async fn run_controller<B>(
    services: Services<B>,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()>
where
    B: Backend + 'static,
{
    let status: Arc<dyn StatusSource> = services.backend.clone();
    let mut poller = JobPoller::new(status, services.poller, event_tx.clone());
    let mut requests: JoinSet<(Option<u64>, Outcome)> = JoinSet::new();
    let mut stream_ctx: Option<StreamCtx> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Submit(sub)) => spawn_submit(&mut requests, &services, None, sub),
                    Some(UiCommand::FlowSubmit { flow, sub }) => {
                        spawn_submit(&mut requests, &services, Some(flow), sub)
                    }
                    Some(UiCommand::Watch { job_id, label }) => poller.watch(job_id, &label),
                    Some(UiCommand::StartTrial { flow, form }) => {
                        let req = match form.validate() {
                            Ok(req) => req,
                            Err(e) => {
                                let _ = event_tx.send(AppEvent::Notice(Notice::warning(e.to_string())));
                                continue;
                            }
                        };
                        stream_ctx = open_stream(&services, stream_ctx.take(), flow, StreamTarget::Trial(req), &event_tx);
                    }
                    Some(UiCommand::FollowRecorder { flow, session_id }) => {
                        stream_ctx = open_stream(&services, stream_ctx.take(), flow, StreamTarget::Recorder(session_id), &event_tx);
                    }
                    Some(UiCommand::StopStream) => {
                        if let Some(ctx) = &stream_ctx {
                            tracing::info!("stopping log stream");
                            let _ = ctx.ctrl_tx.send(StreamControl::Stop);
                        }
                    }
                    Some(UiCommand::ClearHistory) => {
                        if let Some(store) = &services.history {
                            match store.clear() {
                                Ok(()) => {
                                    let _ = event_tx.send(AppEvent::HistoryChanged(Vec::new()));
                                }
                                Err(e) => {
                                    let _ = event_tx.send(AppEvent::Notice(Notice::error(format!("{e:#}"))));
                                }
                            }
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        poller.stop();
                        requests.abort_all();
                        match &stream_ctx {
                            Some(ctx) => {
                                let _ = ctx.ctrl_tx.send(StreamControl::Stop);
                            }
                            None => break,
                        }
                    }
                }
            }
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                match joined {
                    Ok((flow, outcome)) => {
                        for ev in super::process_outcome(outcome, &mut poller) {
                            let _ = event_tx.send(ev.in_flow(flow));
                        }
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Notice(Notice::error(format!("request task failed: {e}"))));
                    }
                }
            }
            // Keep the JoinHandle in place until this branch wins so completion is never lost.
            transcript = async {
                if let Some(ctx) = &mut stream_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(joined) = transcript {
                    let flow = stream_ctx.take().map(|ctx| ctx.flow);
                    match joined {
                        Ok(t) => {
                            let _ = event_tx.send(AppEvent::StreamFinished(t).in_flow(flow));
                        }
                        Err(e) => {
                            let _ = event_tx.send(AppEvent::Notice(Notice::error(format!("stream task failed: {e}"))));
                        }
                    }
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn spawn_submit<B>(
    requests: &mut JoinSet<(Option<u64>, Outcome)>,
    services: &Services<B>,
    flow: Option<u64>,
    sub: Submission,
) where
    B: Backend + 'static,
{
    let backend = services.backend.clone();
    let history = services.history.clone();
    tracing::debug!(form = sub.name(), ?flow, "submitting");
    requests.spawn(async move { (flow, forms::submit(&*backend, history.as_ref(), sub).await) });
}

fn open_stream<B>(
    services: &Services<B>,
    previous: Option<StreamCtx>,
    flow: u64,
    target: StreamTarget,
    event_tx: &UnboundedSender<AppEvent>,
) -> Option<StreamCtx> {
    if let Some(prev) = previous {
        // One stream at a time; the old one is cut off without a transcript.
        let _ = prev.ctrl_tx.send(StreamControl::Stop);
        if let Some(h) = prev.handle {
            h.abort();
        }
    }
    match &services.streams {
        Some(client) => Some(start_stream(client.clone(), flow, target, event_tx.clone())),
        None => {
            let _ = event_tx.send(AppEvent::Notice(Notice::error(
                "log streaming is not available for this backend",
            )));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::forms::{JiraForm, ManualForm};
    use crate::model::{JobKind, JobStatus, NoticeLevel};
    use std::time::Duration;

    fn services(fake: Arc<FakeBackend>, history: Option<HistoryStore>) -> Services<FakeBackend> {
        Services {
            backend: fake,
            streams: None,
            history,
            poller: PollerConfig::default(),
        }
    }

    async fn collect_until<F>(rx: &mut UnboundedReceiver<AppEvent>, mut done: F) -> Vec<AppEvent>
    where
        F: FnMut(&AppEvent) -> bool,
    {
        let mut out = Vec::new();
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for controller")
                .expect("controller hung up");
            let stop = done(&ev);
            out.push(ev);
            if stop {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn submitted_job_is_polled_to_completion() {
        let fake = Arc::new(FakeBackend::returning_job("m-1"));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(services(fake.clone(), None), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::Submit(Submission::Manual(ManualForm {
                story: "As an admin I can invite users".into(),
            })))
            .unwrap();
        let events = collect_until(&mut event_rx, |e| {
            matches!(e, AppEvent::Notice(n) if n.level == NoticeLevel::Success)
        })
        .await;

        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Submitted { kind: JobKind::ManualTests, job_id } if job_id.as_str() == "m-1"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::JobUpdate(s) if s.status == JobStatus::Completed
        )));
        assert_eq!(fake.calls(), vec!["generate_manual", "job_status"]);

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wizard_submissions_come_back_tagged_with_their_flow() {
        let fake = Arc::new(FakeBackend::returning_job("m-2"));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(services(fake, None), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::FlowSubmit {
                flow: 7,
                sub: Submission::Manual(ManualForm {
                    story: "As a guest I can browse the catalog".into(),
                }),
            })
            .unwrap();
        let events = collect_until(&mut event_rx, |e| matches!(e, AppEvent::JobUpdate(_))).await;

        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::InFlow { flow: 7, event }
                if matches!(**event, AppEvent::Submitted { kind: JobKind::ManualTests, .. })
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AppEvent::Submitted { .. })));

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn invalid_form_warns_without_calling_backend() {
        let fake = Arc::new(FakeBackend::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(services(fake.clone(), None), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::Submit(Submission::Jira(JiraForm::default())))
            .unwrap();
        cmd_tx
            .send(UiCommand::StartTrial {
                flow: 0,
                form: TrialForm::default(),
            })
            .unwrap();
        let mut seen = 0;
        let events = collect_until(&mut event_rx, |_| {
            seen += 1;
            seen == 2
        })
        .await;
        for ev in &events {
            assert!(matches!(ev, AppEvent::Notice(n) if n.level == NoticeLevel::Warning));
        }
        assert_eq!(fake.call_count(), 0);

        drop(cmd_tx);
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn clear_history_reports_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::at(dir.path().join("h.json"));
        store.record(&JobId::new("j"), "project=A").unwrap();
        let fake = Arc::new(FakeBackend::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(
            services(fake, Some(store.clone())),
            event_tx,
            cmd_rx,
        ));

        cmd_tx.send(UiCommand::ClearHistory).unwrap();
        let events = collect_until(&mut event_rx, |e| matches!(e, AppEvent::HistoryChanged(_))).await;
        assert!(matches!(events.last(), Some(AppEvent::HistoryChanged(v)) if v.is_empty()));
        assert!(store.load().is_empty());

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }
}
