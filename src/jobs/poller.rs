//! Fixed-interval job status polling with capped backoff on fetch failures.

use crate::api::Backend;
use crate::error::ConsoleError;
use crate::model::{AppEvent, JobId, JobSnapshot, JobStatus, Notice};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedSender, watch};

/// Anything that can report a job's current status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job: &JobId) -> Result<JobSnapshot, ConsoleError>;
}

#[async_trait]
impl<B> StatusSource for B
where
    B: Backend + ?Sized,
{
    async fn fetch_status(&self, job: &JobId) -> Result<JobSnapshot, ConsoleError> {
        self.job_status(job).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::ConsoleConfig> for PollerConfig {
    fn from(cfg: &crate::config::ConsoleConfig) -> Self {
        Self {
            interval: cfg.poll_interval,
            max_backoff: cfg.max_poll_backoff,
        }
    }
}

/// Delay before the next fetch after `failures` consecutive errors (0 = healthy).
pub fn backoff_delay(cfg: &PollerConfig, failures: u32) -> Duration {
    if failures == 0 {
        return cfg.interval;
    }
    let factor = 1u32 << failures.min(16);
    cfg.interval
        .saturating_mul(factor)
        .min(cfg.max_backoff.max(cfg.interval))
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 10) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// Decides when a terminal notification is due.
///
/// Tracks the last *notified* status, which is distinct from the last fetched one, so
/// repeated observations of the same terminal status stay silent.
#[derive(Debug, Default)]
pub struct TerminalNotifier {
    last_notified: Option<JobStatus>,
}

impl TerminalNotifier {
    pub fn observe(&mut self, label: &str, snap: &JobSnapshot) -> Option<Notice> {
        if !snap.status.is_terminal() || self.last_notified == Some(snap.status) {
            return None;
        }
        self.last_notified = Some(snap.status);
        match snap.status {
            JobStatus::Completed => Some(Notice::success(format!(
                "{label} completed (job {})",
                snap.id
            ))),
            JobStatus::Failed => Some(Notice::error(format!(
                "{label} failed (job {}): {}",
                snap.id,
                snap.error.as_deref().unwrap_or("no error message from backend")
            ))),
            _ => None,
        }
    }
}

/// Latest known state of a polled job.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    pub latest: Option<JobSnapshot>,
    pub last_error: Option<String>,
    pub fetches: u64,
    pub done: bool,
}

/// Poll `job` until it reaches a terminal status and return the final snapshot.
///
/// Fetch errors are logged and reported as [`AppEvent::PollFailed`]; they never end the loop.
pub async fn poll_job(
    source: &dyn StatusSource,
    cfg: &PollerConfig,
    job: &JobId,
    label: &str,
    event_tx: &UnboundedSender<AppEvent>,
    state_tx: &watch::Sender<PollState>,
) -> JobSnapshot {
    let mut notifier = TerminalNotifier::default();
    let mut failures: u32 = 0;
    let mut warned_unknown = false;

    loop {
        let res = source.fetch_status(job).await;
        match res {
            Ok(snap) => {
                failures = 0;
                if snap.status == JobStatus::Unknown && !warned_unknown {
                    tracing::warn!(job = %job, "backend reported an unrecognised job status; still polling");
                    warned_unknown = true;
                }
                tracing::debug!(job = %job, status = %snap.status, "job status");
                let _ = event_tx.send(AppEvent::JobUpdate(snap.clone()));
                if let Some(notice) = notifier.observe(label, &snap) {
                    let _ = event_tx.send(AppEvent::Notice(notice));
                }
                let terminal = snap.status.is_terminal();
                state_tx.send_modify(|s| {
                    s.latest = Some(snap.clone());
                    s.last_error = None;
                    s.fetches += 1;
                    s.done = terminal;
                });
                if terminal {
                    return snap;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let message = e.to_string();
                tracing::warn!(job = %job, attempt = failures, error = %message, "job status fetch failed; retrying");
                let _ = event_tx.send(AppEvent::PollFailed {
                    job_id: job.clone(),
                    message: message.clone(),
                });
                state_tx.send_modify(|s| {
                    s.last_error = Some(message);
                    s.fetches += 1;
                });
            }
        }
        let delay = if failures == 0 {
            cfg.interval
        } else {
            with_jitter(backoff_delay(cfg, failures))
        };
        tokio::time::sleep(delay).await;
    }
}

/// A running poll. Dropping it aborts the task.
pub struct PollHandle {
    job_id: JobId,
    state: watch::Receiver<PollState>,
    task: tokio::task::JoinHandle<()>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        // Dropping a JoinHandle does not cancel the task in Tokio.
        self.task.abort();
    }
}

pub fn spawn_poll(
    source: Arc<dyn StatusSource>,
    cfg: PollerConfig,
    job: JobId,
    label: String,
    event_tx: UnboundedSender<AppEvent>,
) -> PollHandle {
    let (state_tx, state_rx) = watch::channel(PollState::default());
    let job_for_task = job.clone();
    let task = tokio::spawn(async move {
        poll_job(
            source.as_ref(),
            &cfg,
            &job_for_task,
            &label,
            &event_tx,
            &state_tx,
        )
        .await;
    });
    PollHandle {
        job_id: job,
        state: state_rx,
        task,
    }
}

/// Owns at most one active poll. Watching a new job cancels the previous one.
pub struct JobPoller {
    source: Arc<dyn StatusSource>,
    cfg: PollerConfig,
    event_tx: UnboundedSender<AppEvent>,
    active: Option<PollHandle>,
}

impl JobPoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        cfg: PollerConfig,
        event_tx: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            source,
            cfg,
            event_tx,
            active: None,
        }
    }

    /// Start polling `job`, or go idle when `None`. Re-watching the active id is a no-op.
    pub fn watch(&mut self, job: Option<JobId>, label: &str) {
        if let (Some(new), Some(active)) = (job.as_ref(), self.active.as_ref()) {
            if new == active.job_id() && !active.is_finished() {
                return;
            }
        }
        if let Some(previous) = self.active.take() {
            tracing::debug!(job = %previous.job_id(), "cancelling previous poll");
        }
        self.active = job.map(|id| {
            spawn_poll(
                self.source.clone(),
                self.cfg,
                id,
                label.to_string(),
                self.event_tx.clone(),
            )
        });
    }

    pub fn stop(&mut self) {
        self.active = None;
    }

    pub fn current(&self) -> Option<&JobId> {
        self.active.as_ref().map(|h| h.job_id())
    }

    pub fn state(&self) -> Option<PollState> {
        self.active.as_ref().map(|h| h.state())
    }
}
