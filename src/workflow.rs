//! The create-test wizard: a closed set of steps, an explicit transition table and a
//! back-stack, plus the recording progress timer.

use crate::model::{JobId, SessionId};
use std::fmt;
use std::time::{Duration, Instant};

pub const DEFAULT_RECORDING_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Step {
    #[default]
    Home,
    RecordForm,
    Recording,
    RecordingComplete,
    ManualTests,
    AutomationScript,
    TrialRun,
    Finished,
}

impl Step {
    pub const ALL: [Step; 8] = [
        Step::Home,
        Step::RecordForm,
        Step::Recording,
        Step::RecordingComplete,
        Step::ManualTests,
        Step::AutomationScript,
        Step::TrialRun,
        Step::Finished,
    ];

    /// Steps reachable from `self` by [`WorkflowController::navigate`].
    pub fn allowed_next(self) -> &'static [Step] {
        use Step::*;
        match self {
            Home => &[RecordForm, ManualTests, AutomationScript],
            RecordForm => &[Recording],
            Recording => &[RecordingComplete],
            RecordingComplete => &[ManualTests, AutomationScript],
            ManualTests => &[AutomationScript, Finished],
            AutomationScript => &[TrialRun, Finished],
            TrialRun => &[AutomationScript, Finished],
            Finished => &[],
        }
    }

    pub fn can_go_to(self, next: Step) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Home => "Start",
            Step::RecordForm => "Record a flow",
            Step::Recording => "Recording",
            Step::RecordingComplete => "Recording complete",
            Step::ManualTests => "Manual tests",
            Step::AutomationScript => "Automation script",
            Step::TrialRun => "Trial run",
            Step::Finished => "Finished",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot go from {from} to {to}")]
    NotAllowed { from: Step, to: Step },
}

/// Everything the operator entered or received while walking through one flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    pub recorder_url: String,
    pub flow_name: String,
    pub recording_secs: Option<u64>,
    pub capture_dom: bool,
    pub capture_screenshots: bool,
    pub session_id: Option<SessionId>,
    pub event_log: Vec<String>,
    pub story: String,
    pub manual_job: Option<JobId>,
    pub manual_cases: Option<serde_json::Value>,
    pub script: Option<String>,
    pub trial_log: Vec<String>,
    pub headed: bool,
    /// Document picked for ingestion alongside the story.
    pub source_file: String,
}

impl FlowState {
    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs(self.recording_secs.unwrap_or(DEFAULT_RECORDING_SECS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingTimer {
    started: Instant,
    duration: Duration,
}

impl RecordingTimer {
    pub fn new(started: Instant, duration: Duration) -> Self {
        Self { started, duration }
    }

    /// Elapsed share of the duration in percent, clamped to 0..=100.
    pub fn progress(&self, now: Instant) -> u8 {
        if self.duration.is_zero() {
            return 100;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let pct = elapsed.as_millis().saturating_mul(100) / self.duration.as_millis();
        pct.min(100) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No recording timer is running.
    Idle,
    Progress(u8),
    /// The timer reached 100% and the controller moved to `RecordingComplete`.
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowController {
    step: Step,
    back: Vec<Step>,
    pub flow: FlowState,
    timer: Option<RecordingTimer>,
    progress: u8,
}

impl WorkflowController {
    pub fn step(&self) -> Step {
        self.step
    }

    pub fn back_stack(&self) -> &[Step] {
        &self.back
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_timing(&self) -> bool {
        self.timer.is_some()
    }

    pub fn navigate(&mut self, next: Step) -> Result<(), TransitionError> {
        self.navigate_at(next, Instant::now())
    }

    pub fn navigate_at(&mut self, next: Step, now: Instant) -> Result<(), TransitionError> {
        if !self.step.can_go_to(next) {
            return Err(TransitionError::NotAllowed {
                from: self.step,
                to: next,
            });
        }
        tracing::debug!(from = %self.step, to = %next, "wizard transition");
        self.back.push(self.step);
        self.enter(next, now);
        Ok(())
    }

    /// Return to the previous step. Does nothing when there is none.
    pub fn go_back(&mut self) {
        self.go_back_at(Instant::now());
    }

    pub fn go_back_at(&mut self, now: Instant) {
        if let Some(prev) = self.back.pop() {
            tracing::debug!(from = %self.step, to = %prev, "wizard back");
            self.enter(prev, now);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance the recording timer. Reaching 100% moves to `RecordingComplete`.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let Some(timer) = self.timer else {
            return Tick::Idle;
        };
        self.progress = timer.progress(now);
        if self.progress < 100 {
            return Tick::Progress(self.progress);
        }
        match self.navigate_at(Step::RecordingComplete, now) {
            Ok(()) => {
                self.progress = 100;
                Tick::Completed
            }
            Err(e) => {
                tracing::warn!(error = %e, "recording timer fired outside the recording step");
                self.timer = None;
                Tick::Idle
            }
        }
    }

    fn enter(&mut self, step: Step, now: Instant) {
        self.step = step;
        if step == Step::Recording {
            // Re-entering through back re-arms the timer from now.
            self.timer = Some(RecordingTimer::new(now, self.flow.recording_duration()));
            self.progress = 0;
        } else if self.timer.take().is_some() && step != Step::RecordingComplete {
            self.progress = 0;
        }
    }
}
