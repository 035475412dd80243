use crate::error::FormError;
use crate::model::{
    AppEvent, FlowSummary, Generated, JobId, JobKind, JobSnapshot, JobStatus, Notice,
    VectorRecord,
};
use crate::orchestrator::UiCommand;
use crate::forms::Submission;
use crate::storage::HistoryEntry;
use crate::workflow::{Step, Tick, WorkflowController};
use std::str::FromStr;
use std::time::Instant;

const MAX_LOG_LINES: usize = 500;
const MAX_TRACKED_JOBS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Workflow,
    Tools,
    Vector,
    Jobs,
    History,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Workflow,
        Tab::Tools,
        Tab::Vector,
        Tab::Jobs,
        Tab::History,
        Tab::Help,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Workflow => "Workflow",
            Tab::Tools => "Tools",
            Tab::Vector => "Vector",
            Tab::Jobs => "Jobs",
            Tab::History => "History",
            Tab::Help => "Help",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

/// One editable input on a non-wizard form.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub group: &'static str,
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

impl Field {
    fn text(group: &'static str, key: &'static str, label: &'static str, init: &str) -> Self {
        Self {
            group,
            key,
            label,
            value: init.to_string(),
        }
    }
}

/// A list of fields with a focus cursor.
#[derive(Debug, Clone, Default)]
pub struct FormView {
    pub fields: Vec<Field>,
    pub focus: usize,
}

impl FormView {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields, focus: 0 }
    }

    pub fn text(&self, key: &str) -> &str {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
            .unwrap_or("")
    }

    pub fn set_text(&mut self, key: &str, value: &str) {
        if let Some(f) = self.fields.iter_mut().find(|f| f.key == key) {
            f.value = value.to_string();
        }
    }

    /// Blank means `None`.
    pub fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, FormError> {
        let raw = self.text(key).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let label = self
            .fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.label)
            .unwrap_or("value");
        raw.parse().map(Some).map_err(|_| FormError::InvalidValue {
            field: label,
            reason: "must be a whole number".into(),
        })
    }

    pub fn focused(&self) -> Option<&Field> {
        self.fields.get(self.focus)
    }

    pub fn focused_mut(&mut self) -> Option<&mut Field> {
        self.fields.get_mut(self.focus)
    }

    pub fn focused_group(&self) -> Option<&'static str> {
        self.focused().map(|f| f.group)
    }

    pub fn next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }
}

/// Wizard inputs, stored directly in the flow state so a reset clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowField {
    RecorderUrl,
    FlowName,
    RecordingSecs,
    CaptureDom,
    CaptureScreenshots,
    Story,
    SourceFile,
    Headed,
}

impl FlowField {
    pub fn label(self) -> &'static str {
        match self {
            FlowField::RecorderUrl => "URL",
            FlowField::FlowName => "Flow name",
            FlowField::RecordingSecs => "Timeout (s)",
            FlowField::CaptureDom => "Capture DOM",
            FlowField::CaptureScreenshots => "Capture screenshots",
            FlowField::Story => "Story",
            FlowField::SourceFile => "Source document",
            FlowField::Headed => "Headed browser",
        }
    }
}

pub fn step_fields(step: Step) -> &'static [FlowField] {
    match step {
        Step::RecordForm => &[
            FlowField::RecorderUrl,
            FlowField::FlowName,
            FlowField::RecordingSecs,
            FlowField::CaptureDom,
            FlowField::CaptureScreenshots,
        ],
        Step::ManualTests => &[FlowField::Story, FlowField::SourceFile],
        Step::AutomationScript => &[FlowField::FlowName, FlowField::Story],
        Step::TrialRun => &[FlowField::Headed],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Trial,
    Recorder,
}

#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub kind: JobKind,
    pub snapshot: JobSnapshot,
    pub last_error: Option<String>,
}

/// Everything the dashboard renders. Owned by the UI thread only.
pub struct UiState {
    pub tab: Tab,
    pub editing: bool,
    pub info: Option<Notice>,
    pub base_url: String,
    pub recorder_secs: u64,

    pub wizard: WorkflowController,
    /// Bumped on every reset; wizard requests and streams carry it.
    pub flow_seq: u64,
    pub wf_focus: usize,
    pub stream: Option<StreamKind>,

    pub tools: FormView,
    pub last_generated: Option<Generated>,

    pub vector: FormView,
    pub filter_error: Option<String>,
    pub vector_results: Vec<VectorRecord>,
    pub flows: Vec<FlowSummary>,

    pub jobs: Vec<TrackedJob>,
    pub jobs_selected: usize,
    pub watched: Option<JobId>,

    pub history: Vec<HistoryEntry>,
    pub history_selected: usize,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: Tab::Workflow,
            editing: false,
            info: None,
            base_url: String::new(),
            recorder_secs: crate::workflow::DEFAULT_RECORDING_SECS,
            wizard: WorkflowController::default(),
            flow_seq: 0,
            wf_focus: 0,
            stream: None,
            tools: tools_form("main"),
            last_generated: None,
            vector: vector_form(),
            filter_error: None,
            vector_results: Vec::new(),
            flows: Vec::new(),
            jobs: Vec::new(),
            jobs_selected: 0,
            watched: None,
            history: Vec::new(),
            history_selected: 0,
            last_exported_path: None,
        }
    }
}

pub fn tools_form(default_branch: &str) -> FormView {
    FormView::new(vec![
        Field::text("document", "doc_path", "Document path", ""),
        Field::text("jira", "jql", "JQL", ""),
        Field::text("jira", "max_results", "Max results", ""),
        Field::text("website", "site_url", "Website URL", ""),
        Field::text("website", "depth", "Crawl depth", "1"),
        Field::text("payload", "payload_desc", "Endpoint / schema", ""),
        Field::text("payload", "payload_count", "Count", "5"),
        Field::text("inspect", "keyword", "Keyword", ""),
        Field::text("inspect", "inspect_repo", "Repo path", "."),
        Field::text("inspect", "max_assets", "Max assets", "5"),
        Field::text("git", "git_repo", "Repository path", ""),
        Field::text("git", "git_branch", "Branch", default_branch),
        Field::text("git", "git_message", "Commit message", ""),
    ])
}

pub fn vector_form() -> FormView {
    FormView::new(vec![
        Field::text("query", "query", "Query", ""),
        Field::text("query", "top_k", "Top-k", "5"),
        Field::text("query", "filter", "Filter (JSON)", ""),
        Field::text("delete", "delete_id", "Delete by id", ""),
        Field::text("delete", "delete_source", "Delete by source", ""),
    ])
}

impl UiState {
    pub fn notify(&mut self, notice: Notice) {
        self.info = Some(notice);
    }

    fn push_line(lines: &mut Vec<String>, line: String) {
        lines.push(line);
        if lines.len() > MAX_LOG_LINES {
            let _ = lines.drain(0..(lines.len() - MAX_LOG_LINES));
        }
    }

    fn job_mut(&mut self, id: &JobId) -> Option<&mut TrackedJob> {
        self.jobs.iter_mut().find(|j| &j.snapshot.id == id)
    }

    pub fn selected_job(&self) -> Option<&TrackedJob> {
        self.jobs.get(self.jobs_selected)
    }

    /// Reset the wizard to a fresh flow. Anything still in flight for the old flow is
    /// dropped when it arrives.
    pub fn new_flow(&mut self) {
        self.wizard.reset();
        self.flow_seq += 1;
        self.stream = None;
        self.wf_focus = 0;
        self.editing = false;
    }

    /// Tag a wizard submission with the current flow.
    pub fn flow_cmd(&self, sub: Submission) -> UiCommand {
        UiCommand::FlowSubmit {
            flow: self.flow_seq,
            sub,
        }
    }

    /// Stop the recorder event stream and the backend session.
    pub fn stop_recording(&mut self) -> Vec<UiCommand> {
        let mut cmds = vec![UiCommand::StopStream];
        match self.wizard.flow.session_id.clone() {
            Some(id) => cmds.push(self.flow_cmd(Submission::RecorderStop(id))),
            None => self.notify(Notice::warning("No recorder session")),
        }
        cmds
    }

    /// Drive the recording timer. Returns commands to send when the recording auto-completes.
    pub fn on_tick(&mut self, now: Instant) -> Vec<UiCommand> {
        match self.wizard.tick(now) {
            Tick::Completed => {
                self.wf_focus = 0;
                self.notify(Notice::success("Recording complete"));
                self.stop_recording()
            }
            Tick::Idle | Tick::Progress(_) => Vec::new(),
        }
    }

    pub fn track_job(&mut self, kind: JobKind, job_id: JobId) {
        if self.job_mut(&job_id).is_none() {
            self.jobs.insert(
                0,
                TrackedJob {
                    kind,
                    snapshot: JobSnapshot {
                        id: job_id.clone(),
                        status: JobStatus::Pending,
                        result: None,
                        error: None,
                    },
                    last_error: None,
                },
            );
            self.jobs.truncate(MAX_TRACKED_JOBS);
            self.jobs_selected = 0;
        }
        self.watched = Some(job_id);
    }
}

/// Results for a flow that has since been reset. Jobs are still tracked, and a recorder
/// session that started too late is stopped; nothing reaches the new flow.
fn apply_stale(state: &mut UiState, flow: u64, ev: AppEvent) -> Vec<UiCommand> {
    match ev {
        AppEvent::Submitted { kind, job_id } => state.track_job(kind, job_id),
        AppEvent::RecorderStarted { session_id } => {
            tracing::info!(%session_id, "stopping recorder started by an earlier flow");
            return vec![UiCommand::Submit(Submission::RecorderStop(session_id))];
        }
        AppEvent::Stream(_)
        | AppEvent::StreamFinished(_)
        | AppEvent::Generated(Generated::Script { .. }) => {
            tracing::debug!(flow, current = state.flow_seq, "dropping result of an earlier flow");
        }
        other => return apply_event(state, other),
    }
    Vec::new()
}

/// Fold one controller event into the UI state. Returns any follow-up commands.
pub fn apply_event(state: &mut UiState, ev: AppEvent) -> Vec<UiCommand> {
    match ev {
        AppEvent::Notice(n) => state.notify(n),
        AppEvent::InFlow { flow, event } => {
            if flow == state.flow_seq {
                return apply_event(state, *event);
            }
            return apply_stale(state, flow, *event);
        }
        AppEvent::Submitted { kind, job_id } => {
            if kind == JobKind::ManualTests {
                state.wizard.flow.manual_job = Some(job_id.clone());
                state.wizard.flow.manual_cases = None;
            }
            state.track_job(kind, job_id);
        }
        AppEvent::JobUpdate(snap) => {
            if snap.status == JobStatus::Completed
                && state.wizard.flow.manual_job.as_ref() == Some(&snap.id)
            {
                state.wizard.flow.manual_cases = snap.result.clone();
            }
            if snap.status.is_terminal() && state.watched.as_ref() == Some(&snap.id) {
                state.watched = None;
            }
            match state.job_mut(&snap.id) {
                Some(job) => {
                    job.snapshot = snap;
                    job.last_error = None;
                }
                None => tracing::debug!(job = %snap.id, "status for an untracked job"),
            }
        }
        AppEvent::PollFailed { job_id, message } => {
            if let Some(job) = state.job_mut(&job_id) {
                job.last_error = Some(message);
            }
        }
        AppEvent::RecorderStarted { session_id } => {
            let flow = &mut state.wizard.flow;
            flow.session_id = Some(session_id.clone());
            flow.event_log.clear();
            if flow.recording_secs.is_none() {
                flow.recording_secs = Some(state.recorder_secs);
            }
            if state.wizard.step() == Step::RecordForm {
                if let Err(e) = state.wizard.navigate(Step::Recording) {
                    state.notify(Notice::warning(e.to_string()));
                }
                state.wf_focus = 0;
            }
            state.stream = Some(StreamKind::Recorder);
            return vec![UiCommand::FollowRecorder {
                flow: state.flow_seq,
                session_id,
            }];
        }
        AppEvent::Stream(ev) => {
            if let Some(line) = ev.transcript_line() {
                let flow = &mut state.wizard.flow;
                match state.stream {
                    Some(StreamKind::Trial) => UiState::push_line(&mut flow.trial_log, line),
                    Some(StreamKind::Recorder) => UiState::push_line(&mut flow.event_log, line),
                    None => {}
                }
            }
        }
        AppEvent::StreamFinished(t) => {
            if state.stream == Some(StreamKind::Trial) {
                if t.stopped {
                    state.notify(Notice::warning(format!(
                        "Trial run stopped; {} line(s) kept",
                        t.lines.len()
                    )));
                }
                state.wizard.flow.trial_log = t.lines;
            }
            state.stream = None;
        }
        AppEvent::Generated(g) => match g {
            Generated::Script { flow_name, script } => {
                if state.wizard.flow.flow_name.trim().is_empty() {
                    state.wizard.flow.flow_name = flow_name;
                }
                state.wizard.flow.script = Some(script);
            }
            other => state.last_generated = Some(other),
        },
        AppEvent::VectorResults(records) => state.vector_results = records,
        AppEvent::Flows(flows) => state.flows = flows,
        AppEvent::FilterError(e) => state.filter_error = e,
        AppEvent::HistoryChanged(entries) => {
            state.history = entries;
            if state.history_selected >= state.history.len() {
                state.history_selected = state.history.len().saturating_sub(1);
            }
        }
    }
    Vec::new()
}
