use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque backend job identifier. Never mutated once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recorder session identifier returned by the start call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    /// Any status string this client does not know. Treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest observed state of a job, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a submitted job is doing; used for labels and post-completion routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    IngestDocument,
    IngestJira,
    IngestWebsite,
    ManualTests,
    RecorderFinalize,
    GitPush,
    VectorDelete,
}

impl JobKind {
    pub fn label(self) -> &'static str {
        match self {
            JobKind::IngestDocument => "Document ingestion",
            JobKind::IngestJira => "Jira ingestion",
            JobKind::IngestWebsite => "Website ingestion",
            JobKind::ManualTests => "Manual test generation",
            JobKind::RecorderFinalize => "Recording ingestion",
            JobKind::GitPush => "Git push",
            JobKind::VectorDelete => "Vector delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub flow_name: String,
    pub flow_slug: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub step_count: u64,
}

/// Vector deletes either run synchronously or hand back a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeleteOutcome {
    Job(JobHandle),
    Deleted { deleted: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing message (status line in the TUI, stderr in CLI mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Render with a level prefix for line-oriented output.
    pub fn to_line(&self) -> String {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        format!("[{tag}] {}", self.message)
    }
}

/// One decoded event from a recorder telemetry or trial-run log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    Log { line: String },
    Phase { phase: String, message: String },
    Status { status: String },
    Done { message: Option<String> },
    Error { message: String },
}

impl StreamEvent {
    /// Text retained in a transcript for this event, if any.
    pub fn transcript_line(&self) -> Option<String> {
        match self {
            StreamEvent::Log { line } => Some(line.clone()),
            StreamEvent::Phase { phase, message } => Some(format!("== {phase} == {message}")),
            StreamEvent::Status { status } => Some(format!("status: {status}")),
            StreamEvent::Done { message } => message.clone(),
            StreamEvent::Error { message } => Some(format!("error: {message}")),
        }
    }
}

/// Lines received from a streamed run, plus whether it was stopped by the operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub lines: Vec<String>,
    pub stopped: bool,
    pub finished: bool,
}

/// Synchronous generation results surfaced to presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Generated {
    Script { flow_name: String, script: String },
    Payloads(serde_json::Value),
    Inspection(serde_json::Value),
    Persisted(serde_json::Value),
    RecorderStatus(serde_json::Value),
}

/// Events emitted by the orchestrator and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Notice(Notice),
    Submitted {
        kind: JobKind,
        job_id: JobId,
    },
    JobUpdate(JobSnapshot),
    PollFailed {
        job_id: JobId,
        message: String,
    },
    RecorderStarted {
        session_id: SessionId,
    },
    Stream(StreamEvent),
    StreamFinished(Transcript),
    Generated(Generated),
    VectorResults(Vec<VectorRecord>),
    Flows(Vec<FlowSummary>),
    /// Inline validation message for the vector filter field; `None` clears it.
    FilterError(Option<String>),
    HistoryChanged(Vec<crate::storage::HistoryEntry>),
    /// Produced on behalf of one wizard flow. Stale once that flow has been reset.
    InFlow { flow: u64, event: Box<AppEvent> },
}

impl AppEvent {
    pub fn in_flow(self, flow: Option<u64>) -> AppEvent {
        match flow {
            Some(flow) => AppEvent::InFlow {
                flow,
                event: Box::new(self),
            },
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_strings_are_not_terminal() {
        let s: JobStatus = serde_json::from_str("\"retrying\"").unwrap();
        assert_eq!(s, JobStatus::Unknown);
        assert!(!s.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn delete_outcome_accepts_both_shapes() {
        let job: DeleteOutcome = serde_json::from_str(r#"{"jobId":"j1"}"#).unwrap();
        assert!(matches!(job, DeleteOutcome::Job(h) if h.job_id.as_str() == "j1"));
        let sync: DeleteOutcome = serde_json::from_str(r#"{"deleted":3}"#).unwrap();
        assert!(matches!(sync, DeleteOutcome::Deleted { deleted: 3 }));
    }
}
