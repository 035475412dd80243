//! Operator forms: client-side validation and the single backend call each one makes.
//!
//! A form that fails validation never reaches the backend. The caller gets an
//! [`Outcome::Rejected`] carrying a warning notice instead.

use crate::api::{
    Backend, DocumentUpload, GitPushRequest, JiraIngestRequest, KeywordInspectRequest,
    ManualGenerateRequest, PayloadRequest, PersistRequest, RecorderStartRequest,
    ScriptGenerateRequest, TrialRunRequest, VectorDeleteRequest, VectorQueryRequest,
    WebsiteIngestRequest,
};
use crate::error::{ConsoleError, FormError};
use crate::model::{
    DeleteOutcome, FlowSummary, Generated, JobId, JobKind, Notice, SessionId, VectorRecord,
};
use crate::storage::{HistoryEntry, HistoryStore};
use std::path::PathBuf;

pub const MAX_CRAWL_DEPTH: u8 = 5;
pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_MAX_ASSETS: u32 = 5;
pub const DEFAULT_PAYLOAD_COUNT: u32 = 5;

fn required(field: &'static str, value: &str) -> Result<String, FormError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(FormError::MissingField(field));
    }
    Ok(v.to_string())
}

fn optional(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn http_url(field: &'static str, value: &str) -> Result<String, FormError> {
    let raw = required(field, value)?;
    let url = reqwest::Url::parse(&raw).map_err(|e| FormError::InvalidValue {
        field,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FormError::InvalidValue {
            field,
            reason: "must be an http or https URL".into(),
        });
    }
    Ok(raw)
}

/// Parse the optional vector metadata filter. Blank means no filter.
pub fn parse_filter(
    text: &str,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, FormError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(FormError::InvalidFilter("expected a JSON object".into())),
        Err(e) => Err(FormError::InvalidFilter(e.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualForm {
    pub story: String,
}

impl ManualForm {
    pub fn validate(&self) -> Result<ManualGenerateRequest, FormError> {
        Ok(ManualGenerateRequest {
            story: required("story", &self.story)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptForm {
    pub flow_name: String,
    pub story: String,
}

impl ScriptForm {
    pub fn validate(&self) -> Result<ScriptGenerateRequest, FormError> {
        Ok(ScriptGenerateRequest {
            flow_name: required("flow name", &self.flow_name)?,
            story: optional(&self.story),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentForm {
    pub path: String,
}

impl DocumentForm {
    pub fn validate(&self) -> Result<DocumentUpload, FormError> {
        let raw = required("file", &self.path)?;
        let path = PathBuf::from(&raw);
        if !path.is_file() {
            return Err(FormError::NoSuchFile(raw));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.clone());
        Ok(DocumentUpload { path, file_name })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JiraForm {
    pub jql: String,
    pub max_results: Option<u32>,
}

impl JiraForm {
    pub fn validate(&self) -> Result<JiraIngestRequest, FormError> {
        if self.max_results == Some(0) {
            return Err(FormError::InvalidValue {
                field: "max results",
                reason: "must be at least 1".into(),
            });
        }
        Ok(JiraIngestRequest {
            jql: required("JQL", &self.jql)?,
            max_results: self.max_results,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebsiteForm {
    pub url: String,
    pub depth: Option<u8>,
}

impl WebsiteForm {
    pub fn validate(&self) -> Result<WebsiteIngestRequest, FormError> {
        let url = http_url("URL", &self.url)?;
        let depth = self.depth.unwrap_or(1);
        if !(1..=MAX_CRAWL_DEPTH).contains(&depth) {
            return Err(FormError::InvalidValue {
                field: "depth",
                reason: format!("must be between 1 and {MAX_CRAWL_DEPTH}"),
            });
        }
        Ok(WebsiteIngestRequest { url, depth })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorderForm {
    pub url: String,
    pub flow_name: String,
    pub timeout_secs: Option<u64>,
    pub capture_dom: bool,
    pub capture_screenshots: bool,
}

impl RecorderForm {
    pub fn validate(&self) -> Result<RecorderStartRequest, FormError> {
        let timeout_sec = self
            .timeout_secs
            .unwrap_or(crate::workflow::DEFAULT_RECORDING_SECS);
        if timeout_sec == 0 {
            return Err(FormError::InvalidValue {
                field: "timeout",
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(RecorderStartRequest {
            url: http_url("URL", &self.url)?,
            flow_name: optional(&self.flow_name),
            timeout_sec,
            capture_dom: self.capture_dom,
            capture_screenshots: self.capture_screenshots,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialForm {
    pub script: String,
    pub headed: bool,
}

impl TrialForm {
    pub fn validate(&self) -> Result<TrialRunRequest, FormError> {
        if self.script.trim().is_empty() {
            return Err(FormError::MissingField("script"));
        }
        Ok(TrialRunRequest {
            script: self.script.clone(),
            headed: self.headed,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadForm {
    pub description: String,
    pub count: Option<u32>,
}

impl PayloadForm {
    pub fn validate(&self) -> Result<PayloadRequest, FormError> {
        let count = self.count.unwrap_or(DEFAULT_PAYLOAD_COUNT);
        if count == 0 {
            return Err(FormError::InvalidValue {
                field: "count",
                reason: "must be at least 1".into(),
            });
        }
        Ok(PayloadRequest {
            description: required("description", &self.description)?,
            count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistForm {
    pub flow_name: String,
    pub script: String,
}

impl PersistForm {
    pub fn validate(&self) -> Result<PersistRequest, FormError> {
        let flow_name = required("flow name", &self.flow_name)?;
        if self.script.trim().is_empty() {
            return Err(FormError::MissingField("script"));
        }
        Ok(PersistRequest {
            flow_name,
            script: self.script.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitPushForm {
    pub repo_path: String,
    pub branch: String,
    pub commit_message: String,
}

impl GitPushForm {
    pub fn validate(&self) -> Result<GitPushRequest, FormError> {
        Ok(GitPushRequest {
            repo_path: required("repository path", &self.repo_path)?,
            branch: required("branch", &self.branch)?,
            commit_message: required("commit message", &self.commit_message)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorQueryForm {
    /// Empty lists records instead of searching.
    pub query: String,
    pub top_k: u32,
    pub filter: String,
}

impl Default for VectorQueryForm {
    fn default() -> Self {
        Self {
            query: String::new(),
            top_k: DEFAULT_TOP_K,
            filter: String::new(),
        }
    }
}

impl VectorQueryForm {
    pub fn validate(&self) -> Result<VectorQueryRequest, FormError> {
        if self.top_k == 0 {
            return Err(FormError::InvalidValue {
                field: "top-k",
                reason: "must be at least 1".into(),
            });
        }
        Ok(VectorQueryRequest {
            query: self.query.trim().to_string(),
            top_k: self.top_k,
            filter: parse_filter(&self.filter)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorDeleteForm {
    pub id: String,
    pub source: String,
}

impl VectorDeleteForm {
    pub fn validate(&self) -> Result<VectorDeleteRequest, FormError> {
        match (optional(&self.id), optional(&self.source)) {
            (Some(id), None) => Ok(VectorDeleteRequest::Id(id)),
            (None, Some(source)) => Ok(VectorDeleteRequest::Source(source)),
            (None, None) => Err(FormError::MissingField("id or source")),
            (Some(_), Some(_)) => Err(FormError::InvalidValue {
                field: "id or source",
                reason: "give exactly one of them".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectForm {
    pub keyword: String,
    pub repo_path: String,
    pub max_assets: Option<u32>,
}

impl InspectForm {
    pub fn validate(&self) -> Result<KeywordInspectRequest, FormError> {
        Ok(KeywordInspectRequest {
            keyword: required("keyword", &self.keyword)?,
            repo_path: optional(&self.repo_path).unwrap_or_else(|| ".".into()),
            max_assets: self.max_assets.unwrap_or(DEFAULT_MAX_ASSETS).max(1),
        })
    }
}

/// One operator action against the backend. Trial runs stream and are handled separately.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Manual(ManualForm),
    Script(ScriptForm),
    Document(DocumentForm),
    Jira(JiraForm),
    Website(WebsiteForm),
    RecorderStart(RecorderForm),
    RecorderStop(SessionId),
    RecorderFinalize(SessionId),
    RecorderStatus(SessionId),
    Payload(PayloadForm),
    Persist(PersistForm),
    GitPush(GitPushForm),
    Inspect(InspectForm),
    VectorQuery(VectorQueryForm),
    VectorFlows,
    VectorDelete(VectorDeleteForm),
}

impl Submission {
    pub fn name(&self) -> &'static str {
        match self {
            Submission::Manual(_) => "manual",
            Submission::Script(_) => "script",
            Submission::Document(_) => "document",
            Submission::Jira(_) => "jira",
            Submission::Website(_) => "website",
            Submission::RecorderStart(_) => "recorder-start",
            Submission::RecorderStop(_) => "recorder-stop",
            Submission::RecorderFinalize(_) => "recorder-finalize",
            Submission::RecorderStatus(_) => "recorder-status",
            Submission::Payload(_) => "payload",
            Submission::Persist(_) => "persist",
            Submission::GitPush(_) => "git-push",
            Submission::Inspect(_) => "inspect",
            Submission::VectorQuery(_) => "vector-query",
            Submission::VectorFlows => "vector-flows",
            Submission::VectorDelete(_) => "vector-delete",
        }
    }
}

/// What came of a [`Submission`].
#[derive(Debug)]
pub enum Outcome {
    /// Accepted as a background job; poll `job_id` for progress.
    Job {
        kind: JobKind,
        job_id: JobId,
        /// Updated Jira history, when the submission recorded one.
        history: Option<Vec<HistoryEntry>>,
    },
    Session(SessionId),
    Generated(Generated),
    VectorResults(Vec<VectorRecord>),
    Flows(Vec<FlowSummary>),
    Deleted(u64),
    /// Failed validation; nothing was sent.
    Rejected(Notice),
    /// The vector filter did not parse; nothing was sent. Shown inline next to the field.
    InvalidFilter(String),
    Failed(ConsoleError),
}

impl Outcome {
    fn job(kind: JobKind, job_id: JobId) -> Self {
        Outcome::Job {
            kind,
            job_id,
            history: None,
        }
    }
}

/// Validate and send one submission. Never issues more than one backend call.
pub async fn submit(
    backend: &dyn Backend,
    history: Option<&HistoryStore>,
    submission: Submission,
) -> Outcome {
    let name = submission.name();
    match dispatch(backend, history, submission).await {
        Ok(outcome) => {
            tracing::info!(form = name, "submission accepted");
            outcome
        }
        Err(ConsoleError::Validation(FormError::InvalidFilter(msg))) => {
            tracing::debug!(form = name, error = %msg, "invalid vector filter");
            Outcome::InvalidFilter(format!("Invalid filter: {msg}"))
        }
        Err(ConsoleError::Validation(e)) => {
            tracing::debug!(form = name, error = %e, "validation failed");
            Outcome::Rejected(Notice::warning(e.to_string()))
        }
        Err(e) => {
            tracing::warn!(form = name, error = %e, "submission failed");
            Outcome::Failed(e)
        }
    }
}

async fn dispatch(
    backend: &dyn Backend,
    history: Option<&HistoryStore>,
    submission: Submission,
) -> Result<Outcome, ConsoleError> {
    Ok(match submission {
        Submission::Manual(f) => {
            let req = f.validate()?;
            let h = backend.generate_manual(&req).await?;
            Outcome::job(JobKind::ManualTests, h.job_id)
        }
        Submission::Script(f) => {
            let req = f.validate()?;
            let resp = backend.generate_script(&req).await?;
            Outcome::Generated(Generated::Script {
                flow_name: resp.flow_name.unwrap_or(req.flow_name),
                script: resp.script,
            })
        }
        Submission::Document(f) => {
            let req = f.validate()?;
            let h = backend.ingest_document(&req).await?;
            Outcome::job(JobKind::IngestDocument, h.job_id)
        }
        Submission::Jira(f) => {
            let req = f.validate()?;
            let h = backend.ingest_jira(&req).await?;
            let entries = match history {
                Some(store) => match store.record(&h.job_id, &req.jql) {
                    Ok(entries) => Some(entries),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not record ingestion history");
                        None
                    }
                },
                None => None,
            };
            Outcome::Job {
                kind: JobKind::IngestJira,
                job_id: h.job_id,
                history: entries,
            }
        }
        Submission::Website(f) => {
            let req = f.validate()?;
            let h = backend.ingest_website(&req).await?;
            Outcome::job(JobKind::IngestWebsite, h.job_id)
        }
        Submission::RecorderStart(f) => {
            let req = f.validate()?;
            let h = backend.recorder_start(&req).await?;
            Outcome::Session(h.session_id)
        }
        Submission::RecorderStop(id) => {
            let v = backend.recorder_stop(&id).await?;
            Outcome::Generated(Generated::RecorderStatus(v))
        }
        Submission::RecorderFinalize(id) => {
            let h = backend.recorder_finalize(&id).await?;
            Outcome::job(JobKind::RecorderFinalize, h.job_id)
        }
        Submission::RecorderStatus(id) => {
            let v = backend.recorder_status(&id).await?;
            Outcome::Generated(Generated::RecorderStatus(v))
        }
        Submission::Payload(f) => {
            let req = f.validate()?;
            Outcome::Generated(Generated::Payloads(backend.generate_payloads(&req).await?))
        }
        Submission::Persist(f) => {
            let req = f.validate()?;
            Outcome::Generated(Generated::Persisted(backend.persist_script(&req).await?))
        }
        Submission::GitPush(f) => {
            let req = f.validate()?;
            let h = backend.git_push(&req).await?;
            Outcome::job(JobKind::GitPush, h.job_id)
        }
        Submission::Inspect(f) => {
            let req = f.validate()?;
            Outcome::Generated(Generated::Inspection(backend.inspect_keyword(&req).await?))
        }
        Submission::VectorQuery(f) => {
            let req = f.validate()?;
            Outcome::VectorResults(backend.vector_query(&req).await?)
        }
        Submission::VectorFlows => Outcome::Flows(backend.vector_flows().await?),
        Submission::VectorDelete(f) => {
            let req = f.validate()?;
            match backend.vector_delete(&req).await? {
                DeleteOutcome::Job(h) => Outcome::job(JobKind::VectorDelete, h.job_id),
                DeleteOutcome::Deleted { deleted } => Outcome::Deleted(deleted),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::model::NoticeLevel;

    fn assert_rejected(outcome: Outcome) {
        match outcome {
            Outcome::Rejected(n) => assert_eq!(n.level, NoticeLevel::Warning),
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_required_fields_never_reach_backend() {
        let fake = FakeBackend::default();
        let blank = [
            Submission::Manual(ManualForm::default()),
            Submission::Script(ScriptForm {
                flow_name: "   ".into(),
                story: "story".into(),
            }),
            Submission::Document(DocumentForm::default()),
            Submission::Jira(JiraForm::default()),
            Submission::Website(WebsiteForm::default()),
            Submission::RecorderStart(RecorderForm::default()),
            Submission::Payload(PayloadForm::default()),
            Submission::Persist(PersistForm {
                flow_name: "login".into(),
                script: String::new(),
            }),
            Submission::GitPush(GitPushForm {
                repo_path: "/repo".into(),
                branch: "main".into(),
                commit_message: String::new(),
            }),
            Submission::Inspect(InspectForm::default()),
            Submission::VectorDelete(VectorDeleteForm::default()),
        ];
        for sub in blank {
            assert_rejected(submit(&fake, None, sub).await);
        }
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn valid_form_makes_exactly_one_call() {
        let fake = FakeBackend::returning_job("m-1");
        let outcome = submit(
            &fake,
            None,
            Submission::Manual(ManualForm {
                story: "As a shopper I can check out".into(),
            }),
        )
        .await;
        assert!(matches!(
            outcome,
            Outcome::Job { kind: JobKind::ManualTests, ref job_id, .. } if job_id.as_str() == "m-1"
        ));
        assert_eq!(fake.calls(), vec!["generate_manual".to_string()]);
    }

    #[tokio::test]
    async fn jira_ingest_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::at(dir.path().join("history.json"));
        for i in 0..3 {
            store.record(&JobId::new(format!("old{i}")), "q").unwrap();
        }
        let prev = store.load().len();

        let fake = FakeBackend::returning_job("abc123");
        let outcome = submit(
            &fake,
            Some(&store),
            Submission::Jira(JiraForm {
                jql: "project=X".into(),
                max_results: None,
            }),
        )
        .await;

        let Outcome::Job {
            job_id,
            history: Some(entries),
            ..
        } = outcome
        else {
            panic!("expected a job with history");
        };
        assert_eq!(job_id.as_str(), "abc123");
        assert_eq!(entries[0].job_id.as_str(), "abc123");
        assert_eq!(entries[0].query, "project=X");
        assert_eq!(entries.len(), (prev + 1).min(crate::storage::HISTORY_CAP));
        assert_eq!(store.load(), entries);
    }

    #[tokio::test]
    async fn failed_jira_ingest_leaves_history_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::at(dir.path().join("history.json"));
        let fake = FakeBackend::failing("jira unreachable");
        let outcome = submit(
            &fake,
            Some(&store),
            Submission::Jira(JiraForm {
                jql: "project=X".into(),
                max_results: Some(10),
            }),
        )
        .await;
        match outcome {
            Outcome::Failed(e) => {
                assert_eq!(e.to_string(), "jira unreachable");
                assert_eq!(e.to_notice().level, NoticeLevel::Error);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(store.load().is_empty());
    }

    #[tokio::test]
    async fn invalid_vector_filter_is_inline_and_sends_nothing() {
        let fake = FakeBackend::default();
        for filter in ["{not json", "[1, 2]"] {
            let outcome = submit(
                &fake,
                None,
                Submission::VectorQuery(VectorQueryForm {
                    query: "login".into(),
                    top_k: 5,
                    filter: filter.into(),
                }),
            )
            .await;
            match outcome {
                Outcome::InvalidFilter(msg) => assert!(msg.starts_with("Invalid filter")),
                other => panic!("expected inline filter error, got {other:?}"),
            }
        }
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_vector_query_lists_records() {
        let fake = FakeBackend::default();
        let outcome = submit(
            &fake,
            None,
            Submission::VectorQuery(VectorQueryForm {
                filter: r#"{"source": "jira"}"#.into(),
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(outcome, Outcome::VectorResults(ref r) if r.len() == 1));
        assert_eq!(fake.call_count(), 1);
    }

    #[test]
    fn filter_parsing() {
        assert_eq!(parse_filter("  ").unwrap(), None);
        let map = parse_filter(r#"{"type": "recorder"}"#).unwrap().unwrap();
        assert_eq!(map["type"], "recorder");
        assert!(matches!(
            parse_filter("42"),
            Err(FormError::InvalidFilter(_))
        ));
    }

    #[test]
    fn website_form_checks_scheme_and_depth() {
        let ok = WebsiteForm {
            url: "https://docs.example.com".into(),
            depth: None,
        }
        .validate()
        .unwrap();
        assert_eq!(ok.depth, 1);
        assert!(WebsiteForm {
            url: "ftp://example.com".into(),
            depth: None,
        }
        .validate()
        .is_err());
        assert!(WebsiteForm {
            url: "https://example.com".into(),
            depth: Some(MAX_CRAWL_DEPTH + 1),
        }
        .validate()
        .is_err());
    }

    #[test]
    fn vector_delete_needs_exactly_one_selector() {
        let both = VectorDeleteForm {
            id: "a".into(),
            source: "b".into(),
        };
        assert!(both.validate().is_err());
        let by_source = VectorDeleteForm {
            source: "jira".into(),
            ..Default::default()
        };
        assert_eq!(
            by_source.validate().unwrap(),
            VectorDeleteRequest::Source("jira".into())
        );
    }

    #[test]
    fn document_form_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = DocumentForm {
            path: dir.path().join("nope.pdf").display().to_string(),
        };
        assert!(matches!(missing.validate(), Err(FormError::NoSuchFile(_))));

        let file = dir.path().join("guide.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let upload = DocumentForm {
            path: file.display().to_string(),
        }
        .validate()
        .unwrap();
        assert_eq!(upload.file_name, "guide.pdf");
    }
}
