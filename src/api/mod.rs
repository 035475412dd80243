//! Backend contract: request payloads, the [`Backend`] seam and its HTTP implementation.

mod client;
pub mod stream;

pub use client::BackendClient;

use crate::error::ConsoleError;
use crate::model::{
    DeleteOutcome, FlowSummary, JobHandle, JobId, JobSnapshot, SessionHandle, SessionId,
    VectorRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraIngestRequest {
    pub jql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteIngestRequest {
    pub url: String,
    pub depth: u8,
}

/// A local file to upload as multipart form data.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualGenerateRequest {
    pub story: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptGenerateRequest {
    pub flow_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub script: String,
    #[serde(default)]
    pub flow_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordInspectRequest {
    pub keyword: String,
    pub repo_path: String,
    pub max_assets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistRequest {
    pub flow_name: String,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRequest {
    pub description: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStartRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_name: Option<String>,
    pub timeout_sec: u64,
    pub capture_dom: bool,
    pub capture_screenshots: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRunRequest {
    pub script: String,
    pub headed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitPushRequest {
    pub repo_path: String,
    pub branch: String,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorQueryRequest {
    pub query: String,
    #[serde(rename = "topK")]
    pub top_k: u32,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDeleteRequest {
    Id(String),
    Source(String),
}

/// Every backend call the console makes, except the two streaming endpoints which
/// live on [`BackendClient`] directly.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn ingest_document(&self, req: &DocumentUpload) -> Result<JobHandle, ConsoleError>;
    async fn ingest_jira(&self, req: &JiraIngestRequest) -> Result<JobHandle, ConsoleError>;
    async fn ingest_website(&self, req: &WebsiteIngestRequest)
        -> Result<JobHandle, ConsoleError>;
    async fn generate_manual(&self, req: &ManualGenerateRequest)
        -> Result<JobHandle, ConsoleError>;
    async fn generate_script(
        &self,
        req: &ScriptGenerateRequest,
    ) -> Result<ScriptResponse, ConsoleError>;
    async fn inspect_keyword(
        &self,
        req: &KeywordInspectRequest,
    ) -> Result<serde_json::Value, ConsoleError>;
    async fn persist_script(&self, req: &PersistRequest)
        -> Result<serde_json::Value, ConsoleError>;
    async fn generate_payloads(
        &self,
        req: &PayloadRequest,
    ) -> Result<serde_json::Value, ConsoleError>;
    async fn recorder_start(
        &self,
        req: &RecorderStartRequest,
    ) -> Result<SessionHandle, ConsoleError>;
    async fn recorder_stop(&self, session: &SessionId) -> Result<serde_json::Value, ConsoleError>;
    async fn recorder_finalize(&self, session: &SessionId) -> Result<JobHandle, ConsoleError>;
    async fn recorder_status(&self, session: &SessionId)
        -> Result<serde_json::Value, ConsoleError>;
    async fn git_push(&self, req: &GitPushRequest) -> Result<JobHandle, ConsoleError>;
    async fn job_status(&self, job: &JobId) -> Result<JobSnapshot, ConsoleError>;
    async fn vector_query(
        &self,
        req: &VectorQueryRequest,
    ) -> Result<Vec<VectorRecord>, ConsoleError>;
    async fn vector_flows(&self) -> Result<Vec<FlowSummary>, ConsoleError>;
    async fn vector_delete(&self, req: &VectorDeleteRequest)
        -> Result<DeleteOutcome, ConsoleError>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory [`Backend`] that records every call and returns canned answers.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Mutex<Vec<String>>,
        pub fail_with: Mutex<Option<String>>,
        pub job_id: Mutex<Option<String>>,
    }

    impl FakeBackend {
        pub fn returning_job(id: &str) -> Self {
            let fake = Self::default();
            *fake.job_id.lock().unwrap() = Some(id.to_string());
            fake
        }

        pub fn failing(message: &str) -> Self {
            let fake = Self::default();
            *fake.fail_with.lock().unwrap() = Some(message.to_string());
            fake
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn hit(&self, name: &str) -> Result<(), ConsoleError> {
            self.calls.lock().unwrap().push(name.to_string());
            match self.fail_with.lock().unwrap().clone() {
                Some(msg) => Err(ConsoleError::request(Some(500), msg)),
                None => Ok(()),
            }
        }

        fn job(&self) -> JobHandle {
            let id = self
                .job_id
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "job-1".into());
            JobHandle {
                job_id: JobId::new(id),
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn ingest_document(&self, _: &DocumentUpload) -> Result<JobHandle, ConsoleError> {
            self.hit("ingest_document")?;
            Ok(self.job())
        }
        async fn ingest_jira(&self, _: &JiraIngestRequest) -> Result<JobHandle, ConsoleError> {
            self.hit("ingest_jira")?;
            Ok(self.job())
        }
        async fn ingest_website(
            &self,
            _: &WebsiteIngestRequest,
        ) -> Result<JobHandle, ConsoleError> {
            self.hit("ingest_website")?;
            Ok(self.job())
        }
        async fn generate_manual(
            &self,
            _: &ManualGenerateRequest,
        ) -> Result<JobHandle, ConsoleError> {
            self.hit("generate_manual")?;
            Ok(self.job())
        }
        async fn generate_script(
            &self,
            req: &ScriptGenerateRequest,
        ) -> Result<ScriptResponse, ConsoleError> {
            self.hit("generate_script")?;
            Ok(ScriptResponse {
                script: format!("// {}", req.flow_name),
                flow_name: Some(req.flow_name.clone()),
            })
        }
        async fn inspect_keyword(
            &self,
            req: &KeywordInspectRequest,
        ) -> Result<serde_json::Value, ConsoleError> {
            self.hit("inspect_keyword")?;
            Ok(serde_json::json!({"keyword": req.keyword, "status": "ok"}))
        }
        async fn persist_script(
            &self,
            _: &PersistRequest,
        ) -> Result<serde_json::Value, ConsoleError> {
            self.hit("persist_script")?;
            Ok(serde_json::json!({"saved": true}))
        }
        async fn generate_payloads(
            &self,
            req: &PayloadRequest,
        ) -> Result<serde_json::Value, ConsoleError> {
            self.hit("generate_payloads")?;
            Ok(serde_json::json!({"count": req.count}))
        }
        async fn recorder_start(
            &self,
            _: &RecorderStartRequest,
        ) -> Result<SessionHandle, ConsoleError> {
            self.hit("recorder_start")?;
            Ok(SessionHandle {
                session_id: SessionId::new("sess-1"),
            })
        }
        async fn recorder_stop(&self, _: &SessionId) -> Result<serde_json::Value, ConsoleError> {
            self.hit("recorder_stop")?;
            Ok(serde_json::json!({"stopped": true}))
        }
        async fn recorder_finalize(&self, _: &SessionId) -> Result<JobHandle, ConsoleError> {
            self.hit("recorder_finalize")?;
            Ok(self.job())
        }
        async fn recorder_status(
            &self,
            _: &SessionId,
        ) -> Result<serde_json::Value, ConsoleError> {
            self.hit("recorder_status")?;
            Ok(serde_json::json!({"status": "recording"}))
        }
        async fn git_push(&self, _: &GitPushRequest) -> Result<JobHandle, ConsoleError> {
            self.hit("git_push")?;
            Ok(self.job())
        }
        async fn job_status(&self, job: &JobId) -> Result<JobSnapshot, ConsoleError> {
            self.hit("job_status")?;
            Ok(JobSnapshot {
                id: job.clone(),
                status: crate::model::JobStatus::Completed,
                result: None,
                error: None,
            })
        }
        async fn vector_query(
            &self,
            req: &VectorQueryRequest,
        ) -> Result<Vec<VectorRecord>, ConsoleError> {
            self.hit("vector_query")?;
            Ok(vec![VectorRecord {
                id: Some("r1".into()),
                content: format!("match for {}", req.query),
                metadata: Default::default(),
            }])
        }
        async fn vector_flows(&self) -> Result<Vec<FlowSummary>, ConsoleError> {
            self.hit("vector_flows")?;
            Ok(Vec::new())
        }
        async fn vector_delete(
            &self,
            _: &VectorDeleteRequest,
        ) -> Result<DeleteOutcome, ConsoleError> {
            self.hit("vector_delete")?;
            Ok(DeleteOutcome::Deleted { deleted: 1 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_query_uses_backend_field_names() {
        let mut filter = serde_json::Map::new();
        filter.insert("type".into(), serde_json::json!("recorder_refined"));
        let req = VectorQueryRequest {
            query: "login".into(),
            top_k: 5,
            filter: Some(filter),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["topK"], 5);
        assert_eq!(v["where"]["type"], "recorder_refined");

        let bare = VectorQueryRequest {
            query: String::new(),
            top_k: 1,
            filter: None,
        };
        assert!(serde_json::to_value(&bare).unwrap().get("where").is_none());
    }

    #[test]
    fn delete_request_is_keyed_by_kind() {
        let v = serde_json::to_value(VectorDeleteRequest::Source("docs/a.pdf".into())).unwrap();
        assert_eq!(v, serde_json::json!({"source": "docs/a.pdf"}));
    }

    #[test]
    fn recorder_start_is_camel_case() {
        let v = serde_json::to_value(RecorderStartRequest {
            url: "https://example.com".into(),
            flow_name: None,
            timeout_sec: 30,
            capture_dom: true,
            capture_screenshots: false,
        })
        .unwrap();
        assert_eq!(v["timeoutSec"], 30);
        assert_eq!(v["captureDom"], true);
        assert!(v.get("flowName").is_none());
    }
}
