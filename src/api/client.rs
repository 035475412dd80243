use super::*;
use crate::config::ConsoleConfig;
use crate::error::server_message;
use crate::model::JobStatus;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{multipart, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP implementation of [`Backend`].
#[derive(Clone)]
pub struct BackendClient {
    pub http: reqwest::Client,
    base: Url,
    request_timeout: Duration,
}

/// Wire shape of the job status endpoint.
#[derive(Deserialize)]
struct StatusBody {
    status: JobStatus,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueryBody {
    #[serde(default)]
    results: Vec<VectorRecord>,
}

#[derive(Deserialize)]
struct FlowsBody {
    #[serde(default)]
    flows: Vec<FlowSummary>,
}

impl BackendClient {
    pub fn new(cfg: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| ConsoleError::request(None, format!("invalid base URL: {e}")))?;
        // No whole-request timeout on the client: streaming endpoints stay open for minutes.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base,
            request_timeout: cfg.request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build an endpoint URL by appending percent-encoded path segments to the base.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConsoleError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ConsoleError::request(None, "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ConsoleError> {
        let resp = Self::check(resp).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ConsoleError::Decode(e.to_string()))
    }

    /// Turn a non-2xx response into a `Request` error carrying the server's message.
    async fn check(resp: Response) -> Result<Response, ConsoleError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = server_message(&body).unwrap_or_else(|| status.to_string());
        Err(ConsoleError::request(Some(status.as_u16()), message))
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ConsoleError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ConsoleError> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ConsoleError> {
        let url = self.endpoint(segments)?;
        tracing::trace!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Start a trial run and return its log stream.
    pub async fn open_trial_stream(
        &self,
        req: &TrialRunRequest,
    ) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, ConsoleError> {
        let url = self.endpoint(&["api", "trial", "run"])?;
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(req)
            .send()
            .await?;
        Ok(Self::check(resp).await?.bytes_stream().boxed())
    }

    /// Subscribe to a recorder session's telemetry stream.
    pub async fn open_recorder_events(
        &self,
        session: &SessionId,
    ) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, ConsoleError> {
        let url = self.endpoint(&["api", "recorder", session.as_str(), "events"])?;
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        Ok(Self::check(resp).await?.bytes_stream().boxed())
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn ingest_document(&self, req: &DocumentUpload) -> Result<JobHandle, ConsoleError> {
        let data = tokio::fs::read(&req.path).await?;
        let part = multipart::Part::bytes(data).file_name(req.file_name.clone());
        let form = multipart::Form::new().part("file", part);
        let url = self.endpoint(&["api", "ingest", "document"])?;
        tracing::debug!(%url, file = %req.file_name, "POST multipart");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn ingest_jira(&self, req: &JiraIngestRequest) -> Result<JobHandle, ConsoleError> {
        self.post_json(&["api", "ingest", "jira"], req).await
    }

    async fn ingest_website(
        &self,
        req: &WebsiteIngestRequest,
    ) -> Result<JobHandle, ConsoleError> {
        self.post_json(&["api", "ingest", "website"], req).await
    }

    async fn generate_manual(
        &self,
        req: &ManualGenerateRequest,
    ) -> Result<JobHandle, ConsoleError> {
        self.post_json(&["api", "manual", "generate"], req).await
    }

    async fn generate_script(
        &self,
        req: &ScriptGenerateRequest,
    ) -> Result<ScriptResponse, ConsoleError> {
        self.post_json(&["api", "agentic", "generate"], req).await
    }

    async fn inspect_keyword(
        &self,
        req: &KeywordInspectRequest,
    ) -> Result<serde_json::Value, ConsoleError> {
        self.post_json(&["api", "agentic", "keyword-inspect"], req)
            .await
    }

    async fn persist_script(
        &self,
        req: &PersistRequest,
    ) -> Result<serde_json::Value, ConsoleError> {
        self.post_json(&["api", "agentic", "persist"], req).await
    }

    async fn generate_payloads(
        &self,
        req: &PayloadRequest,
    ) -> Result<serde_json::Value, ConsoleError> {
        self.post_json(&["api", "payload", "generate"], req).await
    }

    async fn recorder_start(
        &self,
        req: &RecorderStartRequest,
    ) -> Result<SessionHandle, ConsoleError> {
        self.post_json(&["api", "recorder", "start"], req).await
    }

    async fn recorder_stop(&self, session: &SessionId) -> Result<serde_json::Value, ConsoleError> {
        self.post_empty(&["api", "recorder", session.as_str(), "stop"])
            .await
    }

    async fn recorder_finalize(&self, session: &SessionId) -> Result<JobHandle, ConsoleError> {
        self.post_empty(&["api", "recorder", session.as_str(), "finalize"])
            .await
    }

    async fn recorder_status(
        &self,
        session: &SessionId,
    ) -> Result<serde_json::Value, ConsoleError> {
        self.get_json(&["api", "recorder", session.as_str(), "status"])
            .await
    }

    async fn git_push(&self, req: &GitPushRequest) -> Result<JobHandle, ConsoleError> {
        self.post_json(&["api", "git", "push"], req).await
    }

    async fn job_status(&self, job: &JobId) -> Result<JobSnapshot, ConsoleError> {
        let body: StatusBody = self.get_json(&["api", "jobs", job.as_str()]).await?;
        Ok(JobSnapshot {
            id: job.clone(),
            status: body.status,
            result: body.result,
            error: body.error,
        })
    }

    async fn vector_query(
        &self,
        req: &VectorQueryRequest,
    ) -> Result<Vec<VectorRecord>, ConsoleError> {
        let body: QueryBody = self.post_json(&["api", "vector", "query"], req).await?;
        Ok(body.results)
    }

    async fn vector_flows(&self) -> Result<Vec<FlowSummary>, ConsoleError> {
        let body: FlowsBody = self.get_json(&["api", "vector", "flows"]).await?;
        Ok(body.flows)
    }

    async fn vector_delete(
        &self,
        req: &VectorDeleteRequest,
    ) -> Result<DeleteOutcome, ConsoleError> {
        self.post_json(&["api", "vector", "delete"], req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsoleConfig, Settings};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, capture the raw request, and reply with a canned response.
    async fn serve_once(
        status_line: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..split]
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= split + 4 + content_length
    }

    fn client(base: &str) -> BackendClient {
        let settings = Settings {
            base_url: base.to_string(),
            ..Default::default()
        };
        BackendClient::new(&ConsoleConfig::from_settings(&settings)).unwrap()
    }

    #[tokio::test]
    async fn job_status_reads_wire_shape() {
        let (base, server) =
            serve_once("200 OK", r#"{"status":"failed","error":"selector not found"}"#).await;
        let snap = client(&base)
            .job_status(&JobId::new("job 7"))
            .await
            .unwrap();
        assert_eq!(snap.status, JobStatus::Failed);
        assert_eq!(snap.error.as_deref(), Some("selector not found"));
        assert_eq!(snap.id.as_str(), "job 7");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/jobs/job%207 "), "{request}");
    }

    #[tokio::test]
    async fn jira_ingest_posts_json_and_reads_job_id() {
        let (base, server) = serve_once("200 OK", r#"{"jobId":"abc123"}"#).await;
        let handle = client(&base)
            .ingest_jira(&JiraIngestRequest {
                jql: "project=X".into(),
                max_results: None,
            })
            .await
            .unwrap();
        assert_eq!(handle.job_id.as_str(), "abc123");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/ingest/jira "), "{request}");
        assert!(request.contains(r#""jql":"project=X""#), "{request}");
    }

    #[tokio::test]
    async fn http_errors_carry_server_detail() {
        let (base, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"detail":"Vector query failed: collection missing"}"#,
        )
        .await;
        let err = client(&base)
            .vector_query(&VectorQueryRequest {
                query: "login".into(),
                top_k: 5,
                filter: None,
            })
            .await
            .unwrap_err();
        match err {
            ConsoleError::Request { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "Vector query failed: collection missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn base_path_prefix_is_preserved() {
        let (base, server) = serve_once("200 OK", r#"{"flows":[]}"#).await;
        let flows = client(&format!("{base}/backend/"))
            .vector_flows()
            .await
            .unwrap();
        assert!(flows.is_empty());
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /backend/api/vector/flows "), "{request}");
    }

    #[tokio::test]
    async fn connection_refused_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(&format!("http://{addr}"))
            .job_status(&JobId::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Request { status: None, .. }));
    }
}
