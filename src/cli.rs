use crate::api::stream::{drive_stream, StreamControl};
use crate::api::{Backend, BackendClient};
use crate::config::{ConsoleConfig, Settings};
use crate::forms::{
    self, DocumentForm, GitPushForm, InspectForm, JiraForm, ManualForm, Outcome, PayloadForm,
    PersistForm, RecorderForm, ScriptForm, Submission, TrialForm, VectorDeleteForm,
    VectorQueryForm, WebsiteForm,
};
use crate::jobs::{poll_job, PollState, PollerConfig, StatusSource};
use crate::model::{
    AppEvent, Generated, JobId, JobStatus, Notice, SessionId, StreamEvent, Transcript,
};
use crate::storage::HistoryStore;
use crate::text_summary::{self, TextSummary};
use crate::workflow::{Step, Tick, WorkflowController};
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::stream::BoxStream;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "autotest-console",
    version,
    about = "Operator console for the test-automation backend, with optional TUI"
)]
pub struct Cli {
    /// Backend base URL (overrides the settings file)
    #[arg(long, env = "AUTOTEST_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Print JSON results (no TUI)
    #[arg(long, global = true, conflicts_with = "text")]
    pub json: bool,

    /// Print text results (no TUI)
    #[arg(long, global = true)]
    pub text: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Job status poll interval
    #[arg(long, global = true)]
    pub poll_interval: Option<humantime::Duration>,

    /// Per-request timeout for non-streaming calls
    #[arg(long, global = true)]
    pub request_timeout: Option<humantime::Duration>,

    /// Jira ingestion history file to use instead of the default location
    #[arg(long, global = true)]
    pub history_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// True when the dashboard will own the terminal.
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, None | Some(Command::Tui)) && !self.json && !self.text
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Interactive dashboard (the default)
    Tui,
    /// Ingest knowledge into the vector store
    #[command(subcommand)]
    Ingest(IngestCmd),
    /// Inspect background jobs
    #[command(subcommand)]
    Job(JobCmd),
    /// Drive a browser recording session
    #[command(subcommand)]
    Recorder(RecorderCmd),
    /// Generate test cases, scripts or payloads
    #[command(subcommand)]
    Generate(GenerateCmd),
    /// Look up existing automation assets for a keyword
    Inspect {
        keyword: String,
        #[arg(long, default_value = ".")]
        repo: String,
        #[arg(long, default_value_t = forms::DEFAULT_MAX_ASSETS)]
        max_assets: u32,
    },
    /// Run a generated script and stream its log
    #[command(subcommand)]
    Trial(TrialCmd),
    /// Query and maintain the vector store
    #[command(subcommand)]
    Vector(VectorCmd),
    /// Push generated artifacts to a repository
    #[command(subcommand)]
    Git(GitCmd),
    /// Save a script for a flow
    Persist {
        flow_name: String,
        script_file: PathBuf,
    },
    /// Recent Jira ingestions
    #[command(subcommand)]
    History(HistoryCmd),
    /// Show or change persisted settings
    #[command(subcommand)]
    Settings(SettingsCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum IngestCmd {
    Document {
        path: String,
        #[arg(long)]
        wait: bool,
    },
    Jira {
        jql: String,
        #[arg(long)]
        max_results: Option<u32>,
        #[arg(long)]
        wait: bool,
    },
    Website {
        url: String,
        #[arg(long, default_value_t = 1)]
        depth: u8,
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum JobCmd {
    Status { id: String },
    /// Poll until the job completes or fails
    Wait { id: String },
}

#[derive(Debug, Subcommand, Clone)]
pub enum RecorderCmd {
    /// Start recording, show progress and stop when the timeout elapses
    Start {
        url: String,
        /// Recording length in seconds (defaults to the settings value)
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        flow_name: Option<String>,
        #[arg(long)]
        capture_dom: bool,
        #[arg(long)]
        capture_screenshots: bool,
    },
    Stop {
        session: String,
    },
    Status {
        session: String,
    },
    Finalize {
        session: String,
        #[arg(long)]
        wait: bool,
    },
    /// Follow the session's telemetry stream
    Events {
        session: String,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum GenerateCmd {
    Manual {
        story: String,
        #[arg(long)]
        wait: bool,
    },
    Script {
        flow_name: String,
        #[arg(long)]
        story: Option<String>,
    },
    Payload {
        description: String,
        #[arg(long, default_value_t = forms::DEFAULT_PAYLOAD_COUNT)]
        count: u32,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum TrialCmd {
    Run {
        script_file: PathBuf,
        #[arg(long)]
        headed: bool,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum VectorCmd {
    Query {
        /// Search text; omit to list records
        query: Option<String>,
        #[arg(long, default_value_t = forms::DEFAULT_TOP_K)]
        top_k: u32,
        /// Metadata filter as a JSON object
        #[arg(long)]
        filter: Option<String>,
    },
    Delete {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        wait: bool,
    },
    Flows,
}

#[derive(Debug, Subcommand, Clone)]
pub enum GitCmd {
    Push {
        #[arg(long)]
        repo: String,
        /// Defaults to the settings value
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        message: String,
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum HistoryCmd {
    List,
    Clear,
}

#[derive(Debug, Subcommand, Clone)]
pub enum SettingsCmd {
    Show,
    Set { key: String, value: String },
    Reset,
}

pub async fn run(args: Cli) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let cfg = build_config(&args, &settings);

    match args.command.clone() {
        None | Some(Command::Tui) => {
            if args.json || args.text {
                anyhow::bail!("--json and --text need a command; run with --help to list them");
            }
            #[cfg(feature = "tui")]
            {
                crate::tui::run(cfg).await
            }
            #[cfg(not(feature = "tui"))]
            {
                anyhow::bail!("this build has no TUI; run with --help to list commands")
            }
        }
        Some(Command::Settings(cmd)) => {
            let (out, handle) = Output::start(args.json);
            let res = run_settings(&args, settings, cmd, &out);
            out.finish(handle).await;
            res
        }
        Some(Command::History(cmd)) => {
            let (out, handle) = Output::start(args.json);
            let res = run_history(&cfg, cmd, &out);
            out.finish(handle).await;
            res
        }
        Some(cmd) => {
            let client = Arc::new(BackendClient::new(&cfg)?);
            let (out, handle) = Output::start(args.json);
            let res = run_backend_command(&cfg, client, cmd, &out).await;
            out.finish(handle).await;
            res
        }
    }
}

/// Build the effective configuration: CLI flags and environment over the settings file.
pub fn build_config(args: &Cli, settings: &Settings) -> ConsoleConfig {
    let mut cfg = ConsoleConfig::from_settings(settings);
    if let Some(url) = args.base_url.as_deref() {
        cfg.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(d) = args.poll_interval {
        cfg.poll_interval = d.into();
        cfg.max_poll_backoff = cfg.max_poll_backoff.max(cfg.poll_interval);
    }
    if let Some(d) = args.request_timeout {
        cfg.request_timeout = d.into();
    }
    cfg.history_path = args.history_file.clone();
    cfg
}

pub(crate) fn history_store(cfg: &ConsoleConfig) -> Result<HistoryStore> {
    match &cfg.history_path {
        Some(p) => Ok(HistoryStore::at(p)),
        None => HistoryStore::default_location(),
    }
}

/// Result printer for line-oriented modes.
#[derive(Clone)]
struct Output {
    tx: mpsc::UnboundedSender<OutputLine>,
    json: bool,
}

impl Output {
    fn start(json: bool) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, handle) = spawn_output_writer();
        (Self { tx, json }, handle)
    }

    async fn finish(self, handle: tokio::task::JoinHandle<()>) {
        drop(self.tx);
        let _ = handle.await;
    }

    fn stdout(&self, line: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stdout(line.into()));
    }

    fn stderr(&self, line: impl Into<String>) {
        let _ = self.tx.send(OutputLine::Stderr(line.into()));
    }

    fn notice(&self, notice: &Notice) {
        self.stderr(notice.to_line());
    }

    /// Print `value` as JSON in `--json` mode, otherwise the text summary.
    fn emit<T, F>(&self, value: &T, text: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce() -> TextSummary,
    {
        if self.json {
            self.stdout(serde_json::to_string_pretty(value)?);
        } else {
            for line in text().lines {
                self.stdout(line);
            }
        }
        Ok(())
    }
}

fn run_settings(args: &Cli, mut settings: Settings, cmd: SettingsCmd, out: &Output) -> Result<()> {
    match cmd {
        SettingsCmd::Show => {}
        SettingsCmd::Set { key, value } => {
            settings.set(&key, &value)?;
            let path = settings.save(args.config.as_deref())?;
            out.notice(&Notice::success(format!("Saved {}", path.display())));
        }
        SettingsCmd::Reset => {
            settings = Settings::default();
            let path = settings.save(args.config.as_deref())?;
            out.notice(&Notice::success(format!("Reset {}", path.display())));
        }
    }
    let value = serde_json::to_value(&settings)?;
    out.emit(&value, || TextSummary {
        lines: value
            .as_object()
            .map(|m| {
                m.iter()
                    .map(|(k, v)| match v.as_str() {
                        Some(s) => format!("{k} = {s}"),
                        None => format!("{k} = {v}"),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn run_history(cfg: &ConsoleConfig, cmd: HistoryCmd, out: &Output) -> Result<()> {
    let store = history_store(cfg)?;
    match cmd {
        HistoryCmd::List => {
            let entries = store.load();
            out.emit(&entries, || text_summary::history_summary(&entries))
        }
        HistoryCmd::Clear => {
            store.clear()?;
            out.notice(&Notice::success("Jira ingestion history cleared"));
            Ok(())
        }
    }
}

async fn run_backend_command(
    cfg: &ConsoleConfig,
    client: Arc<BackendClient>,
    cmd: Command,
    out: &Output,
) -> Result<()> {
    let poll = PollerConfig::from(cfg);
    let ctx = Ctx {
        client: client.as_ref(),
        poll: &poll,
        out,
    };

    match cmd {
        Command::Ingest(IngestCmd::Document { path, wait }) => {
            ctx.submit(Submission::Document(DocumentForm { path }), wait)
                .await
        }
        Command::Ingest(IngestCmd::Jira {
            jql,
            max_results,
            wait,
        }) => {
            let store = history_store(cfg)
                .map_err(|e| tracing::warn!(error = %e, "ingestion history unavailable"))
                .ok();
            let outcome = forms::submit(
                ctx.client,
                store.as_ref(),
                Submission::Jira(JiraForm { jql, max_results }),
            )
            .await;
            ctx.report(outcome, wait).await
        }
        Command::Ingest(IngestCmd::Website { url, depth, wait }) => {
            ctx.submit(
                Submission::Website(WebsiteForm {
                    url,
                    depth: Some(depth),
                }),
                wait,
            )
            .await
        }
        Command::Job(JobCmd::Status { id }) => {
            let snap = ctx.client.job_status(&JobId::new(id)).await?;
            out.emit(&snap, || text_summary::job_summary(&snap))
        }
        Command::Job(JobCmd::Wait { id }) => {
            let snap = ctx.wait(&JobId::new(id), "Job").await;
            out.emit(&snap, || text_summary::job_summary(&snap))?;
            job_exit(&snap)
        }
        Command::Recorder(RecorderCmd::Start {
            url,
            timeout,
            flow_name,
            capture_dom,
            capture_screenshots,
        }) => {
            let form = RecorderForm {
                url,
                flow_name: flow_name.unwrap_or_default(),
                timeout_secs: Some(timeout.unwrap_or(cfg.recorder_timeout_secs)),
                capture_dom,
                capture_screenshots,
            };
            ctx.record(form).await
        }
        Command::Recorder(RecorderCmd::Stop { session }) => {
            ctx.submit(Submission::RecorderStop(SessionId::new(session)), false)
                .await
        }
        Command::Recorder(RecorderCmd::Status { session }) => {
            ctx.submit(Submission::RecorderStatus(SessionId::new(session)), false)
                .await
        }
        Command::Recorder(RecorderCmd::Finalize { session, wait }) => {
            ctx.submit(Submission::RecorderFinalize(SessionId::new(session)), wait)
                .await
        }
        Command::Recorder(RecorderCmd::Events { session }) => {
            let body = client
                .open_recorder_events(&SessionId::new(session))
                .await?;
            ctx.follow(body).await.map(|_| ())
        }
        Command::Generate(GenerateCmd::Manual { story, wait }) => {
            ctx.submit(Submission::Manual(ManualForm { story }), wait)
                .await
        }
        Command::Generate(GenerateCmd::Script { flow_name, story }) => {
            ctx.submit(
                Submission::Script(ScriptForm {
                    flow_name,
                    story: story.unwrap_or_default(),
                }),
                false,
            )
            .await
        }
        Command::Generate(GenerateCmd::Payload { description, count }) => {
            ctx.submit(
                Submission::Payload(PayloadForm {
                    description,
                    count: Some(count),
                }),
                false,
            )
            .await
        }
        Command::Inspect {
            keyword,
            repo,
            max_assets,
        } => {
            ctx.submit(
                Submission::Inspect(InspectForm {
                    keyword,
                    repo_path: repo,
                    max_assets: Some(max_assets),
                }),
                false,
            )
            .await
        }
        Command::Trial(TrialCmd::Run {
            script_file,
            headed,
        }) => {
            let script = tokio::fs::read_to_string(&script_file)
                .await
                .with_context(|| format!("read {}", script_file.display()))?;
            let req = TrialForm { script, headed }.validate()?;
            let body = client.open_trial_stream(&req).await?;
            let transcript = ctx.follow(body).await?;
            if transcript.stopped {
                out.notice(&Notice::warning("Trial run stopped; partial log kept"));
            }
            Ok(())
        }
        Command::Vector(VectorCmd::Query {
            query,
            top_k,
            filter,
        }) => {
            ctx.submit(
                Submission::VectorQuery(VectorQueryForm {
                    query: query.unwrap_or_default(),
                    top_k,
                    filter: filter.unwrap_or_default(),
                }),
                false,
            )
            .await
        }
        Command::Vector(VectorCmd::Delete { id, source, wait }) => {
            ctx.submit(
                Submission::VectorDelete(VectorDeleteForm {
                    id: id.unwrap_or_default(),
                    source: source.unwrap_or_default(),
                }),
                wait,
            )
            .await
        }
        Command::Vector(VectorCmd::Flows) => ctx.submit(Submission::VectorFlows, false).await,
        Command::Git(GitCmd::Push {
            repo,
            branch,
            message,
            wait,
        }) => {
            ctx.submit(
                Submission::GitPush(GitPushForm {
                    repo_path: repo,
                    branch: branch.unwrap_or_else(|| cfg.git_branch.clone()),
                    commit_message: message,
                }),
                wait,
            )
            .await
        }
        Command::Persist {
            flow_name,
            script_file,
        } => {
            let script = tokio::fs::read_to_string(&script_file)
                .await
                .with_context(|| format!("read {}", script_file.display()))?;
            ctx.submit(Submission::Persist(PersistForm { flow_name, script }), false)
                .await
        }
        Command::Tui | Command::History(_) | Command::Settings(_) => Ok(()),
    }
}

fn job_exit(snap: &crate::model::JobSnapshot) -> Result<()> {
    if snap.status == JobStatus::Failed {
        anyhow::bail!(
            "job {} failed: {}",
            snap.id,
            snap.error.as_deref().unwrap_or("no error message from backend")
        );
    }
    Ok(())
}

fn generated_value(g: &Generated) -> serde_json::Value {
    match g {
        Generated::Script { flow_name, script } => {
            serde_json::json!({ "flowName": flow_name, "script": script })
        }
        Generated::Payloads(v)
        | Generated::Inspection(v)
        | Generated::Persisted(v)
        | Generated::RecorderStatus(v) => v.clone(),
    }
}

/// Shared state for one backend command.
struct Ctx<'a> {
    client: &'a BackendClient,
    poll: &'a PollerConfig,
    out: &'a Output,
}

impl Ctx<'_> {
    async fn submit(&self, submission: Submission, wait: bool) -> Result<()> {
        let outcome = forms::submit(self.client, None, submission).await;
        self.report(outcome, wait).await
    }

    async fn report(&self, outcome: Outcome, wait: bool) -> Result<()> {
        let out = self.out;
        match outcome {
            Outcome::Job {
                kind,
                job_id,
                history: _,
            } => {
                out.notice(&Notice::info(format!(
                    "{} queued (job {job_id})",
                    kind.label()
                )));
                if !wait {
                    let value = serde_json::json!({ "jobId": job_id });
                    return out.emit(&value, || TextSummary {
                        lines: vec![job_id.to_string()],
                    });
                }
                let snap = self.wait(&job_id, kind.label()).await;
                out.emit(&snap, || text_summary::job_summary(&snap))?;
                job_exit(&snap)
            }
            Outcome::Session(session_id) => {
                let value = serde_json::json!({ "sessionId": session_id });
                out.emit(&value, || TextSummary {
                    lines: vec![session_id.to_string()],
                })
            }
            Outcome::Generated(g) => {
                out.emit(&generated_value(&g), || text_summary::generated_summary(&g))
            }
            Outcome::VectorResults(records) => {
                out.emit(&records, || text_summary::vector_summary(&records))
            }
            Outcome::Flows(flows) => out.emit(&flows, || text_summary::flows_summary(&flows)),
            Outcome::Deleted(n) => {
                let value = serde_json::json!({ "deleted": n });
                out.emit(&value, || TextSummary {
                    lines: vec![format!("Deleted {n} record(s)")],
                })
            }
            Outcome::Rejected(notice) => anyhow::bail!("{}", notice.message),
            Outcome::InvalidFilter(msg) => anyhow::bail!("{msg}"),
            Outcome::Failed(e) => Err(e.into()),
        }
    }

    /// Poll until terminal, printing status changes to stderr.
    async fn wait(&self, job: &JobId, label: &str) -> crate::model::JobSnapshot {
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<AppEvent>();
        let (state_tx, _state_rx) = watch::channel(PollState::default());
        let out = self.out.clone();
        let printer = tokio::spawn(async move {
            let mut last = None;
            while let Some(ev) = ev_rx.recv().await {
                match ev {
                    AppEvent::JobUpdate(snap) if last != Some(snap.status) => {
                        last = Some(snap.status);
                        out.stderr(format!("{}: {}", snap.id, snap.status));
                    }
                    AppEvent::PollFailed { message, .. } => {
                        out.stderr(format!("status check failed ({message}); retrying"));
                    }
                    AppEvent::Notice(n) => out.notice(&n),
                    _ => {}
                }
            }
        });
        let source: &dyn StatusSource = self.client;
        let snap = poll_job(source, self.poll, job, label, &ev_tx, &state_tx).await;
        drop(ev_tx);
        let _ = printer.await;
        snap
    }

    /// Start a recording and show its progress until the timer auto-completes or Ctrl-C.
    async fn record(&self, form: RecorderForm) -> Result<()> {
        let out = self.out;
        let outcome = forms::submit(self.client, None, Submission::RecorderStart(form.clone())).await;
        let session = match outcome {
            Outcome::Session(id) => id,
            other => return self.report(other, false).await,
        };
        out.notice(&Notice::success(format!("Recording session {session}")));

        let mut wizard = WorkflowController::default();
        wizard.flow.recorder_url = form.url.clone();
        wizard.flow.flow_name = form.flow_name.clone();
        wizard.flow.recording_secs = form.timeout_secs;
        wizard.flow.session_id = Some(session.clone());
        wizard.navigate(Step::RecordForm)?;
        wizard.navigate(Step::Recording)?;

        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut shown = 0u8;
        loop {
            tokio::select! {
                _ = ticker.tick() => match wizard.tick(Instant::now()) {
                    Tick::Progress(p) => {
                        if p / 10 > shown {
                            shown = p / 10;
                            out.stderr(format!("Recording... {p}%"));
                        }
                    }
                    Tick::Completed | Tick::Idle => break,
                },
                _ = &mut ctrl_c => {
                    out.stderr("Interrupted; stopping the recorder");
                    break;
                }
            }
        }

        let stopped = self.client.recorder_stop(&session).await?;
        let value = serde_json::json!({ "sessionId": session, "stop": stopped });
        out.emit(&value, || TextSummary {
            lines: vec![format!("Recording {session} stopped at {}%", wizard.progress())],
        })?;
        out.notice(&Notice::info(format!(
            "Run `recorder finalize {session}` to ingest the recording"
        )));
        Ok(())
    }

    /// Print a log stream until it ends. Ctrl-C stops it and keeps what was received.
    async fn follow(&self, body: BoxStream<'static, reqwest::Result<Bytes>>) -> Result<Transcript> {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<StreamControl>();
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<StreamEvent>();
        let out = self.out.clone();
        let printer = tokio::spawn(async move {
            while let Some(ev) = ev_rx.recv().await {
                if out.json {
                    if let Ok(line) = serde_json::to_string(&ev) {
                        out.stdout(line);
                    }
                } else if let Some(line) = ev.transcript_line() {
                    out.stdout(line);
                }
            }
        });
        let stopper = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping stream");
                let _ = ctrl_tx.send(StreamControl::Stop);
            }
        });

        let transcript = drive_stream(body, ctrl_rx, |ev| {
            let _ = ev_tx.send(ev);
        })
        .await;
        stopper.abort();
        drop(ev_tx);
        let _ = printer.await;
        for line in text_summary::transcript_summary(&transcript).lines {
            self.out.stderr(line);
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings {
            base_url: "http://from-file:9000".into(),
            ..Settings::default()
        };
        let cfg = build_config(&parse(&["autotest-console", "history", "list"]), &settings);
        assert_eq!(cfg.base_url, "http://from-file:9000");

        let args = parse(&[
            "autotest-console",
            "--base-url",
            "http://flag:1/",
            "--poll-interval",
            "500ms",
            "job",
            "status",
            "j1",
        ]);
        let cfg = build_config(&args, &settings);
        assert_eq!(cfg.base_url, "http://flag:1");
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn no_command_means_dashboard() {
        assert!(parse(&["autotest-console"]).is_interactive());
        assert!(parse(&["autotest-console", "tui"]).is_interactive());
        assert!(!parse(&["autotest-console", "--json", "vector", "flows"]).is_interactive());
        assert!(!parse(&["autotest-console", "history", "list"]).is_interactive());
    }

    #[test]
    fn vector_query_defaults() {
        let args = parse(&["autotest-console", "vector", "query"]);
        match args.command {
            Some(Command::Vector(VectorCmd::Query {
                query,
                top_k,
                filter,
            })) => {
                assert!(query.is_none());
                assert_eq!(top_k, forms::DEFAULT_TOP_K);
                assert!(filter.is_none());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn json_and_text_conflict() {
        assert!(Cli::try_parse_from(["autotest-console", "--json", "--text", "vector", "flows"]).is_err());
    }
}
