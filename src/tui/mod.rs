mod export;
mod help;
mod input;
mod state;

use crate::api::BackendClient;
use crate::config::ConsoleConfig;
use crate::jobs::PollerConfig;
use crate::model::{AppEvent, JobStatus, NoticeLevel};
use crate::orchestrator::{self, Services, UiCommand};
use crate::storage::HistoryStore;
use crate::text_summary;
use crate::workflow::Step;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{step_fields, FlowField, FormView, StreamKind, Tab, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: ConsoleConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let client = Arc::new(BackendClient::new(&cfg)?);
    let history = match crate::cli::history_store(&cfg) {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!(error = %e, "ingestion history unavailable");
            None
        }
    };

    let mut ui = UiState {
        base_url: cfg.base_url.clone(),
        recorder_secs: cfg.recorder_timeout_secs,
        tools: state::tools_form(&cfg.git_branch),
        ..Default::default()
    };
    ui.history = history.as_ref().map(HistoryStore::load).unwrap_or_default();

    let services = Services {
        backend: client.clone(),
        streams: Some(client),
        history,
        poller: PollerConfig::from(&cfg),
    };

    // Terminal I/O is blocking, so the UI lives on its own thread.
    let ui_handle = std::thread::spawn(move || run_threaded(ui, event_rx, cmd_tx));

    let res = orchestrator::run_controller(services, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

fn send_all(cmd_tx: &UnboundedSender<UiCommand>, cmds: Vec<UiCommand>) {
    for cmd in cmds {
        let _ = cmd_tx.send(cmd);
    }
}

/// Draw loop. `state` is owned by this thread for its whole life.
fn run_threaded(
    mut state: UiState,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            let follow_ups = state::apply_event(&mut state, ev);
            send_all(&cmd_tx, follow_ups);
        }

        if last_tick.elapsed() >= tick_rate {
            let timer_cmds = state.on_tick(Instant::now());
            send_all(&cmd_tx, timer_cmds);
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let cmds = input::handle_key(&mut state, k);
                let quit = cmds.iter().any(|c| matches!(c, UiCommand::Quit));
                send_all(&cmd_tx, cmds);
                if quit {
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn key_style() -> Style {
    Style::default().fg(Color::Magenta)
}

fn level_style(level: NoticeLevel) -> Style {
    match level {
        NoticeLevel::Info => Style::default().fg(Color::Cyan),
        NoticeLevel::Success => Style::default().fg(Color::Green),
        NoticeLevel::Warning => Style::default().fg(Color::Yellow),
        NoticeLevel::Error => Style::default().fg(Color::Red),
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Completed => Style::default().fg(Color::Green),
        JobStatus::Failed => Style::default().fg(Color::Red),
        JobStatus::Running => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Gray),
    }
}

fn hints(pairs: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::with_capacity(pairs.len() * 2);
    for (i, (key, what)) in pairs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(", "));
        }
        spans.push(Span::styled(*key, key_style()));
        spans.push(Span::raw(format!(": {what}")));
    }
    Line::from(spans)
}

fn tail(lines: &[String], n: usize) -> &[String] {
    &lines[lines.len().saturating_sub(n)..]
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let tabs = Tabs::new(Tab::ALL.iter().map(|t| Line::from(t.title())).collect::<Vec<_>>())
        .select(state.tab.index())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("autotest-console"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Workflow => draw_workflow(chunks[1], f, state),
        Tab::Tools => draw_tools(chunks[1], f, state),
        Tab::Vector => draw_vector(chunks[1], f, state),
        Tab::Jobs => draw_jobs(chunks[1], f, state),
        Tab::History => draw_history(chunks[1], f, state),
        Tab::Help => help::draw_help(chunks[1], f, &state.base_url),
    }

    draw_status(chunks[2], f, state);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    if let Some(job) = state.watched.as_ref() {
        spans.push(Span::styled(format!("polling {job}  "), Style::default().fg(Color::Cyan)));
    }
    match state.stream {
        Some(StreamKind::Trial) => spans.push(Span::styled("● trial  ", Style::default().fg(Color::Green))),
        Some(StreamKind::Recorder) => spans.push(Span::styled("● recorder  ", Style::default().fg(Color::Red))),
        None => {}
    }
    if state.editing {
        spans.push(Span::styled("EDIT  ", Style::default().fg(Color::Yellow)));
    }
    if let Some(n) = state.info.as_ref() {
        spans.push(Span::styled(n.message.clone(), level_style(n.level)));
    }
    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn field_line(label: &str, value: String, focused: bool, editing: bool) -> Line<'static> {
    let marker = if focused { "> " } else { "  " };
    let cursor = if focused && editing { "_" } else { "" };
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{marker}{label:<20}"), style),
        Span::raw(format!("{value}{cursor}")),
    ])
}

fn flow_value(state: &UiState, field: FlowField) -> String {
    let flow = &state.wizard.flow;
    let flag = |b: bool| if b { "[x]" } else { "[ ]" }.to_string();
    match field {
        FlowField::RecorderUrl => flow.recorder_url.clone(),
        FlowField::FlowName => flow.flow_name.clone(),
        FlowField::Story => flow.story.clone(),
        FlowField::SourceFile => flow.source_file.clone(),
        FlowField::RecordingSecs => match flow.recording_secs {
            Some(s) => s.to_string(),
            None => format!("{} (default)", state.recorder_secs),
        },
        FlowField::CaptureDom => flag(flow.capture_dom),
        FlowField::CaptureScreenshots => flag(flow.capture_screenshots),
        FlowField::Headed => flag(flow.headed),
    }
}

fn draw_workflow(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(0)])
        .split(area);

    let current = state.wizard.step();
    let visited = state.wizard.back_stack();
    let steps: Vec<Line> = Step::ALL
        .iter()
        .map(|s| {
            if *s == current {
                Line::from(Span::styled(
                    format!("▶ {}", s.title()),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))
            } else if visited.contains(s) {
                Line::from(Span::styled(
                    format!("✓ {}", s.title()),
                    Style::default().fg(Color::Green),
                ))
            } else if current.can_go_to(*s) {
                Line::from(format!("  {}", s.title()))
            } else {
                Line::from(Span::styled(
                    format!("  {}", s.title()),
                    Style::default().fg(Color::DarkGray),
                ))
            }
        })
        .collect();
    f.render_widget(
        Paragraph::new(steps).block(Block::default().borders(Borders::ALL).title("Steps")),
        cols[0],
    );

    let body = if current == Step::Recording {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(cols[1]);
        let secs = state.wizard.flow.recording_duration().as_secs();
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Recording"))
            .gauge_style(Style::default().fg(Color::Red))
            .percent(u16::from(state.wizard.progress()))
            .label(format!("{}% of {secs}s", state.wizard.progress()));
        f.render_widget(gauge, rows[0]);
        rows[1]
    } else {
        cols[1]
    };

    let mut lines: Vec<Line> = Vec::new();
    for (i, field) in step_fields(current).iter().enumerate() {
        lines.push(field_line(
            field.label(),
            flow_value(state, *field),
            i == state.wf_focus,
            state.editing,
        ));
    }
    if !lines.is_empty() {
        lines.push(Line::from(""));
    }

    let flow = &state.wizard.flow;
    let height = body.height.saturating_sub(6) as usize;
    match current {
        Step::Home => {
            lines.push(Line::from("Start a new flow:"));
            lines.push(hints(&[("1", "record a flow in the browser")]));
            lines.push(hints(&[("2", "generate manual test cases")]));
            lines.push(hints(&[("3", "generate an automation script")]));
        }
        Step::RecordForm => {
            lines.push(hints(&[("g", "start recording"), ("esc", "back")]));
        }
        Step::Recording => {
            if let Some(id) = flow.session_id.as_ref() {
                lines.push(Line::from(format!("Session {id}")));
            }
            lines.push(hints(&[("x", "stop now"), ("esc", "cancel")]));
            lines.extend(tail(&flow.event_log, height).iter().map(|l| Line::from(l.clone())));
        }
        Step::RecordingComplete => {
            lines.push(Line::from(format!(
                "{} event(s) captured",
                flow.event_log.len()
            )));
            lines.push(hints(&[
                ("f", "ingest recording"),
                ("i", "session status"),
                ("m", "manual tests"),
                ("a", "automation script"),
            ]));
            lines.extend(tail(&flow.event_log, height).iter().map(|l| Line::from(l.clone())));
        }
        Step::ManualTests => {
            lines.push(hints(&[
                ("g", "generate"),
                ("u", "ingest document"),
                ("e", "export"),
                ("a", "automation script"),
                ("f", "finish"),
            ]));
            if let Some(job) = flow
                .manual_job
                .as_ref()
                .and_then(|id| state.jobs.iter().find(|j| &j.snapshot.id == id))
            {
                lines.push(Line::from(vec![
                    Span::raw(format!("Job {}: ", job.snapshot.id)),
                    Span::styled(job.snapshot.status.to_string(), status_style(job.snapshot.status)),
                ]));
            }
            if let Some(cases) = flow.manual_cases.as_ref() {
                let text = serde_json::to_string_pretty(cases).unwrap_or_default();
                lines.extend(text.lines().map(|l| Line::from(l.to_string())));
            }
        }
        Step::AutomationScript => {
            lines.push(hints(&[
                ("g", "generate"),
                ("t", "trial run"),
                ("s", "persist"),
                ("e", "export"),
                ("y", "copy"),
                ("f", "finish"),
            ]));
            if let Some(script) = flow.script.as_deref() {
                lines.extend(script.lines().map(|l| Line::from(l.to_string())));
            }
        }
        Step::TrialRun => {
            lines.push(hints(&[
                ("r", "run"),
                ("x", "stop"),
                ("a", "back to script"),
                ("f", "finish"),
            ]));
            lines.extend(tail(&flow.trial_log, height).iter().map(|l| Line::from(l.clone())));
        }
        Step::Finished => {
            lines.push(Line::from(format!(
                "Flow: {}",
                if flow.flow_name.is_empty() { "-" } else { flow.flow_name.as_str() }
            )));
            lines.push(Line::from(format!(
                "Manual cases: {}",
                if flow.manual_cases.is_some() { "yes" } else { "no" }
            )));
            lines.push(Line::from(format!(
                "Script: {} line(s)",
                flow.script.as_deref().map(|s| s.lines().count()).unwrap_or(0)
            )));
            lines.push(Line::from(format!("Trial log: {} line(s)", flow.trial_log.len())));
            lines.push(hints(&[("n", "new flow")]));
        }
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(current.title()));
    f.render_widget(p, body);
}

fn form_lines(form: &FormView, editing: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut group = "";
    for (i, field) in form.fields.iter().enumerate() {
        if field.group != group {
            if !group.is_empty() {
                lines.push(Line::from(""));
            }
            group = field.group;
            lines.push(Line::from(Span::styled(
                field.group.to_uppercase(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(field_line(field.label, field.value.clone(), i == form.focus, editing));
    }
    lines
}

fn draw_tools(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let mut lines = vec![hints(&[("g", "submit the focused form")]), Line::from("")];
    lines.extend(form_lines(&state.tools, state.editing));
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Tools")),
        cols[0],
    );

    let result: Vec<Line> = match state.last_generated.as_ref() {
        Some(g) => text_summary::generated_summary(g)
            .lines
            .into_iter()
            .map(Line::from)
            .collect(),
        None => vec![Line::from("No results yet.")],
    };
    f.render_widget(
        Paragraph::new(result)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Last result")),
        cols[1],
    );
}

fn draw_vector(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(14), Constraint::Min(0)])
        .split(area);

    let mut lines = vec![hints(&[("g", "query / delete"), ("l", "list flows")])];
    for line in form_lines(&state.vector, state.editing) {
        let is_filter = line
            .spans
            .first()
            .map(|s| s.content.contains("Filter"))
            .unwrap_or(false);
        lines.push(line);
        if is_filter {
            if let Some(err) = state.filter_error.as_deref() {
                lines.push(Line::from(Span::styled(
                    format!("    {err}"),
                    Style::default().fg(Color::Red),
                )));
            }
        }
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Vector store")),
        rows[0],
    );

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[1]);
    let results: Vec<Line> = text_summary::vector_summary(&state.vector_results)
        .lines
        .into_iter()
        .map(Line::from)
        .collect();
    f.render_widget(
        Paragraph::new(results)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Results")),
        cols[0],
    );
    let flows: Vec<Line> = text_summary::flows_summary(&state.flows)
        .lines
        .into_iter()
        .map(Line::from)
        .collect();
    f.render_widget(
        Paragraph::new(flows)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Flows")),
        cols[1],
    );
}

fn draw_jobs(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let mut lines = vec![hints(&[
        ("↑/↓", "select"),
        ("enter", "watch"),
        ("s", "stop polling"),
        ("e", "export JSON"),
        ("y", "copy path"),
    ])];
    if state.jobs.is_empty() {
        lines.push(Line::from("No jobs submitted yet."));
    }
    for (i, job) in state.jobs.iter().enumerate() {
        let watched = state.watched.as_ref() == Some(&job.snapshot.id);
        let style = if i == state.jobs_selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        let mut spans = vec![
            Span::styled(
                format!(
                    "{} {:<24} {:<28} ",
                    if watched { "*" } else { " " },
                    job.kind.label(),
                    job.snapshot.id.as_str()
                ),
                style,
            ),
            Span::styled(job.snapshot.status.to_string(), status_style(job.snapshot.status)),
        ];
        if let Some(err) = job.last_error.as_deref() {
            spans.push(Span::styled(
                format!("  (poll failed: {err})"),
                Style::default().fg(Color::Yellow),
            ));
        }
        lines.push(Line::from(spans));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Jobs")),
        rows[0],
    );

    let detail: Vec<Line> = match state.selected_job() {
        Some(job) => text_summary::job_summary(&job.snapshot)
            .lines
            .into_iter()
            .map(Line::from)
            .collect(),
        None => Vec::new(),
    };
    f.render_widget(
        Paragraph::new(detail)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Details")),
        rows[1],
    );
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines = vec![hints(&[
        ("↑/↓", "select"),
        ("enter", "watch job"),
        ("c", "clear"),
    ])];
    if state.history.is_empty() {
        lines.push(Line::from("No Jira ingestions recorded."));
    }
    for (i, entry) in state.history.iter().enumerate() {
        let style = if i == state.history_selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{}  ", entry.timestamp), Style::default().fg(Color::Gray)),
            Span::styled(format!("{:<28} {}", entry.job_id.as_str(), entry.query), style),
        ]));
    }
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Jira ingestion history ({})", state.history.len())),
        ),
        area,
    );
}
