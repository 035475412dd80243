//! Key handling for the dashboard.
//!
//! Keys mutate [`UiState`] directly and return the commands the controller should run.

use super::export;
use super::state::{step_fields, FlowField, FormView, StreamKind, Tab, UiState};
use crate::error::FormError;
use crate::forms::{
    DocumentForm, GitPushForm, InspectForm, JiraForm, ManualForm, PayloadForm, PersistForm,
    RecorderForm, ScriptForm, Submission, TrialForm, VectorDeleteForm, VectorQueryForm,
    WebsiteForm, DEFAULT_TOP_K,
};
use crate::model::{JobKind, Notice};
use crate::orchestrator::UiCommand;
use crate::workflow::Step;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// The value under the cursor, borrowed for editing.
enum Input<'a> {
    Text(&'a mut String),
    Number(&'a mut Option<u64>),
    Flag(&'a mut bool),
}

fn form_input(form: &mut FormView) -> Option<Input<'_>> {
    form.focused_mut().map(|f| Input::Text(&mut f.value))
}

fn focused_input(state: &mut UiState) -> Option<Input<'_>> {
    match state.tab {
        Tab::Workflow => {
            let field = *step_fields(state.wizard.step()).get(state.wf_focus)?;
            let flow = &mut state.wizard.flow;
            Some(match field {
                FlowField::RecorderUrl => Input::Text(&mut flow.recorder_url),
                FlowField::FlowName => Input::Text(&mut flow.flow_name),
                FlowField::Story => Input::Text(&mut flow.story),
                FlowField::SourceFile => Input::Text(&mut flow.source_file),
                FlowField::RecordingSecs => Input::Number(&mut flow.recording_secs),
                FlowField::CaptureDom => Input::Flag(&mut flow.capture_dom),
                FlowField::CaptureScreenshots => Input::Flag(&mut flow.capture_screenshots),
                FlowField::Headed => Input::Flag(&mut flow.headed),
            })
        }
        Tab::Tools => form_input(&mut state.tools),
        Tab::Vector => form_input(&mut state.vector),
        Tab::Jobs | Tab::History | Tab::Help => None,
    }
}

pub fn handle_key(state: &mut UiState, key: KeyEvent) -> Vec<UiCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return vec![UiCommand::Quit];
    }
    if state.editing {
        edit_key(state, key.code);
        return Vec::new();
    }

    match key.code {
        KeyCode::Char('q') => return vec![UiCommand::Quit],
        KeyCode::Tab => {
            state.tab = state.tab.next();
            return Vec::new();
        }
        KeyCode::BackTab => {
            state.tab = state.tab.prev();
            return Vec::new();
        }
        KeyCode::Char('?') => {
            state.tab = Tab::Help;
            return Vec::new();
        }
        KeyCode::Up | KeyCode::Char('k') => {
            move_cursor(state, false);
            return Vec::new();
        }
        KeyCode::Down | KeyCode::Char('j') => {
            move_cursor(state, true);
            return Vec::new();
        }
        KeyCode::Enter => {
            match focused_input(state) {
                Some(Input::Flag(b)) => *b = !*b,
                Some(Input::Text(_)) | Some(Input::Number(_)) => state.editing = true,
                None => return open_row(state),
            }
            return Vec::new();
        }
        _ => {}
    }

    match state.tab {
        Tab::Workflow => workflow_key(state, key.code),
        Tab::Tools => tools_key(state, key.code),
        Tab::Vector => vector_key(state, key.code),
        Tab::Jobs => jobs_key(state, key.code),
        Tab::History => history_key(state, key.code),
        Tab::Help => Vec::new(),
    }
}

fn edit_key(state: &mut UiState, code: KeyCode) {
    if matches!(code, KeyCode::Enter | KeyCode::Esc) {
        state.editing = false;
        return;
    }
    match (focused_input(state), code) {
        (Some(Input::Text(s)), KeyCode::Backspace) => {
            s.pop();
        }
        (Some(Input::Text(s)), KeyCode::Char(c)) => s.push(c),
        (Some(Input::Number(n)), KeyCode::Backspace) => {
            *n = n.map(|v| v / 10).filter(|v| *v > 0);
        }
        (Some(Input::Number(n)), KeyCode::Char(c)) => {
            if let Some(d) = c.to_digit(10) {
                *n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(u64::from(d)));
            }
        }
        (None, _) => state.editing = false,
        _ => {}
    }
}

fn step(len: usize, cur: usize, down: bool) -> usize {
    if len == 0 {
        0
    } else if down {
        (cur + 1) % len
    } else {
        (cur + len - 1) % len
    }
}

fn move_cursor(state: &mut UiState, down: bool) {
    match state.tab {
        Tab::Workflow => {
            let len = step_fields(state.wizard.step()).len();
            state.wf_focus = step(len, state.wf_focus, down);
        }
        Tab::Tools => {
            if down {
                state.tools.next()
            } else {
                state.tools.prev()
            }
        }
        Tab::Vector => {
            if down {
                state.vector.next()
            } else {
                state.vector.prev()
            }
        }
        Tab::Jobs => {
            let len = state.jobs.len();
            state.jobs_selected = if down {
                (state.jobs_selected + 1).min(len.saturating_sub(1))
            } else {
                state.jobs_selected.saturating_sub(1)
            };
        }
        Tab::History => {
            let len = state.history.len();
            state.history_selected = if down {
                (state.history_selected + 1).min(len.saturating_sub(1))
            } else {
                state.history_selected.saturating_sub(1)
            };
        }
        Tab::Help => {}
    }
}

/// Enter on a list row: start polling the selected job.
fn open_row(state: &mut UiState) -> Vec<UiCommand> {
    let target = match state.tab {
        Tab::Jobs => state
            .selected_job()
            .map(|j| (j.snapshot.id.clone(), j.kind.label().to_string())),
        Tab::History => state
            .history
            .get(state.history_selected)
            .map(|e| (e.job_id.clone(), format!("Jira ingestion ({})", e.query))),
        _ => None,
    };
    match target {
        Some((job_id, label)) => {
            if state.tab == Tab::History {
                state.track_job(JobKind::IngestJira, job_id.clone());
            }
            state.watched = Some(job_id.clone());
            state.notify(Notice::info(format!("Watching {job_id}")));
            vec![UiCommand::Watch {
                job_id: Some(job_id),
                label,
            }]
        }
        None => Vec::new(),
    }
}

fn goto(state: &mut UiState, to: Step) -> bool {
    match state.wizard.navigate(to) {
        Ok(()) => {
            state.wf_focus = 0;
            true
        }
        Err(e) => {
            state.notify(Notice::warning(e.to_string()));
            false
        }
    }
}

fn session_cmd(state: &mut UiState, f: fn(crate::model::SessionId) -> Submission) -> Vec<UiCommand> {
    match state.wizard.flow.session_id.clone() {
        Some(id) => vec![state.flow_cmd(f(id))],
        None => {
            state.notify(Notice::warning("No recorder session"));
            Vec::new()
        }
    }
}

fn workflow_key(state: &mut UiState, code: KeyCode) -> Vec<UiCommand> {
    let current = state.wizard.step();
    match (current, code) {
        (_, KeyCode::Char('R')) => {
            let mut cmds = Vec::new();
            if current == Step::Recording {
                if let Some(id) = state.wizard.flow.session_id.clone() {
                    cmds.push(UiCommand::Submit(Submission::RecorderStop(id)));
                }
            }
            if state.stream.is_some() {
                cmds.push(UiCommand::StopStream);
            }
            state.new_flow();
            state.notify(Notice::info("Started a new flow"));
            cmds
        }
        (_, KeyCode::Esc) | (_, KeyCode::Backspace) => {
            state.wizard.go_back();
            state.wf_focus = 0;
            if current == Step::Recording && state.wizard.step() != Step::Recording {
                return state.stop_recording();
            }
            Vec::new()
        }

        (Step::Home, KeyCode::Char('1')) => {
            goto(state, Step::RecordForm);
            Vec::new()
        }
        (Step::Home, KeyCode::Char('2')) => {
            goto(state, Step::ManualTests);
            Vec::new()
        }
        (Step::Home, KeyCode::Char('3')) => {
            goto(state, Step::AutomationScript);
            Vec::new()
        }

        (Step::RecordForm, KeyCode::Char('g')) => {
            let flow = &mut state.wizard.flow;
            let secs = *flow.recording_secs.get_or_insert(state.recorder_secs);
            let form = RecorderForm {
                url: flow.recorder_url.clone(),
                flow_name: flow.flow_name.clone(),
                timeout_secs: Some(secs),
                capture_dom: flow.capture_dom,
                capture_screenshots: flow.capture_screenshots,
            };
            vec![state.flow_cmd(Submission::RecorderStart(form))]
        }

        (Step::Recording, KeyCode::Char('x')) => {
            if goto(state, Step::RecordingComplete) {
                return state.stop_recording();
            }
            Vec::new()
        }

        (Step::RecordingComplete, KeyCode::Char('f')) => {
            session_cmd(state, Submission::RecorderFinalize)
        }
        (Step::RecordingComplete, KeyCode::Char('i')) => {
            session_cmd(state, Submission::RecorderStatus)
        }
        (Step::RecordingComplete, KeyCode::Char('m')) => {
            goto(state, Step::ManualTests);
            Vec::new()
        }

        (Step::ManualTests, KeyCode::Char('g')) => {
            let story = state.wizard.flow.story.clone();
            vec![state.flow_cmd(Submission::Manual(ManualForm { story }))]
        }
        (Step::ManualTests, KeyCode::Char('u')) => {
            let path = state.wizard.flow.source_file.clone();
            vec![state.flow_cmd(Submission::Document(DocumentForm { path }))]
        }
        (Step::ManualTests, KeyCode::Char('e')) => {
            export::export_and_show_path(state, export::export_manual_cases);
            Vec::new()
        }

        (Step::AutomationScript, KeyCode::Char('g')) => {
            let flow = &state.wizard.flow;
            let form = ScriptForm {
                flow_name: flow.flow_name.clone(),
                story: flow.story.clone(),
            };
            vec![state.flow_cmd(Submission::Script(form))]
        }
        (Step::AutomationScript, KeyCode::Char('s')) => {
            let flow = &state.wizard.flow;
            let form = PersistForm {
                flow_name: flow.flow_name.clone(),
                script: flow.script.clone().unwrap_or_default(),
            };
            vec![state.flow_cmd(Submission::Persist(form))]
        }
        (Step::AutomationScript, KeyCode::Char('e')) => {
            export::export_and_show_path(state, export::export_script);
            Vec::new()
        }
        (Step::AutomationScript, KeyCode::Char('y')) => {
            let notice = match state.wizard.flow.script.as_deref() {
                Some(script) => match export::copy_to_clipboard(script) {
                    Ok(()) => Notice::success("Script copied to clipboard"),
                    Err(e) => Notice::warning(format!("Clipboard copy failed: {e:#}")),
                },
                None => Notice::warning("No script has been generated yet"),
            };
            state.notify(notice);
            Vec::new()
        }
        (Step::AutomationScript, KeyCode::Char('t')) => {
            goto(state, Step::TrialRun);
            Vec::new()
        }

        (Step::TrialRun, KeyCode::Char('r')) => {
            let flow = &mut state.wizard.flow;
            let form = TrialForm {
                script: flow.script.clone().unwrap_or_default(),
                headed: flow.headed,
            };
            if form.validate().is_ok() {
                flow.trial_log.clear();
                state.stream = Some(StreamKind::Trial);
            }
            vec![UiCommand::StartTrial {
                flow: state.flow_seq,
                form,
            }]
        }
        (Step::TrialRun, KeyCode::Char('x')) => vec![UiCommand::StopStream],

        (Step::RecordingComplete | Step::TrialRun, KeyCode::Char('a')) => {
            goto(state, Step::AutomationScript);
            Vec::new()
        }
        (Step::ManualTests, KeyCode::Char('a')) => {
            goto(state, Step::AutomationScript);
            Vec::new()
        }
        (Step::ManualTests | Step::AutomationScript | Step::TrialRun, KeyCode::Char('f')) => {
            goto(state, Step::Finished);
            Vec::new()
        }
        (Step::Finished, KeyCode::Char('n')) => {
            state.new_flow();
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn tools_submission(form: &FormView) -> Result<Option<Submission>, FormError> {
    let Some(group) = form.focused_group() else {
        return Ok(None);
    };
    let sub = match group {
        "document" => Submission::Document(DocumentForm {
            path: form.text("doc_path").to_string(),
        }),
        "jira" => Submission::Jira(JiraForm {
            jql: form.text("jql").to_string(),
            max_results: form.number("max_results")?,
        }),
        "website" => Submission::Website(WebsiteForm {
            url: form.text("site_url").to_string(),
            depth: form.number("depth")?,
        }),
        "payload" => Submission::Payload(PayloadForm {
            description: form.text("payload_desc").to_string(),
            count: form.number("payload_count")?,
        }),
        "inspect" => Submission::Inspect(InspectForm {
            keyword: form.text("keyword").to_string(),
            repo_path: form.text("inspect_repo").to_string(),
            max_assets: form.number("max_assets")?,
        }),
        "git" => Submission::GitPush(GitPushForm {
            repo_path: form.text("git_repo").to_string(),
            branch: form.text("git_branch").to_string(),
            commit_message: form.text("git_message").to_string(),
        }),
        _ => return Ok(None),
    };
    Ok(Some(sub))
}

fn submit_or_warn(
    state: &mut UiState,
    built: Result<Option<Submission>, FormError>,
) -> Vec<UiCommand> {
    match built {
        Ok(Some(sub)) => vec![UiCommand::Submit(sub)],
        Ok(None) => Vec::new(),
        Err(e) => {
            state.notify(Notice::warning(e.to_string()));
            Vec::new()
        }
    }
}

fn tools_key(state: &mut UiState, code: KeyCode) -> Vec<UiCommand> {
    match code {
        KeyCode::Char('g') => {
            let built = tools_submission(&state.tools);
            submit_or_warn(state, built)
        }
        _ => Vec::new(),
    }
}

fn vector_submission(form: &FormView) -> Result<Option<Submission>, FormError> {
    let sub = match form.focused_group() {
        Some("query") => Submission::VectorQuery(VectorQueryForm {
            query: form.text("query").to_string(),
            top_k: form.number("top_k")?.unwrap_or(DEFAULT_TOP_K),
            filter: form.text("filter").to_string(),
        }),
        Some("delete") => Submission::VectorDelete(VectorDeleteForm {
            id: form.text("delete_id").to_string(),
            source: form.text("delete_source").to_string(),
        }),
        _ => return Ok(None),
    };
    Ok(Some(sub))
}

fn vector_key(state: &mut UiState, code: KeyCode) -> Vec<UiCommand> {
    match code {
        KeyCode::Char('g') => {
            let built = vector_submission(&state.vector);
            submit_or_warn(state, built)
        }
        KeyCode::Char('l') => vec![UiCommand::Submit(Submission::VectorFlows)],
        _ => Vec::new(),
    }
}

fn copy_exported_path(state: &mut UiState) {
    let notice = match state.last_exported_path.clone() {
        Some(path) => match export::copy_to_clipboard(&path) {
            Ok(()) => Notice::success(format!("Copied to clipboard: {path}")),
            Err(e) => Notice::warning(format!("Clipboard copy failed: {e:#}")),
        },
        None => Notice::warning("No exported file path to copy. Export something first"),
    };
    state.notify(notice);
}

fn jobs_key(state: &mut UiState, code: KeyCode) -> Vec<UiCommand> {
    match code {
        KeyCode::Char('s') => {
            state.watched = None;
            state.notify(Notice::info("Stopped polling"));
            vec![UiCommand::Watch {
                job_id: None,
                label: String::new(),
            }]
        }
        KeyCode::Char('e') => {
            if let Some(snap) = state.selected_job().map(|j| j.snapshot.clone()) {
                export::export_and_show_path(state, |_| export::export_job(&snap));
            }
            Vec::new()
        }
        KeyCode::Char('y') => {
            copy_exported_path(state);
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn history_key(state: &mut UiState, code: KeyCode) -> Vec<UiCommand> {
    match code {
        KeyCode::Char('c') => vec![UiCommand::ClearHistory],
        KeyCode::Char('y') => {
            copy_exported_path(state);
            Vec::new()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, SessionId};
    use crate::storage::HistoryEntry;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(state: &mut UiState, text: &str) {
        handle_key(state, key(KeyCode::Enter));
        for c in text.chars() {
            handle_key(state, key(KeyCode::Char(c)));
        }
        handle_key(state, key(KeyCode::Enter));
    }

    #[test]
    fn quit_keys() {
        let mut state = UiState::default();
        assert!(matches!(
            &handle_key(&mut state, key(KeyCode::Char('q')))[..],
            [UiCommand::Quit]
        ));
        state.editing = true;
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(&handle_key(&mut state, ctrl_c)[..], [UiCommand::Quit]));
    }

    #[test]
    fn typing_fills_the_record_form() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('1')));
        assert_eq!(state.wizard.step(), Step::RecordForm);

        type_text(&mut state, "https://shop.test");
        handle_key(&mut state, key(KeyCode::Down));
        type_text(&mut state, "checkout");
        handle_key(&mut state, key(KeyCode::Down));
        type_text(&mut state, "45");
        handle_key(&mut state, key(KeyCode::Down));
        handle_key(&mut state, key(KeyCode::Enter));

        let cmds = handle_key(&mut state, key(KeyCode::Char('g')));
        match &cmds[..] {
            [UiCommand::FlowSubmit {
                sub: Submission::RecorderStart(form),
                ..
            }] => {
                assert_eq!(form.url, "https://shop.test");
                assert_eq!(form.flow_name, "checkout");
                assert_eq!(form.timeout_secs, Some(45));
                assert!(form.capture_dom);
                assert!(!form.capture_screenshots);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn letters_typed_while_editing_are_not_shortcuts() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('2')));
        assert_eq!(state.wizard.step(), Step::ManualTests);
        type_text(&mut state, "as a user I want to quit");
        assert_eq!(state.wizard.flow.story, "as a user I want to quit");
        assert_eq!(state.wizard.step(), Step::ManualTests);
    }

    #[test]
    fn escape_goes_back_and_disallowed_moves_warn() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('3')));
        assert_eq!(state.wizard.step(), Step::AutomationScript);
        handle_key(&mut state, key(KeyCode::Esc));
        assert_eq!(state.wizard.step(), Step::Home);
        handle_key(&mut state, key(KeyCode::Esc));
        assert_eq!(state.wizard.step(), Step::Home);

        state.wizard.navigate(Step::RecordForm).unwrap();
        state.wizard.navigate(Step::Recording).unwrap();
        state.wizard.flow.session_id = Some(SessionId::new("s"));
        let cmds = handle_key(&mut state, key(KeyCode::Char('x')));
        assert_eq!(state.wizard.step(), Step::RecordingComplete);
        assert!(matches!(
            &cmds[..],
            [
                UiCommand::StopStream,
                UiCommand::FlowSubmit {
                    sub: Submission::RecorderStop(_),
                    ..
                }
            ]
        ));
    }

    #[test]
    fn reset_key_clears_the_flow() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('2')));
        type_text(&mut state, "story");
        handle_key(&mut state, key(KeyCode::Char('R')));
        assert_eq!(state.wizard.step(), Step::Home);
        assert!(state.wizard.back_stack().is_empty());
        assert!(state.wizard.flow.story.is_empty());
    }

    #[test]
    fn reset_during_recording_stops_the_backend_session() {
        let mut state = UiState {
            stream: Some(StreamKind::Recorder),
            ..UiState::default()
        };
        state.wizard.navigate(Step::RecordForm).unwrap();
        state.wizard.navigate(Step::Recording).unwrap();
        state.wizard.flow.session_id = Some(SessionId::new("rec-9"));

        let cmds = handle_key(&mut state, key(KeyCode::Char('R')));
        assert_eq!(state.wizard.step(), Step::Home);
        assert!(state.wizard.flow.session_id.is_none());
        assert!(state.stream.is_none());
        assert!(matches!(
            &cmds[..],
            [UiCommand::Submit(Submission::RecorderStop(id)), UiCommand::StopStream]
                if id.as_str() == "rec-9"
        ));
    }

    #[test]
    fn trial_without_script_still_goes_through_validation() {
        let mut state = UiState::default();
        state.wizard.navigate(Step::AutomationScript).unwrap();
        state.wizard.navigate(Step::TrialRun).unwrap();
        let cmds = handle_key(&mut state, key(KeyCode::Char('r')));
        assert!(matches!(&cmds[..], [UiCommand::StartTrial { .. }]));
        assert!(state.stream.is_none());
    }

    #[test]
    fn vector_query_uses_focused_group() {
        let mut state = UiState {
            tab: Tab::Vector,
            ..UiState::default()
        };
        type_text(&mut state, "login");
        handle_key(&mut state, key(KeyCode::Down));
        handle_key(&mut state, key(KeyCode::Down));
        type_text(&mut state, "{bad");
        let cmds = handle_key(&mut state, key(KeyCode::Char('g')));
        match &cmds[..] {
            [UiCommand::Submit(Submission::VectorQuery(q))] => {
                assert_eq!(q.query, "login");
                assert_eq!(q.top_k, 5);
                assert_eq!(q.filter, "{bad");
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn bad_numbers_warn_instead_of_submitting() {
        let mut state = UiState {
            tab: Tab::Tools,
            ..UiState::default()
        };
        state.tools.focus = 2;
        state.tools.set_text("max_results", "lots");
        let cmds = handle_key(&mut state, key(KeyCode::Char('g')));
        assert!(cmds.is_empty());
        assert!(state.info.unwrap().message.contains("whole number"));
    }

    #[test]
    fn history_enter_watches_the_selected_job() {
        let mut state = UiState {
            tab: Tab::History,
            ..UiState::default()
        };
        state.history = vec![
            HistoryEntry {
                job_id: JobId::new("j2"),
                query: "project = B".into(),
                timestamp: "t2".into(),
            },
            HistoryEntry {
                job_id: JobId::new("j1"),
                query: "project = A".into(),
                timestamp: "t1".into(),
            },
        ];
        handle_key(&mut state, key(KeyCode::Down));
        let cmds = handle_key(&mut state, key(KeyCode::Enter));
        assert!(matches!(
            &cmds[..],
            [UiCommand::Watch { job_id: Some(id), .. }] if id.as_str() == "j1"
        ));
        assert_eq!(state.jobs[0].snapshot.id.as_str(), "j1");
        assert_eq!(state.jobs[0].kind, JobKind::IngestJira);
        assert!(matches!(
            &handle_key(&mut state, key(KeyCode::Char('c')))[..],
            [UiCommand::ClearHistory]
        ));
    }
}
