use crate::model::JobSnapshot;
use crate::storage;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn slug(name: &str) -> String {
    let s: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let s = s.trim_matches('-').to_string();
    if s.is_empty() {
        "flow".into()
    } else {
        s
    }
}

/// Write the generated automation script next to the working directory.
pub fn export_script(state: &UiState) -> Result<PathBuf> {
    let flow = &state.wizard.flow;
    let script = flow
        .script
        .as_deref()
        .context("no script has been generated yet")?;
    let path = storage::default_export_path(&format!("script-{}", slug(&flow.flow_name)), "ts")?;
    storage::export_text(&path, script)?;
    Ok(path)
}

pub fn export_manual_cases(state: &UiState) -> Result<PathBuf> {
    let cases = state
        .wizard
        .flow
        .manual_cases
        .as_ref()
        .context("no manual test cases yet")?;
    let path = storage::default_export_path("manual-cases", "json")?;
    storage::export_json(&path, cases)?;
    Ok(path)
}

pub fn export_job(snap: &JobSnapshot) -> Result<PathBuf> {
    let path = storage::default_export_path(&format!("job-{}", slug(snap.id.as_str())), "json")?;
    storage::export_json(&path, snap)?;
    Ok(path)
}

/// Run an export and report the path (or failure) on the status line.
pub fn export_and_show_path(state: &mut UiState, f: impl FnOnce(&UiState) -> Result<PathBuf>) {
    match f(state) {
        Ok(path) => {
            let shown = path.display().to_string();
            state.notify(crate::model::Notice::success(format!("Exported: {shown}")));
            state.last_exported_path = Some(shown);
        }
        Err(e) => state.notify(crate::model::Notice::warning(format!("Export failed: {e:#}"))),
    }
}

/// Clipboard contents vanish on some Linux setups once the owning handle drops,
/// so a dedicated thread holds each one for a while.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            for text in rx {
                match arboard::Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });
        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("clipboard manager not running"))
}

/// Queue text for the clipboard without blocking the draw loop.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    init_clipboard_manager()?
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("clipboard manager channel closed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_filename_safe() {
        assert_eq!(slug("Checkout / Guest"), "checkout---guest");
        assert_eq!(slug("  "), "flow");
    }

    #[test]
    fn exporting_without_script_fails() {
        let state = UiState::default();
        assert!(export_script(&state).is_err());
        assert!(export_manual_cases(&state).is_err());
    }
}
