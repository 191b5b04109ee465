use crate::model::SessionReport;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Save the report to the history directory and show the path.
pub fn save_and_show_path(r: &SessionReport, state: &mut UiState) {
    match crate::storage::save_run(r) {
        Ok(path) => {
            state.info = format!("Saved: {}", path.display());
        }
        Err(e) => {
            state.info = format!("Save failed: {e:#}");
        }
    }
}

fn export_path(r: &SessionReport, ext: &str) -> Result<PathBuf> {
    let default_name = format!(
        "wyronix-{}-{}.{}",
        r.timestamp_utc.replace(':', "-").replace('T', "_"),
        crate::storage::short_id(&r.session_id),
        ext
    );
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(default_name))
}

/// Export the report as JSON into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_report_json(r: &SessionReport) -> Result<PathBuf> {
    let path = export_path(r, "json")?;
    crate::storage::export_json(&path, r)?;
    Ok(path)
}

/// Export the Markdown blueprint into the current directory.
pub fn export_report_markdown(r: &SessionReport) -> Result<PathBuf> {
    let path = export_path(r, "md")?;
    crate::storage::export_markdown(&path, r)?;
    Ok(path)
}

/// Record an export outcome in the status line.
pub fn show_export(state: &mut UiState, label: &str, res: Result<PathBuf>) {
    match res {
        Ok(p) => {
            state.last_exported_path = Some(p.to_string_lossy().to_string());
            state.info = format!("Exported {label}: {} (press 'y' to copy path)", p.display());
        }
        Err(e) => {
            state.info = format!("{label} export failed: {e:#}");
        }
    }
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each copy gets its own clipboard instance, held for a couple of seconds so clipboard
/// managers on Linux can read it before it is dropped.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
