//! Post-session processing utilities.
//!
//! Builds the session report, then handles auto-save, exports, and history refresh
//! after a stream closes.

use crate::cli::Cli;
use crate::model::{SessionConfig, SessionReport, SessionSummary};
use crate::router::UpdateRouter;
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-session processing, ready for presentation layers.
pub(crate) struct ProcessedSession {
    pub report: SessionReport,
    pub export_messages: Vec<String>,
    pub history: Vec<SessionReport>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Snapshot the router into a report.
pub(crate) fn build_report(
    cfg: &SessionConfig,
    router: &UpdateRouter,
    summary: &SessionSummary,
) -> SessionReport {
    SessionReport {
        timestamp_utc: summary.ended_utc.clone(),
        started_utc: summary.started_utc.clone(),
        session_id: summary.session_id.clone(),
        project_idea: summary.project_idea.clone(),
        base_url: cfg.base_url.clone(),
        outcome: router.outcome(),
        stages: router.stages().snapshot(),
        log: router.log().to_vec(),
        tags: router.tags().to_vec(),
        metrics: router.metrics().copied(),
        verdict: router.verdict().map(str::to_string),
        files: router.files().to_vec(),
        code: router.code().to_string(),
        frames_received: summary.frames_received,
        frames_skipped: summary.frames_skipped,
        unknown_tags: router.unknown_tags(),
        transport_error: summary.transport_error.clone(),
    }
}

/// Save the report into `dir`, reporting a failure as an export message.
fn auto_save_into(
    dir: &Path,
    report: &SessionReport,
    messages: &mut Vec<String>,
) -> Option<PathBuf> {
    match storage::save_run_in(dir, report) {
        Ok(path) => Some(path),
        Err(e) => {
            messages.push(format!("Auto-save failed: {e:#}"));
            None
        }
    }
}

/// Process a finished session: build the report, auto-save, export, and reload history.
/// Exports are only written once the router has seen the stream close.
pub(crate) fn process_session_completion(
    args: &Cli,
    cfg: &SessionConfig,
    router: &UpdateRouter,
    summary: &SessionSummary,
    history_load: usize,
    auto_save: bool,
) -> ProcessedSession {
    let report = build_report(cfg, router, summary);

    let mut export_messages = Vec::new();
    let auto_saved_path = if auto_save {
        auto_save_into(&storage::runs_dir(), &report, &mut export_messages)
    } else {
        None
    };

    let wants_export = args.export_json.is_some() || args.export_markdown.is_some();
    if wants_export && !router.export_enabled() {
        export_messages.push("Export unavailable: stream never closed".to_string());
    } else {
        if let Some(export_path) = args.export_json.as_deref() {
            match storage::export_json(export_path, &report) {
                Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
                Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
            }
        }
        if let Some(export_path) = args.export_markdown.as_deref() {
            match storage::export_markdown(export_path, &report) {
                Ok(_) => export_messages.push(format!(
                    "Exported blueprint: {}",
                    export_path.display()
                )),
                Err(e) => export_messages.push(format!("Export blueprint failed: {e:#}")),
            }
        }
    }

    let history = if history_load > 0 {
        storage::load_recent(history_load).unwrap_or_default()
    } else {
        Vec::new()
    };

    ProcessedSession {
        report,
        export_messages,
        history,
        auto_saved_path,
    }
}
