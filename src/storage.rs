//! Saved session reports and exports.
//!
//! Reports live as one pretty-printed JSON file per session under the user's local data
//! directory. File names start with the UTC timestamp so name order is age order.

use crate::model::{LogKind, SessionReport, StageState};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

const APP_DIR: &str = "wyronix-cli";

pub fn base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn runs_dir() -> PathBuf {
    base_dir().join("runs")
}

pub fn logs_dir() -> PathBuf {
    base_dir().join("logs")
}

/// First eight characters of a session id, for file names and list rows.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn run_file_name(r: &SessionReport) -> String {
    format!(
        "session-{}-{}.json",
        r.timestamp_utc.replace(':', "-"),
        short_id(&r.session_id)
    )
}

pub fn save_run(r: &SessionReport) -> Result<PathBuf> {
    save_run_in(&runs_dir(), r)
}

pub fn save_run_in(dir: &Path, r: &SessionReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(run_file_name(r));
    export_json(&path, r)?;
    Ok(path)
}

/// Load up to `limit` saved reports, newest first. Unreadable files are skipped.
pub fn load_recent(limit: usize) -> Result<Vec<SessionReport>> {
    load_recent_in(&runs_dir(), limit)
}

pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<SessionReport>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .collect();
    paths.sort();
    paths.reverse();

    let mut out = Vec::new();
    for p in paths.into_iter().take(limit) {
        let parsed = std::fs::read_to_string(&p)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<SessionReport>(&s).map_err(Into::into));
        match parsed {
            Ok(r) => out.push(r),
            Err(e) => warn!(path = %p.display(), error = %e, "skipping unreadable report"),
        }
    }
    Ok(out)
}

pub fn delete_run(r: &SessionReport) -> Result<()> {
    delete_run_in(&runs_dir(), r)
}

pub fn delete_run_in(dir: &Path, r: &SessionReport) -> Result<()> {
    let path = dir.join(run_file_name(r));
    std::fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))
}

pub fn export_json(path: &Path, r: &SessionReport) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(r).context("serialize report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

pub fn export_markdown(path: &Path, r: &SessionReport) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, render_markdown(r)).with_context(|| format!("write {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    Ok(())
}

/// Render the blueprint document for a finished session.
pub fn render_markdown(r: &SessionReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Wyronix Blueprint\n");
    let _ = writeln!(md, "- Session: `{}`", r.session_id);
    if !r.started_utc.is_empty() {
        let _ = writeln!(md, "- Started: {}", r.started_utc);
    }
    let _ = writeln!(md, "- Generated: {}", r.timestamp_utc);
    let _ = writeln!(md, "- Outcome: {:?}\n", r.outcome);

    let _ = writeln!(md, "## Project\n\n{}\n", r.project_idea.trim());

    let _ = writeln!(md, "## Pipeline\n");
    for s in &r.stages {
        let mark = match s.state {
            StageState::Completed => "x",
            StageState::Active => "~",
            StageState::Dimmed => " ",
        };
        let _ = writeln!(md, "- [{}] {}", mark, s.stage.label());
    }
    md.push('\n');

    let intel: String = r
        .log
        .iter()
        .filter(|l| l.kind == LogKind::Search)
        .map(|l| l.text.as_str())
        .collect();
    if !intel.trim().is_empty() {
        let _ = writeln!(md, "## Market Intelligence\n\n{}\n", intel.trim());
    }

    if r.metrics.is_some() || r.verdict.is_some() {
        let _ = writeln!(md, "## Strategic Analysis\n");
        if let Some(m) = r.metrics.as_ref() {
            let _ = writeln!(md, "- Market heat: {}%", m.heat.value);
            let _ = writeln!(md, "- ROI viability: {}%", m.roi.value);
        }
        if let Some(v) = r.verdict.as_deref() {
            let _ = writeln!(md, "- Verdict: {}", v);
        }
        md.push('\n');
    }

    if !r.tags.is_empty() {
        let _ = writeln!(md, "## Tags\n\n{}\n", r.tags.join(", "));
    }

    if !r.files.is_empty() {
        let _ = writeln!(md, "## File Tree\n");
        for f in &r.files {
            let _ = writeln!(md, "- `{}`", f);
        }
        md.push('\n');
    }

    if !r.code.is_empty() {
        let _ = writeln!(md, "## Code Preview\n\n```\n{}\n```\n", r.code.trim_end());
    }

    let problems: Vec<&str> = r
        .log
        .iter()
        .filter(|l| matches!(l.kind, LogKind::Error | LogKind::SignalLost))
        .map(|l| l.text.as_str())
        .collect();
    if !problems.is_empty() {
        let _ = writeln!(md, "## Errors\n");
        for p in problems {
            let _ = writeln!(md, "- {}", p);
        }
    }
    md
}
