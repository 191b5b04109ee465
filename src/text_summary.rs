//! Text rendering for CLI output.
//!
//! Formats live session events as log lines and a finished report as a summary block.

use crate::model::{Agent, LogKind, Outcome, SessionEvent, SessionReport, StageState};
use crate::storage::short_id;

/// One rendered line of live output.
pub(crate) enum LiveLine {
    /// Routed content, written to stdout.
    Progress(String),
    /// Status and diagnostics, written to stderr.
    Diagnostic(String),
}

/// Render a live event, if it has anything to show.
pub(crate) fn live_line(ev: &SessionEvent) -> Option<LiveLine> {
    match ev {
        SessionEvent::Info(info) => Some(LiveLine::Diagnostic(info.to_message())),
        SessionEvent::BootstrapFailed { reason } => {
            Some(LiveLine::Diagnostic(format!("Connection failed: {reason}")))
        }
        SessionEvent::Connected { session_id, status } => Some(LiveLine::Diagnostic(format!(
            "Session {} {}",
            short_id(session_id),
            status.as_deref().unwrap_or("active")
        ))),
        SessionEvent::Update(u) => match &u.agent {
            Agent::Search | Agent::Analyst => u
                .content
                .as_deref()
                .map(|c| LiveLine::Progress(format!("[{}] {}", u.agent.as_str(), c))),
            Agent::Dev => match (u.file.as_deref(), u.code.as_deref()) {
                (Some(f), _) => Some(LiveLine::Progress(format!("[DEV] + {f}"))),
                (None, Some(code)) => Some(LiveLine::Progress(format!(
                    "[DEV] code preview (+{} bytes)",
                    code.len()
                ))),
                (None, None) => None,
            },
            Agent::Complete => Some(LiveLine::Progress(format!(
                "[COMPLETE] {}",
                u.content.as_deref().unwrap_or("Sequence complete.")
            ))),
            Agent::Error => Some(LiveLine::Progress(format!(
                "[ERROR] {}",
                u.content.as_deref().unwrap_or("Unspecified agent error")
            ))),
            Agent::Unknown(_) => None,
        },
        SessionEvent::TransportError { reason } => {
            Some(LiveLine::Diagnostic(format!("Signal lost: {reason}")))
        }
        SessionEvent::StreamClosed => Some(LiveLine::Diagnostic("Uplink closed.".into())),
        SessionEvent::SessionFinished { .. } => None,
    }
}

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished report.
pub(crate) fn build_text_summary(report: &SessionReport) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "Session {}: {}",
        short_id(&report.session_id),
        match report.outcome {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::Pending => "PENDING",
        }
    ));

    let strip: Vec<String> = report
        .stages
        .iter()
        .map(|s| {
            let mark = match s.state {
                StageState::Completed => "done",
                StageState::Active => "active",
                StageState::Dimmed => "-",
            };
            format!("{} [{}]", s.stage.label(), mark)
        })
        .collect();
    lines.push(format!("Stages: {}", strip.join(" > ")));

    if let Some(m) = report.metrics.as_ref() {
        lines.push(format!(
            "Market heat: {}%{}   ROI: {}%{}",
            m.heat.value,
            if m.heat.is_intense() { " (intense)" } else { "" },
            m.roi.value,
            if m.roi.is_intense() { " (intense)" } else { "" },
        ));
    }
    if let Some(v) = report.verdict.as_deref() {
        lines.push(format!("Verdict: {v}"));
    }
    if !report.tags.is_empty() {
        lines.push(format!("Tags: {}", report.tags.join(", ")));
    }
    if !report.files.is_empty() {
        lines.push(format!("Files ({}):", report.files.len()));
        for f in &report.files {
            lines.push(format!("  {f}"));
        }
    }
    if !report.code.is_empty() {
        lines.push(format!("Code preview: {} lines", report.code.lines().count()));
    }
    let errors = report
        .log
        .iter()
        .filter(|l| matches!(l.kind, LogKind::Error | LogKind::SignalLost))
        .count();
    lines.push(format!(
        "Frames: {} received, {} skipped, {} unknown, {} error(s)",
        report.frames_received, report.frames_skipped, report.unknown_tags, errors
    ));

    TextSummary { lines }
}
