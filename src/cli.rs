use crate::engine::SessionEngine;
use crate::error::SessionError;
use crate::model::{
    ClosePolicy, Outcome, SessionConfig, SessionEvent, SessionReport, SessionSummary,
};
use crate::orchestrator;
use crate::router::UpdateRouter;
use crate::text_summary::{self, LiveLine};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

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
    name = "wyronix",
    version,
    about = "Terminal client for the Wyronix project analysis gateway"
)]
pub struct Cli {
    /// Free-text description of the project to analyse
    #[arg(value_name = "IDEA")]
    pub project_idea: Option<String>,

    /// Base URL of the gateway
    #[arg(long, env = "WYRONIX_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Base URL for the update stream (defaults to the gateway URL with a ws scheme)
    #[arg(long)]
    pub stream_url: Option<String>,

    /// License key sent with the session bootstrap
    #[arg(long, env = "WYRONIX_LICENSE_KEY", hide_env_values = true)]
    pub license_key: Option<String>,

    /// Timeout for the session bootstrap request (the stream itself has none)
    #[arg(long, default_value = "10s")]
    pub connect_timeout: humantime::Duration,

    /// Print the session report as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print live updates and a text summary, then exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for scripting)
    #[arg(long)]
    pub silent: bool,

    /// Query the gateway health endpoint and exit
    #[arg(long)]
    pub health: bool,

    /// Export the session report as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Export the session blueprint as Markdown
    #[arg(long)]
    pub export_markdown: Option<std::path::PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Treat every stream close as success, even right after an ERROR update
    #[arg(long)]
    pub close_means_success: bool,

    /// Start a session immediately when an idea is given on the command line
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub start_on_launch: bool,
}

impl Cli {
    pub fn uses_tui(&self) -> bool {
        !(self.silent || self.json || self.text || self.health)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    if args.health {
        return run_health(args).await;
    }

    if args.uses_tui() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_json(args).await;
    }

    run_text(args).await
}

/// Build a `SessionConfig` from CLI arguments.
pub fn build_config(args: &Cli, project_idea: &str) -> SessionConfig {
    SessionConfig {
        base_url: args.base_url.clone(),
        stream_url: args.stream_url.clone(),
        project_idea: project_idea.to_string(),
        license_key: args.license_key.clone(),
        connect_timeout: Duration::from(args.connect_timeout),
        close_policy: if args.close_means_success {
            ClosePolicy::AlwaysSuccess
        } else {
            ClosePolicy::Derived
        },
        user_agent: format!("wyronix-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

fn require_idea(args: &Cli) -> Result<&str> {
    args.project_idea
        .as_deref()
        .map(str::trim)
        .filter(|idea| !idea.is_empty())
        .context("a project idea is required outside the TUI, e.g. `wyronix --text \"my idea\"`")
}

/// Run one session to completion, feeding every event to `on_event` after routing it.
async fn drive_session(
    cfg: SessionConfig,
    mut on_event: impl FnMut(&SessionEvent),
) -> Result<(UpdateRouter, SessionSummary)> {
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let mut router = UpdateRouter::new(cfg.close_policy);
    let engine = SessionEngine::new(cfg);
    let handle = tokio::spawn(async move { engine.run(evt_tx).await });

    while let Some(ev) = evt_rx.recv().await {
        router.handle(&ev);
        on_event(&ev);
    }

    let summary = match handle.await.context("session task failed")? {
        Ok(summary) => summary,
        Err(e) if e.is_bootstrap() => {
            return Err(anyhow::Error::new(e).context("session bootstrap failed"))
        }
        Err(e) => return Err(e.into()),
    };
    Ok((router, summary))
}

/// Exit error for a session whose outcome is failure.
fn failure_error(report: &SessionReport) -> anyhow::Error {
    match report.transport_error.clone() {
        Some(reason) => anyhow::Error::new(SessionError::Transport(reason))
            .context("session ended in failure state"),
        None => anyhow::anyhow!("session ended in failure state"),
    }
}

async fn run_health(args: Cli) -> Result<()> {
    let cfg = build_config(&args, "");
    let health = crate::engine::check_health(&cfg)
        .await
        .context("health check failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("Gateway: {}", health.status);
        println!("Security: {}", health.security.as_deref().unwrap_or("-"));
        println!("Model backend: {}", health.gemini.as_deref().unwrap_or("-"));
        println!("Runtime: {}", health.python_version.as_deref().unwrap_or("-"));
    }
    Ok(())
}

async fn run_json(args: Cli) -> Result<()> {
    let idea = require_idea(&args)?;
    let cfg = build_config(&args, idea);
    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    let (router, summary) = drive_session(cfg.clone(), |_| {}).await?;
    let processed =
        orchestrator::process_session_completion(&args, &cfg, &router, &summary, 0, args.auto_save);

    if let Some(tx) = out_tx.as_ref() {
        let out = serde_json::to_string_pretty(&processed.report)?;
        let _ = tx.send(OutputLine::Stdout(out));
        for msg in &processed.export_messages {
            let _ = tx.send(OutputLine::Stderr(msg.clone()));
        }
        if let Some(p) = processed.auto_saved_path.as_ref() {
            let _ = tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
        }
    }

    if let Some(tx) = out_tx {
        drop(tx);
    }
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    if processed.report.outcome == Outcome::Failure {
        return Err(failure_error(&processed.report));
    }
    Ok(())
}

async fn run_text(args: Cli) -> Result<()> {
    let idea = require_idea(&args)?;
    let cfg = build_config(&args, idea);
    let (out_tx, out_handle) = spawn_output_writer();

    let live_tx = out_tx.clone();
    let driven = drive_session(cfg.clone(), move |ev| match text_summary::live_line(ev) {
        Some(LiveLine::Progress(s)) => {
            let _ = live_tx.send(OutputLine::Stdout(s));
        }
        Some(LiveLine::Diagnostic(s)) => {
            let _ = live_tx.send(OutputLine::Stderr(s));
        }
        None => {}
    })
    .await;
    let (router, summary) = match driven {
        Ok(v) => v,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    let processed =
        orchestrator::process_session_completion(&args, &cfg, &router, &summary, 0, args.auto_save);
    let summary = text_summary::build_text_summary(&processed.report);
    let _ = out_tx.send(OutputLine::Stdout(String::new()));
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    for msg in &processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
    }
    if let Some(p) = processed.auto_saved_path.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    drop(out_tx);
    let _ = out_handle.await;

    if processed.report.outcome == Outcome::Failure {
        return Err(failure_error(&processed.report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tui_with_derived_close() {
        let args = Cli::parse_from(["wyronix", "robotic lawn care"]);
        assert!(args.uses_tui());
        let cfg = build_config(&args, "robotic lawn care");
        assert_eq!(cfg.close_policy, ClosePolicy::Derived);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert!(cfg.user_agent.starts_with("wyronix-cli/"));
    }

    #[test]
    fn legacy_close_flag_switches_policy() {
        let args = Cli::parse_from(["wyronix", "--text", "--close-means-success", "x"]);
        assert!(!args.uses_tui());
        assert_eq!(
            build_config(&args, "x").close_policy,
            ClosePolicy::AlwaysSuccess
        );
    }

    #[test]
    fn blank_idea_is_rejected_outside_tui() {
        let args = Cli::parse_from(["wyronix", "--json", "   "]);
        assert!(require_idea(&args).is_err());
        let args = Cli::parse_from(["wyronix", "--json", " idea "]);
        assert_eq!(require_idea(&args).unwrap(), "idea");
    }

    #[test]
    fn transport_failure_keeps_its_cause() {
        let report: SessionReport = serde_json::from_value(serde_json::json!({
            "session_id": "s-1",
            "project_idea": "x",
            "base_url": "http://127.0.0.1:8000",
            "outcome": "Failure",
            "stages": [],
            "frames_received": 1,
            "frames_skipped": 0,
            "unknown_tags": 0,
            "transport_error": "connection reset"
        }))
        .unwrap();
        let err = failure_error(&report);
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::Transport(reason)) if reason == "connection reset"
        ));
    }

    #[tokio::test]
    async fn silent_requires_json() {
        let args = Cli::parse_from(["wyronix", "--silent", "x"]);
        assert!(run(args).await.is_err());
    }
}
