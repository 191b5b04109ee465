//! Session lifecycle controller.
//!
//! Owns start/restart/quit orchestration and emits events for presentation layers.
//! A running session cannot be cancelled; a new one starts only after the current
//! stream has closed.

use crate::cli::{build_config, Cli};
use crate::engine::SessionEngine;
use crate::error::SessionError;
use crate::model::{InfoEvent, SessionEvent, SessionSummary};
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Commands emitted by UI layers to drive sessions.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Start(String),
    Restart,
    Quit,
}

/// Internal handle for a running session task.
struct SessionCtx {
    handle: Option<tokio::task::JoinHandle<Result<SessionSummary, SessionError>>>,
}

/// Spawn a new session and return its handle.
fn start_session(args: &Cli, idea: &str, event_tx: UnboundedSender<SessionEvent>) -> SessionCtx {
    let cfg = build_config(args, idea);
    let engine = SessionEngine::new(cfg);
    let handle = tokio::spawn(async move { engine.run(event_tx).await });
    SessionCtx {
        handle: Some(handle),
    }
}

fn info(event_tx: &UnboundedSender<SessionEvent>, msg: &str) {
    let _ = event_tx.send(SessionEvent::Info(InfoEvent::Message(msg.into())));
}

/// Orchestrate sessions based on UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    args: &Cli,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut last_idea = args
        .project_idea
        .clone()
        .filter(|idea| !idea.trim().is_empty());
    let mut session = match last_idea.as_deref() {
        Some(idea) if args.start_on_launch => Some(start_session(args, idea, event_tx.clone())),
        _ => None,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start(idea)) => {
                        if session.is_some() {
                            info(&event_tx, "A session is still streaming; wait for the uplink to close.");
                        } else {
                            session = Some(start_session(args, &idea, event_tx.clone()));
                            last_idea = Some(idea);
                        }
                    }
                    Some(UiCommand::Restart) => {
                        if session.is_some() {
                            info(&event_tx, "A session is still streaming; wait for the uplink to close.");
                        } else if let Some(idea) = last_idea.as_deref() {
                            session = Some(start_session(args, idea, event_tx.clone()));
                            info(&event_tx, "Restarting…");
                        } else {
                            info(&event_tx, "Enter a project idea first (press i).");
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Leaving the app is the only way to stop consuming a live stream.
                        if let Some(h) = session.as_mut().and_then(|ctx| ctx.handle.take()) {
                            debug!("aborting live session on quit");
                            h.abort();
                        }
                        return Ok(());
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut session {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    match join_res {
                        Ok(Ok(summary)) => {
                            let _ = event_tx.send(SessionEvent::SessionFinished {
                                summary: Box::new(summary),
                            });
                        }
                        Ok(Err(e)) if e.is_bootstrap() => {
                            info(&event_tx, "Session not started. Press r to retry.")
                        }
                        Ok(Err(e)) => info(&event_tx, &format!("Session failed: {e}")),
                        Err(e) => info(&event_tx, &format!("Session join failed: {e}")),
                    }
                    session = None;
                }
            }
        }
    }
}
