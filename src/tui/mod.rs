mod export;
mod help;
mod panels;
mod state;

use crate::cli::{build_config, Cli};
use crate::model::{Outcome, SessionEvent, SessionReport, SessionSummary};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::{UiState, TAB_BLUEPRINT, TAB_COUNT, TAB_DASHBOARD, TAB_HELP, TAB_HISTORY};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&args, event_tx, cmd_rx).await;

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

/// What the loop should do after a key press.
enum KeyOutcome {
    Continue,
    Quit,
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let initial_load = terminal
        .size()
        .map(|size| ((size.height as usize).saturating_sub(2) * 3).max(20))
        .unwrap_or(66);

    let idea = args
        .project_idea
        .clone()
        .filter(|idea| !idea.trim().is_empty());
    let mut state = UiState {
        auto_save: args.auto_save,
        close_policy: build_config(&args, "").close_policy,
        editing: idea.is_none(),
        info: match (&idea, args.start_on_launch) {
            (None, _) => "Describe your project and press Enter.".into(),
            (Some(_), false) => "Press r to launch the analysis.".into(),
            (Some(_), true) => String::new(),
        },
        current_idea: idea,
        ..Default::default()
    };
    // UiState is owned by the UI thread only; no cross-thread mutation.
    state.initial_history_load_size = initial_load;
    state.history = crate::storage::load_recent(initial_load).unwrap_or_default();
    state.history_loaded_count = state.history.len();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain without blocking; every event is applied in arrival order.
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                SessionEvent::SessionFinished { summary } => {
                    handle_session_finished(&args, &mut state, *summary);
                }
                other => state.apply_event(&other),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let outcome = if state.editing {
                    handle_edit_key(&mut state, &cmd_tx, k)
                } else {
                    handle_key(&mut state, &cmd_tx, k)
                };
                if let KeyOutcome::Quit = outcome {
                    let _ = cmd_tx.send(UiCommand::Quit);
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

fn handle_edit_key(
    state: &mut UiState,
    cmd_tx: &UnboundedSender<UiCommand>,
    k: KeyEvent,
) -> KeyOutcome {
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => return KeyOutcome::Quit,
        (_, KeyCode::Esc) => {
            state.editing = false;
            state.input.clear();
        }
        (_, KeyCode::Enter) => {
            let idea = state.input.trim().to_string();
            if idea.is_empty() {
                state.info = "The project idea cannot be empty.".into();
            } else if state.session_running() {
                state.info = "A session is still streaming; wait for the uplink to close.".into();
            } else {
                let _ = cmd_tx.send(UiCommand::Start(idea.clone()));
                state.current_idea = Some(idea);
                state.editing = false;
                state.input.clear();
            }
        }
        (_, KeyCode::Backspace) => {
            state.input.pop();
        }
        (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => state.input.push(c),
        _ => {}
    }
    KeyOutcome::Continue
}

fn handle_key(
    state: &mut UiState,
    cmd_tx: &UnboundedSender<UiCommand>,
    k: KeyEvent,
) -> KeyOutcome {
    match (k.modifiers, k.code) {
        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            return KeyOutcome::Quit;
        }
        (_, KeyCode::Char('i')) => {
            state.tab = TAB_DASHBOARD;
            state.editing = true;
            state.input = state.current_idea.clone().unwrap_or_default();
        }
        (_, KeyCode::Char('r')) => {
            if state.tab == TAB_HISTORY {
                refresh_history(state);
            } else if state.session_running() {
                state.info = "A session is still streaming; wait for the uplink to close.".into();
            } else {
                state.info = "Restart requested…".into();
                let _ = cmd_tx.send(UiCommand::Restart);
            }
        }
        (_, KeyCode::Char('s')) => {
            if state.tab != TAB_HISTORY {
                if let Some(r) = state.last_report.clone() {
                    export::save_and_show_path(&r, state);
                } else {
                    state.info = "No finished session to save yet.".into();
                }
            }
        }
        (_, KeyCode::Char('m')) => {
            let report = if state.tab == TAB_HISTORY {
                state.history.get(state.history_selected).cloned()
            } else {
                state.last_report.clone()
            };
            match report {
                Some(r) => {
                    let res = export::export_report_markdown(&r);
                    export::show_export(state, "blueprint", res);
                }
                None => state.info = "Blueprint export unlocks once the uplink closes.".into(),
            }
        }
        (_, KeyCode::Char('e')) => {
            if state.tab == TAB_HISTORY {
                if let Some(r) = state.history.get(state.history_selected).cloned() {
                    let res = export::export_report_json(&r);
                    export::show_export(state, "JSON", res);
                }
            }
        }
        (_, KeyCode::Char('y')) => {
            if let Some(path) = state.last_exported_path.clone() {
                match export::copy_to_clipboard(&path) {
                    Ok(_) => {
                        let display_path = if path.chars().count() > 60 {
                            format!("{}...", path.chars().take(57).collect::<String>())
                        } else {
                            path
                        };
                        state.info = format!("✓ Copied to clipboard: {}", display_path);
                    }
                    Err(e) => {
                        state.info = format!("Clipboard copy failed: {e:#}");
                    }
                }
            } else {
                state.info = "No exported file path to copy. Export a file first (e/m)".into();
            }
        }
        (_, KeyCode::Char('a')) => {
            state.auto_save = !state.auto_save;
            state.info = if state.auto_save {
                "Auto-save enabled".into()
            } else {
                "Auto-save disabled".into()
            };
        }
        (_, KeyCode::Char('d')) => {
            if state.tab == TAB_HISTORY {
                delete_selected(state);
            }
        }
        (_, KeyCode::Tab) => {
            state.tab = (state.tab + 1) % TAB_COUNT;
            if state.tab == TAB_HISTORY {
                state.history_selected = 0;
                state.history_scroll_offset = 0;
            }
        }
        (_, KeyCode::BackTab) => {
            state.tab = (state.tab + TAB_COUNT - 1) % TAB_COUNT;
        }
        (_, KeyCode::Char('?')) => {
            state.tab = TAB_HELP;
        }
        (_, KeyCode::Up) | (_, KeyCode::Char('k')) => match state.tab {
            TAB_HISTORY => {
                if state.history_selected > 0 {
                    state.history_selected -= 1;
                    if state.history_selected < state.history_scroll_offset {
                        state.history_scroll_offset = state.history_selected;
                    }
                }
            }
            TAB_BLUEPRINT => state.code_scroll = state.code_scroll.saturating_sub(1),
            _ => {}
        },
        (_, KeyCode::Down) | (_, KeyCode::Char('j')) => match state.tab {
            TAB_HISTORY => select_next_history(state),
            TAB_BLUEPRINT => {
                let max = state.router.code().lines().count().saturating_sub(1);
                let max = u16::try_from(max).unwrap_or(u16::MAX);
                state.code_scroll = state.code_scroll.saturating_add(1).min(max);
            }
            _ => {}
        },
        _ => {}
    }
    KeyOutcome::Continue
}

fn refresh_history(state: &mut UiState) {
    let reload_size = state
        .initial_history_load_size
        .max(state.history_loaded_count);
    match crate::storage::load_recent(reload_size) {
        Ok(new_history) => {
            let old_count = state.history.len();
            state.history = new_history;
            state.history_loaded_count = state.history.len();
            state.clamp_history_selection();

            let new_count = state.history.len();
            state.info = if new_count > old_count {
                format!("Refreshed: {} new session(s)", new_count - old_count)
            } else if new_count < old_count {
                format!("Refreshed: {} session(s) removed", old_count - new_count)
            } else {
                "Refreshed".into()
            };
        }
        Err(e) => {
            state.info = format!("Refresh failed: {e:#}");
        }
    }
}

fn select_next_history(state: &mut UiState) {
    if state.history_selected + 1 >= state.history.len() {
        return;
    }
    state.history_selected += 1;
    let estimated_max_items = 30;
    if state.history_selected >= state.history_scroll_offset + estimated_max_items {
        state.history_scroll_offset = state
            .history_selected
            .saturating_sub(estimated_max_items - 1);
    }

    // Page in older sessions as the selection nears the end of what is loaded.
    let load_threshold = state.history_loaded_count.saturating_sub(10);
    if state.history_selected >= load_threshold
        && state.history_loaded_count == state.history.len()
    {
        let load_more = state.history.len() + state.history.len().max(20);
        if let Ok(more_history) = crate::storage::load_recent(load_more) {
            if more_history.len() > state.history.len() {
                state.history = more_history;
                state.history_loaded_count = state.history.len();
            }
        }
    }
}

fn delete_selected(state: &mut UiState) {
    let Some(to_delete) = state.history.get(state.history_selected).cloned() else {
        return;
    };
    if let Err(e) = crate::storage::delete_run(&to_delete) {
        state.info = format!("Delete failed: {e:#}");
    } else {
        state.history.remove(state.history_selected);
        state.history_loaded_count = state.history.len();
        state.clamp_history_selection();
        state.info = "Deleted".into();
    }
}

fn handle_session_finished(args: &Cli, state: &mut UiState, summary: SessionSummary) {
    let cfg = build_config(args, &summary.project_idea);
    let reload_size = (state.history_loaded_count + 1).max(state.initial_history_load_size);
    let processed = orchestrator::process_session_completion(
        args,
        &cfg,
        &state.router,
        &summary,
        reload_size,
        state.auto_save,
    );

    if let Some(path) = processed.auto_saved_path.as_ref() {
        state.info = format!("Saved: {}", path.display());
    }
    if !processed.export_messages.is_empty() {
        state.info = processed.export_messages.join("; ");
    }
    state.last_report = Some(processed.report);

    state.history = processed.history;
    state.history_loaded_count = state.history.len();
    if state.tab == TAB_HISTORY {
        state.history_selected = 0;
        state.history_scroll_offset = 0;
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Dashboard"),
        Line::from("Blueprint"),
        Line::from("History"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("wyronix"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_DASHBOARD => draw_dashboard(chunks[1], f, state),
        TAB_BLUEPRINT => panels::draw_blueprint(chunks[1], f, state),
        TAB_HISTORY => draw_history(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // prompt
                Constraint::Length(3), // island
                Constraint::Length(3), // stage strip
                Constraint::Min(6),    // feed + analysis
                Constraint::Length(6), // status
            ]
            .as_ref(),
        )
        .split(area);

    panels::draw_prompt(rows[0], f, state);
    panels::draw_island(rows[1], f, state);
    panels::draw_stage_strip(rows[2], f, state);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(rows[3]);
    let feed = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)].as_ref())
        .split(middle[0]);
    panels::draw_log(feed[0], f, state);
    panels::draw_tags(feed[1], f, state);
    panels::draw_metrics(middle[1], f, state);

    panels::draw_status(rows[4], f, state);
}

/// Render an RFC 3339 UTC timestamp in the local timezone, falling back to UTC.
fn format_local_timestamp(s: &str) -> String {
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;

    let Ok(utc) = time::OffsetDateTime::parse(s, &Rfc3339) else {
        return s.to_string();
    };
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    match time::UtcOffset::current_local_offset() {
        Ok(offset) => {
            let local = utc.to_offset(offset);
            let hours = offset.whole_hours();
            let minutes = offset.minutes_past_hour().abs();
            local
                .format(&fmt)
                .map(|t| format!("{t} {:+03}:{:02}", hours, minutes))
                .unwrap_or_else(|_| s.to_string())
        }
        Err(_) => utc
            .format(&fmt)
            .map(|t| format!("{t} UTC"))
            .unwrap_or_else(|_| s.to_string()),
    }
}

fn outcome_span(outcome: Outcome) -> Span<'static> {
    match outcome {
        Outcome::Success => Span::styled("SUCCESS", Style::default().fg(Color::Green)),
        Outcome::Failure => Span::styled("FAILURE", Style::default().fg(Color::Red)),
        Outcome::Pending => Span::styled("PENDING", Style::default().fg(Color::Yellow)),
    }
}

fn history_row(idx: usize, r: &SessionReport, selected: bool) -> Line<'static> {
    let style = if selected {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    let pick = |normal: Style| if selected { style } else { normal };

    let mut idea: String = r.project_idea.chars().take(40).collect();
    if r.project_idea.chars().count() > 40 {
        idea.push('…');
    }
    let outcome = outcome_span(r.outcome);

    Line::from(vec![
        Span::styled(format!("{:>2}. ", idx + 1), pick(Style::default().fg(Color::Gray))),
        Span::styled(if selected { "> " } else { "  " }, style),
        Span::styled(
            format_local_timestamp(&r.timestamp_utc),
            pick(Style::default().fg(Color::Gray)),
        ),
        Span::raw("  "),
        Span::styled(outcome.content.to_string(), pick(outcome.style)),
        Span::raw("  "),
        Span::styled(
            format!("{} files", r.files.len()),
            pick(Style::default().fg(Color::Cyan)),
        ),
        Span::raw("  "),
        Span::styled(idea, pick(Style::default())),
    ])
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();

    // Header, info and blank line take three rows plus the borders.
    let max_items = (area.height as usize).saturating_sub(5).max(1);

    let total_count = state.history.len();
    let current_pos = if total_count > 0 {
        state.history_selected + 1
    } else {
        0
    };

    lines.push(Line::from(vec![
        Span::raw(format!("Sessions ({}/{}) - ", current_pos, total_count)),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": navigate, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": refresh, "),
        Span::styled("d", Style::default().fg(Color::Magenta)),
        Span::raw(": delete, "),
        Span::styled("e", Style::default().fg(Color::Magenta)),
        Span::raw(": export JSON, "),
        Span::styled("m", Style::default().fg(Color::Magenta)),
        Span::raw(": export blueprint"),
    ]));

    let mut info_lines = Vec::new();
    state::push_wrapped_status_kv(&mut info_lines, "Info", &state.info, area.width);
    lines.extend(info_lines);
    lines.push(Line::from(""));

    // Keep the selected row visible even if the handler's estimate was off.
    let scroll_offset = {
        let mut offset = state
            .history_scroll_offset
            .min(state.history.len().saturating_sub(1));
        if state.history_selected < offset {
            offset = state.history_selected;
        } else if state.history_selected >= offset + max_items {
            offset = state.history_selected.saturating_sub(max_items - 1);
        }
        offset
    };

    for (display_idx, r) in state
        .history
        .iter()
        .skip(scroll_offset)
        .take(max_items)
        .enumerate()
    {
        let history_idx = scroll_offset + display_idx;
        lines.push(history_row(
            history_idx,
            r,
            history_idx == state.history_selected,
        ));
    }

    if state.history.is_empty() {
        lines.push(Line::from("No saved sessions yet."));
    }

    if let Some(ref path) = state.last_exported_path {
        lines.push(Line::from(""));
        let mut path_lines = Vec::new();
        state::push_wrapped_status_kv(&mut path_lines, "Last exported", path, area.width);
        lines.extend(path_lines);
        lines.push(Line::from(vec![
            Span::styled("Press ", Style::default().fg(Color::Gray)),
            Span::styled("y", Style::default().fg(Color::Magenta)),
            Span::styled(" to copy path to clipboard", Style::default().fg(Color::Gray)),
        ]));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("History"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn enter_launches_trimmed_idea() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState {
            editing: true,
            ..Default::default()
        };
        for c in " drone mapping ".chars() {
            handle_edit_key(&mut state, &tx, key(KeyCode::Char(c)));
        }
        handle_edit_key(&mut state, &tx, key(KeyCode::Enter));

        assert!(!state.editing);
        assert_eq!(state.current_idea.as_deref(), Some("drone mapping"));
        match rx.try_recv() {
            Ok(UiCommand::Start(idea)) => assert_eq!(idea, "drone mapping"),
            other => panic!("expected start command, got {other:?}"),
        }
    }

    #[test]
    fn blank_idea_is_not_sent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState {
            editing: true,
            ..Default::default()
        };
        handle_edit_key(&mut state, &tx, key(KeyCode::Enter));
        assert!(state.editing);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn blueprint_export_waits_for_a_finished_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        handle_key(&mut state, &tx, key(KeyCode::Char('m')));
        assert_eq!(state.info, "Blueprint export unlocks once the uplink closes.");
        assert!(state.last_exported_path.is_none());
    }

    #[test]
    fn tabs_cycle_both_ways() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = UiState::default();
        handle_key(&mut state, &tx, key(KeyCode::BackTab));
        assert_eq!(state.tab, TAB_HELP);
        handle_key(&mut state, &tx, key(KeyCode::Tab));
        assert_eq!(state.tab, TAB_DASHBOARD);
    }

    #[test]
    fn unparseable_timestamps_pass_through() {
        assert_eq!(format_local_timestamp("yesterday"), "yesterday");
        assert!(format_local_timestamp("2026-10-18T09:01:00Z").starts_with("2026-10-1"));
    }
}
