use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};

use super::state::UiState;
use crate::metrics;
use crate::model::{LinkState, LogKind, Stage, StageState};
use crate::router::Route;

fn stage_style(s: StageState) -> Style {
    match s {
        StageState::Dimmed => Style::default().fg(Color::DarkGray),
        StageState::Active => Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
        StageState::Completed => Style::default().fg(Color::Green),
    }
}

fn log_color(kind: LogKind) -> Color {
    match kind {
        LogKind::Search => Color::White,
        LogKind::Analyst => Color::Cyan,
        LogKind::Error => Color::Red,
        LogKind::SignalLost => Color::LightRed,
        LogKind::System => Color::Gray,
    }
}

/// The status pill above the stage strip.
pub fn draw_island(area: Rect, f: &mut Frame, state: &UiState) {
    let (text, color) = state.island_text();
    let mut spans = vec![Span::styled(
        format!(" ● {text} "),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(t0) = state.session_start.filter(|_| state.session_running()) {
        spans.push(Span::styled(
            format!(" {}s", t0.elapsed().as_secs()),
            Style::default().fg(Color::DarkGray),
        ));
    }
    let p = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)));
    f.render_widget(p, area);
}

pub fn draw_stage_strip(area: Rect, f: &mut Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3); 3])
        .split(area);

    for (i, stage) in Stage::ALL.into_iter().enumerate() {
        let s = state.router.stages().state(stage);
        let mark = match s {
            StageState::Dimmed => "○",
            StageState::Active => "◉",
            StageState::Completed => "✓",
        };
        let p = Paragraph::new(Line::from(Span::styled(
            format!("{mark} {}", stage.label()),
            stage_style(s),
        )))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(stage_style(s)));
        f.render_widget(p, cols[i]);
    }
}

pub fn draw_log(area: Rect, f: &mut Frame, state: &UiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let log = state.router.log();
    let lines: Vec<Line> = log
        .iter()
        .skip(log.len().saturating_sub(visible))
        .map(|l| {
            Line::from(Span::styled(
                l.text.as_str(),
                Style::default().fg(log_color(l.kind)),
            ))
        })
        .collect();

    let title = if matches!(state.last_route, Some(Route::Search | Route::Analyst)) {
        Span::styled("Intel Feed", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("Intel Feed")
    };
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

pub fn draw_tags(area: Rect, f: &mut Frame, state: &UiState) {
    let spans: Vec<Span> = state
        .router
        .tags()
        .iter()
        .flat_map(|t| {
            [
                Span::styled(format!("#{t}"), Style::default().fg(Color::Magenta)),
                Span::raw(" "),
            ]
        })
        .collect();
    let p = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Tags"));
    f.render_widget(p, area);
}

fn gauge_widget<'a>(title: &'a str, g: &metrics::Gauge) -> Gauge<'a> {
    let color = if g.is_intense() { Color::Red } else { Color::Green };
    let label = if g.is_intense() {
        format!("{}% INTENSE", g.value)
    } else {
        format!("{}%", g.value)
    };
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(color))
        .percent(g.display_percent())
        .label(label)
}

/// Heat and ROI gauges plus the verdict. Hidden until an analyst update reveals them.
pub fn draw_metrics(area: Rect, f: &mut Frame, state: &UiState) {
    let Some(panel) = state.router.metrics() else {
        let p = Paragraph::new("Awaiting strategic analysis...")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Strategic Analysis"));
        f.render_widget(p, area);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);
    f.render_widget(gauge_widget("Market Heat", &panel.heat), rows[0]);
    f.render_widget(gauge_widget("ROI Viability", &panel.roi), rows[1]);

    let verdict = Paragraph::new(state.router.verdict().unwrap_or("-"))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Verdict"));
    f.render_widget(verdict, rows[2]);
}

/// Session facts and the rolling info message.
pub fn draw_status(area: Rect, f: &mut Frame, state: &UiState) {
    let r = &state.router;
    let link = match r.link() {
        LinkState::Idle => "idle",
        LinkState::Connecting => "connecting",
        LinkState::Streaming => "streaming",
        LinkState::Closed => "closed",
        LinkState::ConnectionFailed => "connection failed",
    };
    let mut lines = vec![Line::from(vec![
        Span::styled("Uplink: ", Style::default().fg(Color::Gray)),
        Span::raw(link),
        Span::raw("   "),
        Span::styled("Session: ", Style::default().fg(Color::Gray)),
        Span::raw(r.session_id().map(crate::storage::short_id).unwrap_or("-")),
        Span::raw("   "),
        Span::styled("Files: ", Style::default().fg(Color::Gray)),
        Span::raw(r.files().len().to_string()),
        Span::raw("   "),
        Span::styled("Auto-save: ", Style::default().fg(Color::Gray)),
        Span::raw(if state.auto_save { "on" } else { "off" }),
    ])];

    let mut info_lines = Vec::new();
    super::state::push_wrapped_status_kv(&mut info_lines, "Info", &state.info, area.width);
    lines.extend(info_lines);
    lines.push(Line::from(
        "Keys: i idea | r rerun | s save | m blueprint | tab switch | ? help | q quit",
    ));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

/// Prompt line for the project idea.
pub fn draw_prompt(area: Rect, f: &mut Frame, state: &UiState) {
    let (text, style) = if state.editing {
        (
            format!("{}▏", state.input),
            Style::default().fg(Color::Yellow),
        )
    } else if let Some(idea) = state.current_idea.as_deref() {
        (idea.to_string(), Style::default())
    } else {
        (
            "Press i to describe your project".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    };
    let p = Paragraph::new(Span::styled(text, style)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Project Idea")
            .border_style(if state.editing {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            }),
    );
    f.render_widget(p, area);
}

/// File tree on the left, accumulated code on the right.
pub fn draw_blueprint(area: Rect, f: &mut Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let files: Vec<Line> = if state.router.files().is_empty() {
        vec![Line::from(Span::styled(
            "No files yet",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state
            .router
            .files()
            .iter()
            .map(|f| Line::from(format!("+ {f}")))
            .collect()
    };
    let file_title = if state.last_route == Some(Route::Dev) {
        Span::styled("File Tree", Style::default().fg(Color::Yellow))
    } else {
        Span::raw("File Tree")
    };
    f.render_widget(
        Paragraph::new(files).block(Block::default().borders(Borders::ALL).title(file_title)),
        cols[0],
    );

    let code = state.router.code();
    let body = if code.is_empty() {
        Paragraph::new(Span::styled(
            "Code preview appears once the architect starts writing",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Paragraph::new(code).scroll((state.code_scroll, 0))
    };
    let title = format!("Code Preview ({} lines)", code.lines().count());
    f.render_widget(
        body.block(Block::default().borders(Borders::ALL).title(title)),
        cols[1],
    );
}
