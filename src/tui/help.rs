use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("q / Ctrl-C", "Quit (drops a live stream)"),
        key_line("i", "Edit the project idea, Enter to launch, Esc to cancel"),
        key_line("r", "Rerun the last idea once the uplink has closed"),
        key_line("s", "Save the finished session to history"),
        key_line("m", "Export the finished session as a Markdown blueprint"),
        key_line("a", "Toggle auto-save"),
        key_line("tab", "Switch tabs"),
        key_line("?", "Show this help"),
        Line::from(""),
        Line::from("Blueprint tab:"),
        key_line("↑/↓ or j/k", "Scroll the code preview"),
        Line::from(""),
        Line::from("History tab:"),
        key_line("↑/↓ or j/k", "Navigate"),
        key_line("e", "Export selected as JSON"),
        key_line("m", "Export selected as Markdown blueprint"),
        key_line("y", "Copy exported path to clipboard"),
        key_line("d", "Delete selected"),
        key_line("r", "Refresh history"),
        Line::from(""),
        Line::from("Stages light up as agents report: Market Intelligence, Strategic Analyst,"),
        Line::from("Solution Architect. Gauges above 70% are marked intense. Exports unlock"),
        Line::from("once the uplink closes."),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
