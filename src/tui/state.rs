use crate::model::{ClosePolicy, InfoEvent, LinkState, Outcome, SessionEvent, SessionReport};
use crate::router::{Route, UpdateRouter};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::time::Instant;

pub const TAB_DASHBOARD: usize = 0;
pub const TAB_BLUEPRINT: usize = 1;
pub const TAB_HISTORY: usize = 2;
pub const TAB_HELP: usize = 3;
pub const TAB_COUNT: usize = 4;

pub struct UiState {
    pub tab: usize,
    pub info: String,

    // Prompt editing
    pub input: String,
    pub editing: bool,
    pub current_idea: Option<String>,

    pub router: UpdateRouter,
    pub close_policy: ClosePolicy,
    pub session_start: Option<Instant>,
    pub last_route: Option<Route>,
    pub code_scroll: u16,

    pub last_report: Option<SessionReport>,
    pub history: Vec<SessionReport>,
    pub history_selected: usize, // 0 = most recent
    pub history_scroll_offset: usize,
    pub history_loaded_count: usize,
    pub initial_history_load_size: usize,
    pub auto_save: bool,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: TAB_DASHBOARD,
            info: String::new(),
            input: String::new(),
            editing: false,
            current_idea: None,
            router: UpdateRouter::default(),
            close_policy: ClosePolicy::Derived,
            session_start: None,
            last_route: None,
            code_scroll: 0,
            last_report: None,
            history: Vec::new(),
            history_selected: 0,
            history_scroll_offset: 0,
            history_loaded_count: 0,
            initial_history_load_size: 66,
            auto_save: true,
            last_exported_path: None,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = remaining.len().min(line_width as usize);
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

impl UiState {
    /// Feed one engine event into the dashboard. A new bootstrap starts a fresh router so
    /// nothing from the previous session leaks into the next one.
    pub fn apply_event(&mut self, ev: &SessionEvent) {
        if let SessionEvent::Info(InfoEvent::Bootstrapping { .. }) = ev {
            self.router = UpdateRouter::new(self.close_policy);
            self.session_start = Some(Instant::now());
            self.last_route = None;
            self.last_report = None;
            self.code_scroll = 0;
        }

        if let Some(route) = self.router.handle(ev) {
            self.last_route = Some(route);
        }

        match ev {
            SessionEvent::Info(info) => self.info = info.to_message(),
            SessionEvent::BootstrapFailed { reason } => {
                self.info = format!("Connection failed: {reason}. Press r to retry.")
            }
            SessionEvent::Connected { session_id, status } => {
                let short = crate::storage::short_id(session_id);
                self.info = match status.as_deref() {
                    Some(status) => format!("Session {short} live ({status})"),
                    None => format!("Session {short} live"),
                }
            }
            SessionEvent::TransportError { reason } => self.info = format!("Signal lost: {reason}"),
            SessionEvent::StreamClosed => {
                self.info = "Uplink closed. Press s to save or m to export the blueprint.".into()
            }
            SessionEvent::Update(_) | SessionEvent::SessionFinished { .. } => {}
        }
    }

    /// Headline text for the dynamic island.
    pub fn island_text(&self) -> (String, Color) {
        let r = &self.router;
        match (r.link(), r.outcome()) {
            (LinkState::Idle, _) => ("Awaiting a project idea".into(), Color::Gray),
            (LinkState::Connecting, _) => ("Establishing uplink…".into(), Color::Yellow),
            (LinkState::ConnectionFailed, _) => ("Connection failed".into(), Color::Red),
            (LinkState::Streaming, Outcome::Failure) => {
                ("Agent error, stream still open".into(), Color::Red)
            }
            (LinkState::Streaming, _) => match r.stages().active() {
                Some(stage) => (format!("{} working…", stage.label()), Color::Cyan),
                None if r.outcome() == Outcome::Success => {
                    ("Sequence complete".into(), Color::Green)
                }
                None => ("Uplink established".into(), Color::Cyan),
            },
            (LinkState::Closed, Outcome::Failure) => ("Session failed".into(), Color::Red),
            (LinkState::Closed, _) => ("Blueprint ready".into(), Color::Green),
        }
    }

    pub fn session_running(&self) -> bool {
        matches!(
            self.router.link(),
            LinkState::Connecting | LinkState::Streaming
        )
    }

    pub fn clamp_history_selection(&mut self) {
        if self.history.is_empty() {
            self.history_selected = 0;
            self.history_scroll_offset = 0;
            return;
        }
        if self.history_selected >= self.history.len() {
            self.history_selected = self.history.len() - 1;
        }
        if self.history_scroll_offset >= self.history.len() {
            self.history_scroll_offset = self.history.len().saturating_sub(20);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Stage, StageState, UpdateEvent};

    fn bootstrapping() -> SessionEvent {
        SessionEvent::Info(InfoEvent::Bootstrapping {
            base_url: "http://127.0.0.1:8000".into(),
        })
    }

    #[test]
    fn new_bootstrap_resets_previous_session() {
        let mut state = UiState::default();
        state.apply_event(&bootstrapping());
        state.apply_event(&SessionEvent::Connected {
            session_id: "first".into(),
            status: Some("active".into()),
        });
        assert_eq!(state.info, "Session first live (active)");
        state.apply_event(&SessionEvent::Update(
            UpdateEvent::new(Agent::Search).with_content("old"),
        ));
        state.apply_event(&SessionEvent::StreamClosed);
        assert!(!state.session_running());

        state.apply_event(&bootstrapping());
        assert!(state.router.log().is_empty());
        assert_eq!(state.router.stages().state(Stage::Search), StageState::Dimmed);
        assert!(state.session_running());
        assert_eq!(state.island_text().0, "Establishing uplink…");
    }

    #[test]
    fn island_follows_active_stage_and_errors() {
        let mut state = UiState::default();
        state.apply_event(&bootstrapping());
        state.apply_event(&SessionEvent::Connected {
            session_id: "s".into(),
            status: None,
        });
        assert_eq!(state.info, "Session s live");
        state.apply_event(&SessionEvent::Update(UpdateEvent::new(Agent::Analyst)));
        assert_eq!(state.island_text().0, "Strategic Analyst working…");
        assert_eq!(state.last_route, Some(Route::Analyst));

        state.apply_event(&SessionEvent::Update(
            UpdateEvent::new(Agent::Error).with_content("quota"),
        ));
        assert_eq!(state.island_text().1, Color::Red);
        state.apply_event(&SessionEvent::StreamClosed);
        assert_eq!(state.island_text().0, "Session failed");
    }

    #[test]
    fn wrapping_a_64k_message_terminates() {
        let prefix = "Connection failed: gateway rejected the request (400): ";
        let value = format!("{prefix}{}", "x".repeat(65536 - prefix.len()));
        assert_eq!(value.chars().count(), 65536);

        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Info", &value, 80);

        let wrapped: usize = out
            .iter()
            .filter_map(|l| l.spans.last())
            .map(|s| s.content.chars().count())
            .sum();
        assert_eq!(wrapped, 65536);
        assert!(out.len() > 1);
    }

    #[test]
    fn history_selection_is_clamped() {
        let mut state = UiState {
            history_selected: 5,
            history_scroll_offset: 5,
            ..Default::default()
        };
        state.clamp_history_selection();
        assert_eq!((state.history_selected, state.history_scroll_offset), (0, 0));
    }
}
