//! Update routing.
//!
//! Maps every update frame of one session onto the display region its `agent` tag
//! implies and keeps the stage strip consistent: at most one stage is active, and a
//! completed stage is never re-activated. One router is built per session and owned by
//! a single consumer (TUI thread or text/JSON loop).

use crate::metrics::MetricsPanel;
use crate::model::{
    Agent, ClosePolicy, InfoEvent, LinkState, LogKind, LogLine, Outcome, SessionEvent, Stage,
    StageSnapshot, StageState, UpdateEvent,
};
use tracing::debug;

/// Highlight state for the three pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageBoard {
    states: [StageState; 3],
}

impl StageBoard {
    pub fn state(&self, stage: Stage) -> StageState {
        self.states[stage.index()]
    }

    pub fn active(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|s| self.state(*s) == StageState::Active)
    }

    /// Make `stage` the active one. Every earlier stage that is not yet completed is
    /// completed first; a stage that already completed stays completed.
    pub fn activate(&mut self, stage: Stage) -> bool {
        if self.state(stage) == StageState::Completed {
            return false;
        }
        for earlier in &mut self.states[..stage.index()] {
            *earlier = StageState::Completed;
        }
        self.states[stage.index()] = StageState::Active;
        true
    }

    pub fn complete_active(&mut self) -> Option<Stage> {
        let stage = self.active()?;
        self.states[stage.index()] = StageState::Completed;
        Some(stage)
    }

    pub fn snapshot(&self) -> Vec<StageSnapshot> {
        Stage::ALL
            .into_iter()
            .map(|stage| StageSnapshot {
                stage,
                state: self.state(stage),
            })
            .collect()
    }
}

/// Region touched by one routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Search,
    Analyst,
    Dev,
    Complete,
    Error,
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRouter {
    policy: ClosePolicy,
    session_id: Option<String>,
    link: LinkState,
    outcome: Outcome,
    stages: StageBoard,
    log: Vec<LogLine>,
    tags: Vec<String>,
    metrics: Option<MetricsPanel>,
    verdict: Option<String>,
    files: Vec<String>,
    code: String,
    export_enabled: bool,
    unknown_tags: u64,
}

impl UpdateRouter {
    pub fn new(policy: ClosePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Route any engine event. Returns the region for tagged updates.
    pub fn handle(&mut self, ev: &SessionEvent) -> Option<Route> {
        match ev {
            SessionEvent::Info(InfoEvent::Bootstrapping { .. }) => {
                self.on_bootstrap_started();
                None
            }
            SessionEvent::Info(_) | SessionEvent::SessionFinished { .. } => None,
            SessionEvent::BootstrapFailed { reason } => {
                self.on_bootstrap_failed(reason);
                None
            }
            SessionEvent::Connected { session_id, .. } => {
                self.on_connected(session_id);
                None
            }
            SessionEvent::Update(update) => Some(self.apply(update)),
            SessionEvent::TransportError { reason } => {
                self.on_transport_error(reason);
                None
            }
            SessionEvent::StreamClosed => {
                self.on_stream_closed();
                None
            }
        }
    }

    pub fn apply(&mut self, ev: &UpdateEvent) -> Route {
        match &ev.agent {
            Agent::Search => {
                self.stages.activate(Stage::Search);
                if let Some(content) = ev.content.as_deref() {
                    self.push_log(LogKind::Search, content);
                }
                if let Some(tag) = ev.tag_value() {
                    self.tags.push(tag.to_string());
                }
                Route::Search
            }
            Agent::Analyst => {
                self.stages.activate(Stage::Analyst);
                if let Some(m) = ev.metrics.as_ref() {
                    self.metrics = Some(MetricsPanel::from_readings(m.heat, m.roi));
                }
                if let Some(verdict) = ev.verdict_value() {
                    self.verdict = Some(verdict.to_string());
                }
                if let Some(content) = ev.content.as_deref() {
                    self.push_log(LogKind::Analyst, content);
                }
                Route::Analyst
            }
            Agent::Dev => {
                self.stages.activate(Stage::Dev);
                if let Some(file) = ev.file.as_deref() {
                    self.files.push(file.to_string());
                }
                if let Some(code) = ev.code.as_deref() {
                    self.code.push_str(code);
                }
                Route::Dev
            }
            Agent::Complete => {
                self.stages.complete_active();
                self.outcome = Outcome::Success;
                self.export_enabled = true;
                Route::Complete
            }
            Agent::Error => {
                let text = ev.content.as_deref().unwrap_or("Unspecified agent error");
                self.push_log(LogKind::Error, text);
                self.outcome = Outcome::Failure;
                Route::Error
            }
            Agent::Unknown(tag) => {
                debug!(tag = %tag, "ignoring update with unknown agent tag");
                self.unknown_tags += 1;
                Route::Ignored
            }
        }
    }

    pub fn on_bootstrap_started(&mut self) {
        self.link = LinkState::Connecting;
    }

    pub fn on_connected(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());
        self.link = LinkState::Streaming;
    }

    pub fn on_bootstrap_failed(&mut self, reason: &str) {
        self.link = LinkState::ConnectionFailed;
        self.outcome = Outcome::Failure;
        self.push_log(LogKind::Error, &format!("Connection failed: {reason}"));
    }

    pub fn on_transport_error(&mut self, reason: &str) {
        self.outcome = Outcome::Failure;
        self.push_log(LogKind::SignalLost, &format!("Signal lost: {reason}"));
    }

    pub fn on_stream_closed(&mut self) {
        self.link = LinkState::Closed;
        self.export_enabled = true;
        match self.policy {
            ClosePolicy::AlwaysSuccess => self.outcome = Outcome::Success,
            ClosePolicy::Derived => {
                if self.outcome != Outcome::Failure {
                    self.outcome = Outcome::Success;
                }
            }
        }
        self.push_log(LogKind::System, "Uplink closed.");
    }

    fn push_log(&mut self, kind: LogKind, text: &str) {
        self.log.push(LogLine {
            kind,
            text: text.to_string(),
        });
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn stages(&self) -> &StageBoard {
        &self.stages
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metrics(&self) -> Option<&MetricsPanel> {
        self.metrics.as_ref()
    }

    pub fn verdict(&self) -> Option<&str> {
        self.verdict.as_deref()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn export_enabled(&self) -> bool {
        self.export_enabled
    }

    pub fn unknown_tags(&self) -> u64 {
        self.unknown_tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnalystMetrics;

    fn analyst(heat: Option<f64>, roi: Option<f64>) -> UpdateEvent {
        let mut ev = UpdateEvent::new(Agent::Analyst);
        ev.metrics = Some(AnalystMetrics {
            heat,
            roi,
            verdict: None,
        });
        ev
    }

    fn dev_code(code: &str) -> UpdateEvent {
        let mut ev = UpdateEvent::new(Agent::Dev);
        ev.code = Some(code.into());
        ev
    }

    fn active_count(r: &UpdateRouter) -> usize {
        Stage::ALL
            .into_iter()
            .filter(|s| r.stages().state(*s) == StageState::Active)
            .count()
    }

    #[test]
    fn search_analyst_complete_walkthrough() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Search).with_content("scanning"));
        r.apply(&analyst(Some(80.0), Some(40.0)));
        r.apply(&UpdateEvent::new(Agent::Complete));

        assert_eq!(r.log()[0].text, "scanning");
        let m = r.metrics().unwrap();
        assert_eq!(m.heat.display_percent(), 80);
        assert!(m.heat.is_intense());
        assert_eq!(m.roi.display_percent(), 40);
        assert!(!m.roi.is_intense());

        assert_eq!(r.stages().state(Stage::Search), StageState::Completed);
        assert_eq!(r.stages().state(Stage::Analyst), StageState::Completed);
        assert_eq!(r.stages().state(Stage::Dev), StageState::Dimmed);
        assert_eq!(r.outcome(), Outcome::Success);
        assert!(r.export_enabled());
    }

    fn rank(s: StageState) -> u8 {
        match s {
            StageState::Dimmed => 0,
            StageState::Active => 1,
            StageState::Completed => 2,
        }
    }

    #[test]
    fn stage_invariants_hold_for_all_short_sequences() {
        let kinds = [
            Agent::Search,
            Agent::Analyst,
            Agent::Dev,
            Agent::Complete,
            Agent::Error,
            Agent::Unknown("PING".into()),
        ];
        let mut checked = 0;
        for len in 0..=4u32 {
            for n in 0..kinds.len().pow(len) {
                let mut r = UpdateRouter::new(ClosePolicy::Derived);
                let mut code = n;
                let mut seq = Vec::new();
                for _ in 0..len {
                    let agent = kinds[code % kinds.len()].clone();
                    code /= kinds.len();
                    seq.push(agent.clone());

                    let before = r.stages().snapshot();
                    r.apply(&UpdateEvent::new(agent));
                    assert!(active_count(&r) <= 1, "two active stages after {seq:?}");
                    for (prev, now) in before.iter().zip(r.stages().snapshot()) {
                        assert!(
                            rank(now.state) >= rank(prev.state),
                            "{:?} went from {:?} to {:?} after {seq:?}",
                            prev.stage,
                            prev.state,
                            now.state
                        );
                    }
                }
                checked += 1;
            }
        }
        assert_eq!(checked, 1 + 6 + 36 + 216 + 1296);
    }

    #[test]
    fn at_most_one_stage_active_for_every_prefix() {
        let seq = [
            Agent::Dev,
            Agent::Search,
            Agent::Analyst,
            Agent::Search,
            Agent::Error,
            Agent::Dev,
            Agent::Unknown("X".into()),
            Agent::Analyst,
            Agent::Complete,
            Agent::Search,
            Agent::Dev,
        ];
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        for agent in seq {
            r.apply(&UpdateEvent::new(agent));
            assert!(active_count(&r) <= 1);
        }
    }

    #[test]
    fn completed_stage_never_reactivates() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Search));
        r.apply(&UpdateEvent::new(Agent::Analyst));
        assert_eq!(r.stages().state(Stage::Search), StageState::Completed);

        r.apply(&UpdateEvent::new(Agent::Search).with_content("late chunk"));
        assert_eq!(r.stages().state(Stage::Search), StageState::Completed);
        assert_eq!(r.stages().active(), Some(Stage::Analyst));
        // content is still routed to the log
        assert_eq!(r.log().last().unwrap().text, "late chunk");
    }

    #[test]
    fn dev_jumps_ahead_and_completes_earlier_stages() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Search));
        r.apply(&UpdateEvent::new(Agent::Dev));
        assert_eq!(r.stages().state(Stage::Search), StageState::Completed);
        assert_eq!(r.stages().state(Stage::Analyst), StageState::Completed);
        assert_eq!(r.stages().active(), Some(Stage::Dev));
    }

    #[test]
    fn missing_metrics_default_to_zero() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&analyst(None, Some(71.0)));
        let m = r.metrics().unwrap();
        assert_eq!(m.heat.value, 0.0);
        assert!(!m.heat.is_intense());
        assert!(m.roi.is_intense());
    }

    #[test]
    fn analyst_without_metrics_keeps_panel_hidden() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Analyst).with_content("thinking"));
        assert!(r.metrics().is_none());
        assert_eq!(r.log()[0].kind, LogKind::Analyst);
    }

    #[test]
    fn verdict_is_revealed_from_metrics_or_top_level() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        let mut ev = analyst(Some(10.0), Some(10.0));
        ev.metrics.as_mut().unwrap().verdict = Some("Proceed".into());
        r.apply(&ev);
        assert_eq!(r.verdict(), Some("Proceed"));

        let mut ev = UpdateEvent::new(Agent::Analyst);
        ev.verdict = Some("Pivot".into());
        r.apply(&ev);
        assert_eq!(r.verdict(), Some("Pivot"));
    }

    #[test]
    fn code_accumulates_and_files_append() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        let mut file = UpdateEvent::new(Agent::Dev);
        file.file = Some("src/main.rs".into());
        r.apply(&file);
        r.apply(&dev_code("fn main() {\n"));
        r.apply(&dev_code("}\n"));
        assert_eq!(r.files(), ["src/main.rs".to_string()]);
        assert_eq!(r.code(), "fn main() {\n}\n");
    }

    #[test]
    fn duplicate_tags_are_kept() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        for _ in 0..2 {
            let mut ev = UpdateEvent::new(Agent::Search);
            ev.data = Some(serde_json::json!({ "tag": "saas" }));
            r.apply(&ev);
        }
        assert_eq!(r.tags(), ["saas".to_string(), "saas".to_string()]);
    }

    #[test]
    fn error_reports_inline_without_closing() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.on_connected("abc");
        let route = r.apply(&UpdateEvent::new(Agent::Error).with_content("quota exceeded"));
        assert_eq!(route, Route::Error);
        assert_eq!(r.outcome(), Outcome::Failure);
        assert_eq!(r.link(), LinkState::Streaming);
        assert!(!r.export_enabled());
        assert_eq!(r.log()[0].kind, LogKind::Error);
    }

    #[test]
    fn unknown_tag_is_a_noop() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        let route = r.apply(&UpdateEvent::new(Agent::Unknown("CRITIC".into())).with_content("x"));
        assert_eq!(route, Route::Ignored);
        assert!(r.log().is_empty());
        assert_eq!(r.stages(), &StageBoard::default());
        assert_eq!(r.outcome(), Outcome::Pending);
        assert_eq!(r.unknown_tags(), 1);
    }

    #[test]
    fn close_after_error_keeps_failure_when_derived() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Error));
        r.on_stream_closed();
        assert_eq!(r.outcome(), Outcome::Failure);
        assert!(r.export_enabled());
    }

    #[test]
    fn close_after_error_signals_success_with_legacy_policy() {
        let mut r = UpdateRouter::new(ClosePolicy::AlwaysSuccess);
        r.apply(&UpdateEvent::new(Agent::Error));
        r.on_stream_closed();
        assert_eq!(r.outcome(), Outcome::Success);
        assert!(r.export_enabled());
    }

    #[test]
    fn complete_after_error_recovers_success() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.apply(&UpdateEvent::new(Agent::Error));
        r.apply(&UpdateEvent::new(Agent::Complete));
        r.on_stream_closed();
        assert_eq!(r.outcome(), Outcome::Success);
    }

    #[test]
    fn bare_close_signals_success() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.handle(&SessionEvent::Connected {
            session_id: "s-1".into(),
            status: None,
        });
        r.handle(&SessionEvent::StreamClosed);
        assert_eq!(r.session_id(), Some("s-1"));
        assert_eq!(r.link(), LinkState::Closed);
        assert_eq!(r.outcome(), Outcome::Success);
    }

    #[test]
    fn transport_error_logs_signal_lost() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.handle(&SessionEvent::TransportError {
            reason: "connection reset".into(),
        });
        r.handle(&SessionEvent::StreamClosed);
        assert_eq!(r.log()[0].kind, LogKind::SignalLost);
        assert!(r.log()[0].text.contains("connection reset"));
        assert_eq!(r.outcome(), Outcome::Failure);
    }

    #[test]
    fn bootstrap_failure_is_terminal() {
        let mut r = UpdateRouter::new(ClosePolicy::Derived);
        r.on_bootstrap_started();
        r.handle(&SessionEvent::BootstrapFailed {
            reason: "503".into(),
        });
        assert_eq!(r.link(), LinkState::ConnectionFailed);
        assert_eq!(r.outcome(), Outcome::Failure);
        assert!(!r.export_enabled());
    }
}
