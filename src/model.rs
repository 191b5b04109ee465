use crate::metrics::MetricsPanel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    pub project_idea: String,
    // Never persisted alongside saved reports.
    #[serde(skip)]
    pub license_key: Option<String>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub close_policy: ClosePolicy,
    pub user_agent: String,
}

/// How a transport-level close folds into the overall outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosePolicy {
    /// Closing signals success unless the last signal was a failure.
    #[default]
    Derived,
    /// Closing always signals success, even right after an ERROR update.
    AlwaysSuccess,
}

/// Tag carried in the `agent` field of every update frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Agent {
    Search,
    Analyst,
    Dev,
    Complete,
    Error,
    Unknown(String),
}

impl From<String> for Agent {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "SEARCH" => Agent::Search,
            "ANALYST" => Agent::Analyst,
            "DEV" => Agent::Dev,
            "COMPLETE" => Agent::Complete,
            "ERROR" => Agent::Error,
            _ => Agent::Unknown(tag),
        }
    }
}

impl From<Agent> for String {
    fn from(agent: Agent) -> Self {
        agent.as_str().to_string()
    }
}

impl Agent {
    pub fn as_str(&self) -> &str {
        match self {
            Agent::Search => "SEARCH",
            Agent::Analyst => "ANALYST",
            Agent::Dev => "DEV",
            Agent::Complete => "COMPLETE",
            Agent::Error => "ERROR",
            Agent::Unknown(tag) => tag,
        }
    }
}

/// Analyst payload. Scores are 0-100 by convention but never validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystMetrics {
    #[serde(default)]
    pub heat: Option<f64>,
    #[serde(default)]
    pub roi: Option<f64>,
    #[serde(default)]
    pub verdict: Option<String>,
}

/// One frame of the update stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub agent: Agent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AnalystMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

impl UpdateEvent {
    #[cfg(test)]
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            content: None,
            data: None,
            metrics: None,
            file: None,
            code: None,
            tag: None,
            verdict: None,
        }
    }

    #[cfg(test)]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Tag value from `data.tag`, falling back to a top-level `tag`.
    pub fn tag_value(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get("tag"))
            .and_then(|v| v.as_str())
            .or(self.tag.as_deref())
    }

    /// Verdict from the metrics block, falling back to a top-level `verdict`.
    pub fn verdict_value(&self) -> Option<&str> {
        self.metrics
            .as_ref()
            .and_then(|m| m.verdict.as_deref())
            .or(self.verdict.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Search,
    Analyst,
    Dev,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Search, Stage::Analyst, Stage::Dev];

    pub fn index(self) -> usize {
        match self {
            Stage::Search => 0,
            Stage::Analyst => 1,
            Stage::Dev => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Search => "Market Intelligence",
            Stage::Analyst => "Strategic Analyst",
            Stage::Dev => "Solution Architect",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    #[default]
    Dimmed,
    Active,
    Completed,
}

/// Overall session verdict as last signalled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Pending,
    Success,
    Failure,
}

/// Transport-side status shown in the status island.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Closed,
    ConnectionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Search,
    Analyst,
    Error,
    SignalLost,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub kind: LogKind,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    Info(InfoEvent),
    BootstrapFailed {
        reason: String,
    },
    Connected {
        session_id: String,
        /// Session state reported by the gateway, e.g. `active`.
        status: Option<String>,
    },
    Update(UpdateEvent),
    TransportError {
        reason: String,
    },
    StreamClosed,
    SessionFinished {
        // Boxed to keep the frequent Update variant small.
        summary: Box<SessionSummary>,
    },
}

/// Structured info events emitted by the engine and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Bootstrapping { base_url: String },
    OpeningStream { url: String },
    FrameSkipped { reason: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Bootstrapping { base_url } => {
                format!("Initiating protocol via {}", base_url)
            }
            InfoEvent::OpeningStream { url } => format!("Opening uplink {}", url),
            InfoEvent::FrameSkipped { reason } => format!("Skipped unreadable frame: {}", reason),
        }
    }
}

/// What the engine knows about a finished session; the router holds the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub project_idea: String,
    pub started_utc: String,
    pub ended_utc: String,
    pub frames_received: u64,
    pub frames_skipped: u64,
    #[serde(default)]
    pub transport_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub state: StageState,
}

/// Persisted and exported view of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    #[serde(default)]
    pub timestamp_utc: String,
    #[serde(default)]
    pub started_utc: String,
    pub session_id: String,
    pub project_idea: String,
    pub base_url: String,
    pub outcome: Outcome,
    pub stages: Vec<StageSnapshot>,
    #[serde(default)]
    pub log: Vec<LogLine>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metrics: Option<MetricsPanel>,
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub code: String,
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub unknown_tags: u64,
    #[serde(default)]
    pub transport_error: Option<String>,
}
