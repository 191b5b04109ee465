mod gateway;
mod stream;

pub use gateway::HealthReport;

use crate::error::SessionError;
use crate::model::{InfoEvent, SessionConfig, SessionEvent, SessionSummary};
use gateway::{GatewayClient, SessionTicket};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct SessionEngine {
    cfg: SessionConfig,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

impl SessionEngine {
    pub fn new(cfg: SessionConfig) -> Self {
        Self { cfg }
    }

    /// Bootstrap a session and pump its update stream to completion.
    ///
    /// Bootstrap failures are reported as `BootstrapFailed` and returned as errors.
    /// Once a session id exists the run always ends with `StreamClosed` and `Ok`,
    /// even if the socket failed along the way.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<SessionSummary, SessionError> {
        let started_utc = now_rfc3339();
        let _ = event_tx.send(SessionEvent::Info(InfoEvent::Bootstrapping {
            base_url: self.cfg.base_url.clone(),
        }));

        let (ticket, url) = match self.bootstrap().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "session bootstrap failed");
                let _ = event_tx.send(SessionEvent::BootstrapFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        let session_id = ticket.session_id;
        info!(
            session_id = %session_id,
            status = ticket.status.as_deref().unwrap_or("-"),
            "session started"
        );
        let _ = event_tx.send(SessionEvent::Connected {
            session_id: session_id.clone(),
            status: ticket.status,
        });

        let stats = stream::pump(&url, &event_tx).await;
        info!(
            session_id = %session_id,
            frames = stats.frames_received,
            skipped = stats.frames_skipped,
            "session stream ended"
        );

        Ok(SessionSummary {
            session_id,
            project_idea: self.cfg.project_idea.clone(),
            started_utc,
            ended_utc: now_rfc3339(),
            frames_received: stats.frames_received,
            frames_skipped: stats.frames_skipped,
            transport_error: stats.transport_error,
        })
    }

    async fn bootstrap(&self) -> Result<(SessionTicket, url::Url), SessionError> {
        let client = GatewayClient::new(&self.cfg)?;
        let ticket = client
            .start_session(&self.cfg.project_idea, self.cfg.license_key.as_deref())
            .await?;
        let url = stream::stream_url(&self.cfg, &ticket.session_id)?;
        Ok((ticket, url))
    }
}

/// One-shot health probe against the gateway.
pub async fn check_health(cfg: &SessionConfig) -> Result<HealthReport, SessionError> {
    GatewayClient::new(cfg)?.health().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClosePolicy, Outcome};
    use crate::router::UpdateRouter;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(base_url: &str, stream_url: Option<String>) -> SessionConfig {
        SessionConfig {
            base_url: base_url.to_string(),
            stream_url,
            project_idea: "ai bookkeeping for bakeries".into(),
            license_key: None,
            connect_timeout: Duration::from_secs(5),
            close_policy: ClosePolicy::Derived,
            user_agent: "wyronix-test".into(),
        }
    }

    #[tokio::test]
    async fn full_session_routes_into_router() {
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"session_id": "s-42", "status": "active"})),
            )
            .mount(&gateway)
            .await;
        let ws_base = stream::tests::serve_frames(vec![
            r#"{"agent":"SEARCH","content":"Secure Uplink Established."}"#.into(),
            r#"{"agent":"ANALYST","content":"done","metrics":{"heat":82,"roi":55,"verdict":"Go"}}"#
                .into(),
            r#"{"agent":"DEV","file":"app.py"}"#.into(),
            r#"{"agent":"DEV","code":"print('hi')"}"#.into(),
            r#"{"agent":"COMPLETE","content":"Sequence complete."}"#.into(),
        ])
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = SessionEngine::new(cfg(&gateway.uri(), Some(ws_base)));
        let summary = engine.run(tx).await.unwrap();
        assert_eq!(summary.session_id, "s-42");
        assert_eq!(summary.frames_received, 5);

        let mut router = UpdateRouter::new(ClosePolicy::Derived);
        let mut connected_status = None;
        while let Ok(ev) = rx.try_recv() {
            if let SessionEvent::Connected { status, .. } = &ev {
                connected_status = status.clone();
            }
            router.handle(&ev);
        }
        assert_eq!(connected_status.as_deref(), Some("active"));
        assert_eq!(router.session_id(), Some("s-42"));
        assert_eq!(router.outcome(), Outcome::Success);
        assert_eq!(router.files(), ["app.py".to_string()]);
        assert_eq!(router.code(), "print('hi')");
        assert_eq!(router.verdict(), Some("Go"));
        assert!(router.export_enabled());
    }

    #[tokio::test]
    async fn rejected_bootstrap_emits_failure_event() {
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&gateway)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = SessionEngine::new(cfg(&gateway.uri(), None))
            .run(tx)
            .await
            .unwrap_err();
        assert!(err.is_bootstrap());

        let mut saw_failure = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, SessionEvent::BootstrapFailed { .. }) {
                saw_failure = true;
            }
            assert!(!matches!(ev, SessionEvent::StreamClosed));
        }
        assert!(saw_failure);
    }
}
