use crate::engine::gateway::parse_base;
use crate::error::SessionError;
use crate::model::{InfoEvent, SessionConfig, SessionEvent, UpdateEvent};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Counters gathered while pumping one stream.
#[derive(Debug, Default)]
pub(crate) struct StreamStats {
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub transport_error: Option<String>,
}

/// Build the update stream URL for a session. An explicit stream URL wins; otherwise
/// the HTTP base is reused with its scheme swapped to ws/wss.
pub(crate) fn stream_url(cfg: &SessionConfig, session_id: &str) -> Result<Url, SessionError> {
    let mut base = match cfg.stream_url.as_deref() {
        Some(raw) => parse_base(raw)?,
        None => parse_base(&cfg.base_url)?,
    };
    let scheme = match base.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        "ws" | "wss" => None,
        other => {
            return Err(SessionError::InvalidUrl(format!(
                "unsupported scheme for update stream: {other}"
            )))
        }
    };
    if let Some(scheme) = scheme {
        base.set_scheme(scheme)
            .map_err(|_| SessionError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
    }
    base.join(&format!("ws/{session_id}"))
        .map_err(|e| SessionError::InvalidUrl(e.to_string()))
}

pub(crate) fn decode_frame(text: &str) -> Result<UpdateEvent, SessionError> {
    Ok(serde_json::from_str(text)?)
}

/// Forward every frame of the stream at `url` until either side closes it.
/// Always finishes with `StreamClosed`; a socket failure is reported first as
/// `TransportError`. Nothing is retried.
pub(crate) async fn pump(
    url: &Url,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
) -> StreamStats {
    let mut stats = StreamStats::default();
    let _ = event_tx.send(SessionEvent::Info(InfoEvent::OpeningStream {
        url: url.to_string(),
    }));

    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(%url, error = %e, "update stream connect failed");
            report_transport_error(&mut stats, event_tx, e.to_string());
            let _ = event_tx.send(SessionEvent::StreamClosed);
            return stats;
        }
    };
    info!(%url, "update stream open");

    while let Some(msg) = ws.next().await {
        let decoded = match msg {
            Ok(Message::Text(text)) => decode_frame(&text),
            Ok(Message::Binary(bytes)) => {
                serde_json::from_slice(&bytes).map_err(SessionError::from)
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "update stream closed by peer");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%url, error = %e, "update stream transport error");
                report_transport_error(&mut stats, event_tx, e.to_string());
                break;
            }
        };
        match decoded {
            Ok(update) => {
                stats.frames_received += 1;
                let _ = event_tx.send(SessionEvent::Update(update));
            }
            Err(e) => {
                stats.frames_skipped += 1;
                debug!(error = %e, "skipping undecodable frame");
                let _ = event_tx.send(SessionEvent::Info(InfoEvent::FrameSkipped {
                    reason: e.to_string(),
                }));
            }
        }
    }

    let _ = event_tx.send(SessionEvent::StreamClosed);
    stats
}

fn report_transport_error(
    stats: &mut StreamStats,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
    reason: String,
) {
    stats.transport_error = Some(reason.clone());
    let _ = event_tx.send(SessionEvent::TransportError { reason });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Agent, ClosePolicy};
    use futures::SinkExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn cfg(base_url: &str, stream_url: Option<&str>) -> SessionConfig {
        SessionConfig {
            base_url: base_url.to_string(),
            stream_url: stream_url.map(str::to_string),
            project_idea: "idea".into(),
            license_key: None,
            connect_timeout: Duration::from_secs(5),
            close_policy: ClosePolicy::Derived,
            user_agent: "wyronix-test".into(),
        }
    }

    /// Serve one WebSocket connection that sends `frames` as text and then closes.
    pub(crate) async fn serve_frames(frames: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(sock).await.unwrap();
            for f in frames {
                ws.send(Message::Text(f)).await.unwrap();
            }
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn stream_url_swaps_http_scheme() {
        let url = stream_url(&cfg("http://localhost:8000", None), "abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/abc");
        let url = stream_url(&cfg("https://core.example.com/", None), "abc").unwrap();
        assert_eq!(url.as_str(), "wss://core.example.com/ws/abc");
    }

    #[test]
    fn explicit_stream_url_wins() {
        let url = stream_url(
            &cfg("http://localhost:8000", Some("ws://10.0.0.2:9000/uplink")),
            "s1",
        )
        .unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.2:9000/uplink/ws/s1");
    }

    #[test]
    fn ftp_base_is_rejected() {
        assert!(matches!(
            stream_url(&cfg("ftp://localhost", None), "s"),
            Err(SessionError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn pumps_frames_in_order_then_closes() {
        let base = serve_frames(vec![
            r#"{"agent":"SEARCH","content":"Secure Uplink Established.","metrics":null}"#.into(),
            "not json".into(),
            r#"{"agent":"COMPLETE","content":"Sequence complete."}"#.into(),
        ])
        .await;
        let url = Url::parse(&format!("{base}/ws/s1")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let stats = pump(&url, &tx).await;
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_skipped, 1);
        assert!(stats.transport_error.is_none());

        let agents: Vec<Agent> = drain(&mut rx)
            .into_iter()
            .filter_map(|ev| match ev {
                SessionEvent::Update(u) => Some(u.agent),
                _ => None,
            })
            .collect();
        assert_eq!(agents, vec![Agent::Search, Agent::Complete]);
    }

    #[tokio::test]
    async fn refused_connection_reports_transport_error_and_close() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/s1")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let stats = pump(&url, &tx).await;
        assert!(stats.transport_error.is_some());
        let events = drain(&mut rx);
        assert!(matches!(
            events[events.len() - 2],
            SessionEvent::TransportError { .. }
        ));
        assert!(matches!(events.last(), Some(SessionEvent::StreamClosed)));
    }
}
