use crate::error::SessionError;
use crate::model::SessionConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

const START_PATH: &str = "api/v1/start";
const HEALTH_PATH: &str = "api/v1/health";
const LICENSE_HEADER: &str = "License-Key";

/// HTTP side of the gateway: session bootstrap and health.
pub struct GatewayClient {
    http: reqwest::Client,
    base: Url,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionTicket {
    pub session_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub security: Option<String>,
    #[serde(default)]
    pub gemini: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    project_idea: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Parse the configured base URL, tolerating a missing trailing slash.
pub(crate) fn parse_base(raw: &str) -> Result<Url, SessionError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| SessionError::InvalidUrl(format!("{raw}: {e}")))
}

impl GatewayClient {
    pub fn new(cfg: &SessionConfig) -> Result<Self, SessionError> {
        let base = parse_base(&cfg.base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.connect_timeout)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base
            .join(path)
            .map_err(|e| SessionError::InvalidUrl(format!("{path}: {e}")))
    }

    pub async fn start_session(
        &self,
        project_idea: &str,
        license_key: Option<&str>,
    ) -> Result<SessionTicket, SessionError> {
        let mut req = self
            .http
            .post(self.endpoint(START_PATH)?)
            .json(&StartRequest { project_idea });
        if let Some(key) = license_key.filter(|k| !k.is_empty()) {
            req = req.header(LICENSE_HEADER, key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = error_detail(resp).await;
            return Err(match status {
                StatusCode::FORBIDDEN => SessionError::LicenseRejected(detail),
                _ => SessionError::Rejected {
                    status: status.as_u16(),
                    detail,
                },
            });
        }
        Ok(resp.json::<SessionTicket>().await?)
    }

    pub async fn health(&self) -> Result<HealthReport, SessionError> {
        let resp = self.http.get(self.endpoint(HEALTH_PATH)?).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SessionError::Rejected {
                status: status.as_u16(),
                detail: error_detail(resp).await,
            });
        }
        Ok(resp.json::<HealthReport>().await?)
    }
}

async fn error_detail(resp: reqwest::Response) -> String {
    let fallback = resp
        .status()
        .canonical_reason()
        .unwrap_or("no reason given")
        .to_string();
    match resp.json::<ErrorBody>().await {
        Ok(body) => match body.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        Err(_) => fallback,
    }
}
