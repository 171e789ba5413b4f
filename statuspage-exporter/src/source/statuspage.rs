//! Statuspage.io 形式（`/api/v2/summary.json`）のアダプタ
//!
//! - タイムアウト・接続失敗・5xx は指数バックオフで最大3回まで試行
//! - 試行全体が呼び出し単位のタイムアウトを超えることはない
//! - 解決済みインシデント・完了済みメンテナンスはここで除外する

use super::{SourceAdapter, USER_AGENT};
use crate::common::error::FetchError;
use crate::types::{
    ComponentState, HealthStatus, Impact, IncidentRecord, MaintenanceRecord, ServiceConfig,
    Snapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 最大試行回数
const MAX_ATTEMPTS: u32 = 3;

/// バックオフの基準時間
const BACKOFF_BASE: Duration = Duration::from_millis(500);

const SUMMARY_PATH: &str = "/api/v2/summary.json";
const TERMINAL_INCIDENT_STATUSES: &[&str] = &["resolved", "completed", "postmortem"];
const TERMINAL_MAINTENANCE_STATUSES: &[&str] = &["completed", "cancelled"];

#[derive(Debug, Default, Deserialize)]
struct SummaryPayload {
    #[serde(default)]
    status: Option<PageStatus>,
    #[serde(default)]
    components: Option<Vec<RawComponent>>,
    #[serde(default)]
    incidents: Option<Vec<RawIncident>>,
    #[serde(default)]
    scheduled_maintenances: Option<Vec<RawMaintenance>>,
}

#[derive(Debug, Default, Deserialize)]
struct PageStatus {
    #[serde(default)]
    indicator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComponentRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIncident {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    shortlink: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    resolved_at: Option<String>,
    #[serde(default)]
    components: Option<Vec<ComponentRef>>,
}

#[derive(Debug, Deserialize)]
struct RawMaintenance {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    shortlink: Option<String>,
    #[serde(default)]
    scheduled_for: Option<String>,
    #[serde(default)]
    scheduled_until: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    resolved_at: Option<String>,
    #[serde(default)]
    components: Option<Vec<ComponentRef>>,
}

/// Statuspage.io JSON API アダプタ
#[derive(Clone)]
pub struct StatuspageApiAdapter {
    client: Client,
}

impl Default for StatuspageApiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatuspageApiAdapter {
    /// 新しいアダプタを作成
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self::with_client(client)
    }

    /// 既存のHTTPクライアントを使う
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get_with_retry(&self, url: &str, deadline: Instant) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::timeout(format!(
                    "deadline exceeded before attempt {}",
                    attempt
                )));
            }

            let (err, retryable) = match self.client.get(url).timeout(remaining).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => (FetchError::from_reqwest(&e), e.is_timeout()),
                },
                Ok(resp) => {
                    let status = resp.status();
                    (
                        FetchError::transport(format!("HTTP {}", status)),
                        status.is_server_error(),
                    )
                }
                Err(e) => (
                    FetchError::from_reqwest(&e),
                    e.is_timeout() || e.is_connect(),
                ),
            };

            if !retryable || attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
            if Instant::now() + backoff >= deadline {
                return Err(err);
            }
            debug!(
                url,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying status page request"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl SourceAdapter for StatuspageApiAdapter {
    async fn fetch(
        &self,
        service: &ServiceConfig,
        timeout: Duration,
    ) -> Result<Snapshot, FetchError> {
        let started = Instant::now();
        let body = self.get_with_retry(&service.url, started + timeout).await?;
        let response_time = started.elapsed().as_secs_f64();

        let payload: SummaryPayload =
            serde_json::from_str(&body).map_err(|e| FetchError::parse(e.to_string()))?;

        Ok(normalize(service, payload, response_time, Utc::now()))
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!(value = raw, error = %e, "Ignoring unparsable timestamp");
            None
        }
    }
}

/// 前後の空白を除去し、空なら `None`
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lower(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_ascii_lowercase()
}

fn component_names(refs: Option<Vec<ComponentRef>>) -> Vec<String> {
    refs.unwrap_or_default()
        .into_iter()
        .filter_map(|c| non_empty(c.name))
        .collect()
}

/// `https://example.statuspage.io/api/v2/summary.json` → `https://example.statuspage.io`
fn page_base_url(url: &str) -> String {
    url.replace(SUMMARY_PATH, "").trim_end_matches('/').to_string()
}

fn normalize(
    service: &ServiceConfig,
    payload: SummaryPayload,
    response_time_seconds: f64,
    observed_at: DateTime<Utc>,
) -> Snapshot {
    let key = service.key.as_str();
    let base_url = page_base_url(&service.url);

    let components: Vec<ComponentState> = payload
        .components
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| {
            let name = non_empty(c.name)?;
            let status = if lower(&c.status) == "operational" {
                HealthStatus::Operational
            } else {
                HealthStatus::Degraded
            };
            Some(ComponentState {
                name,
                status,
                last_changed_at: parse_timestamp(c.updated_at.as_deref()).unwrap_or(observed_at),
            })
        })
        .collect();

    let incidents: Vec<IncidentRecord> = payload
        .incidents
        .unwrap_or_default()
        .into_iter()
        .filter(|inc| {
            !TERMINAL_INCIDENT_STATUSES.contains(&lower(&inc.status).as_str())
                && non_empty(inc.resolved_at.clone()).is_none()
        })
        .filter_map(|inc| {
            let Some(id) = non_empty(inc.id) else {
                warn!(service = key, "Skipping incident without id");
                return None;
            };
            let shortlink = non_empty(inc.shortlink).or_else(|| {
                (!base_url.is_empty()).then(|| format!("{}/incidents/{}", base_url, id))
            });
            let started_at = parse_timestamp(inc.started_at.as_deref())
                .or_else(|| parse_timestamp(inc.created_at.as_deref()));
            Some(IncidentRecord {
                name: non_empty(inc.name).unwrap_or_else(|| "Unnamed incident".to_string()),
                impact: lower(&inc.impact).parse().unwrap_or_default(),
                shortlink,
                started_at,
                affected_components: component_names(inc.components),
                id,
            })
        })
        .collect();

    let maintenances: Vec<MaintenanceRecord> = payload
        .scheduled_maintenances
        .unwrap_or_default()
        .into_iter()
        .filter(|m| {
            !TERMINAL_MAINTENANCE_STATUSES.contains(&lower(&m.status).as_str())
                && non_empty(m.resolved_at.clone()).is_none()
        })
        .filter_map(|m| {
            let Some(id) = non_empty(m.id) else {
                warn!(service = key, "Skipping maintenance without id");
                return None;
            };
            let scheduled_for = parse_timestamp(m.scheduled_for.as_deref());
            Some(MaintenanceRecord {
                name: non_empty(m.name).unwrap_or_else(|| "Unnamed maintenance".to_string()),
                scheduled_start: scheduled_for
                    .or_else(|| parse_timestamp(m.created_at.as_deref())),
                scheduled_end: parse_timestamp(m.scheduled_until.as_deref()).or(scheduled_for),
                shortlink: non_empty(m.shortlink),
                affected_components: component_names(m.components),
                id,
            })
        })
        .collect();

    let indicator = payload
        .status
        .and_then(|s| s.indicator)
        .map(|i| i.trim().to_ascii_lowercase());
    let all_operational = components
        .iter()
        .all(|c| c.status == HealthStatus::Operational);
    let incident_impact = incidents.iter().any(|i| i.impact > Impact::None);
    let indicator_clear = indicator.as_deref() == Some("none");
    let overall_status = if indicator_clear && !incident_impact && all_operational {
        HealthStatus::Operational
    } else {
        HealthStatus::Degraded
    };

    debug!(
        service = key,
        indicator = indicator.as_deref().unwrap_or("missing"),
        components = components.len(),
        incidents = incidents.len(),
        maintenances = maintenances.len(),
        "Normalized status page summary"
    );

    Snapshot {
        service_key: service.key.clone(),
        overall_status: Some(overall_status),
        components,
        incidents,
        maintenances,
        response_time_seconds,
        fetch_succeeded: true,
        observed_at,
        failure: None,
    }
}
