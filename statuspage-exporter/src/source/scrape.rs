//! HTMLスクレイピングアダプタ
//!
//! JSON API を持たないステータスページ向け。HTMLの取得は [`PageRenderer`] に委譲し、
//! ヘッドレスブラウザ等はこのトレイトの実装として差し替える。

use super::html::{parse_page, slugify, ParsedPage};
use super::{SourceAdapter, USER_AGENT};
use crate::common::error::FetchError;
use crate::types::{
    ComponentState, HealthStatus, Impact, IncidentRecord, MaintenanceRecord, ServiceConfig,
    Snapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Produces the HTML of a status page, JavaScript already executed.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Fetch and render `url` within `timeout`.
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// 素のHTTP取得（JavaScriptは実行しない）
#[derive(Clone)]
pub struct HttpPageRenderer {
    client: Client,
}

impl Default for HttpPageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPageRenderer {
    /// 新しいレンダラを作成
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::transport(format!("HTTP {}", status)));
        }
        resp.text().await.map_err(|e| FetchError::from_reqwest(&e))
    }
}

/// スクレイピングアダプタ
#[derive(Clone)]
pub struct ScrapeAdapter {
    renderer: Arc<dyn PageRenderer>,
}

impl ScrapeAdapter {
    /// レンダラを指定して作成
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    async fn fetch(
        &self,
        service: &ServiceConfig,
        timeout: Duration,
    ) -> Result<Snapshot, FetchError> {
        let started = Instant::now();
        let html = self.renderer.render(&service.url, timeout).await?;
        let response_time = started.elapsed().as_secs_f64();

        let page = parse_page(&html);
        if page.components.is_empty() {
            return Err(FetchError::render(format!(
                "no component content in {} bytes of HTML",
                html.len()
            )));
        }
        debug!(
            service = %service.key,
            components = page.components.len(),
            incidents = page.incidents.len(),
            maintenances = page.maintenances.len(),
            "Parsed status page HTML"
        );

        Ok(build_snapshot(service, page, response_time, Utc::now()))
    }
}

fn build_snapshot(
    service: &ServiceConfig,
    page: ParsedPage,
    response_time_seconds: f64,
    observed_at: DateTime<Utc>,
) -> Snapshot {
    let key = service.key.as_str();

    let components: Vec<ComponentState> = page
        .components
        .into_iter()
        .map(|c| ComponentState {
            name: c.name,
            status: c.status,
            last_changed_at: observed_at,
        })
        .collect();

    // The page carries no upstream ids; derive them from the title so the
    // same incident keeps its id across polls.
    let incidents: Vec<IncidentRecord> = page
        .incidents
        .into_iter()
        .map(|inc| IncidentRecord {
            id: format!("{}-incident-{}", key, slugify(&inc.title)),
            name: inc.title,
            impact: inc.impact,
            shortlink: None,
            started_at: inc.started_at,
            affected_components: Vec::new(),
        })
        .collect();

    let maintenances: Vec<MaintenanceRecord> = page
        .maintenances
        .into_iter()
        .map(|m| MaintenanceRecord {
            id: format!("{}-maintenance-{}", key, slugify(&m.title)),
            name: m.title,
            scheduled_start: m.scheduled_start,
            scheduled_end: m.scheduled_end,
            shortlink: None,
            affected_components: Vec::new(),
        })
        .collect();

    let degraded = components
        .iter()
        .any(|c| c.status == HealthStatus::Degraded)
        || incidents.iter().any(|i| i.impact > Impact::None);

    Snapshot {
        service_key: service.key.clone(),
        overall_status: Some(if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        }),
        components,
        incidents,
        maintenances,
        response_time_seconds,
        fetch_succeeded: true,
        observed_at,
        failure: None,
    }
}
