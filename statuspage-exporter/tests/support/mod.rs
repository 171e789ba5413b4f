//! 統合テスト用のフェイクソースとメトリクス読み取りヘルパー

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use statuspage_exporter::cache::MemoryCacheStore;
use statuspage_exporter::common::error::FetchError;
use statuspage_exporter::metrics::MetricPublisher;
use statuspage_exporter::poller::StatusPoller;
use statuspage_exporter::source::SourceAdapter;
use statuspage_exporter::types::{
    ComponentState, HealthStatus, Impact, IncidentRecord, MaintenanceRecord, ServiceConfig,
    Snapshot, SourceKind,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted fetch outcome.
#[derive(Clone)]
pub enum Step {
    /// Return this snapshot (observed_at is refreshed on each call)
    Ok(Snapshot),
    /// Return this error
    Fail(FetchError),
    /// Sleep, then return the snapshot
    Slow(Duration, Snapshot),
}

/// サービスキーごとに結果を順に返すフェイクアダプタ
///
/// 最後の1件は使い切らずに繰り返す。
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: &str, step: Step) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(step);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, key: &str) -> Option<Step> {
        let mut script = self.script.lock().unwrap();
        let queue = script.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch(
        &self,
        service: &ServiceConfig,
        _timeout: Duration,
    ) -> Result<Snapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step(&service.key) {
            Some(Step::Ok(snapshot)) => Ok(Snapshot {
                observed_at: Utc::now(),
                ..snapshot
            }),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Slow(delay, snapshot)) => {
                tokio::time::sleep(delay).await;
                Ok(Snapshot {
                    observed_at: Utc::now(),
                    ..snapshot
                })
            }
            None => Err(FetchError::transport(format!(
                "no scripted step for {}",
                service.key
            ))),
        }
    }
}

pub struct Harness {
    pub poller: StatusPoller,
    pub publisher: Arc<MetricPublisher>,
    pub cache: Arc<MemoryCacheStore>,
    pub source: Arc<ScriptedSource>,
}

pub fn service(key: &str, name: &str) -> ServiceConfig {
    ServiceConfig::new(
        key,
        name,
        format!("https://{}.example.com/api/v2/summary.json", key),
        SourceKind::Api,
    )
}

pub fn harness(services: Vec<ServiceConfig>, source: ScriptedSource) -> Harness {
    let source = Arc::new(source);
    let cache = Arc::new(MemoryCacheStore::new());
    let publisher = Arc::new(MetricPublisher::new().unwrap());
    let poller = StatusPoller::new(
        services,
        source.clone(),
        cache.clone(),
        publisher.clone(),
    )
    .with_timeout(Duration::from_secs(2))
    .with_max_concurrency(4);
    Harness {
        poller,
        publisher,
        cache,
        source,
    }
}

pub fn snapshot(key: &str, status: HealthStatus) -> Snapshot {
    Snapshot {
        service_key: key.to_string(),
        overall_status: Some(status),
        components: vec![ComponentState {
            name: "API".to_string(),
            status,
            last_changed_at: Utc.with_ymd_and_hms(2025, 11, 4, 13, 0, 0).unwrap(),
        }],
        incidents: Vec::new(),
        maintenances: Vec::new(),
        response_time_seconds: 0.12,
        fetch_succeeded: true,
        observed_at: Utc::now(),
        failure: None,
    }
}

pub fn incident(id: &str, impact: Impact) -> IncidentRecord {
    IncidentRecord {
        id: id.to_string(),
        name: "Elevated error rates".to_string(),
        impact,
        shortlink: Some(format!("https://stspg.io/{}", id.to_ascii_lowercase())),
        started_at: Some(Utc.with_ymd_and_hms(2025, 11, 4, 13, 20, 0).unwrap()),
        affected_components: vec!["API".to_string()],
    }
}

pub fn maintenance(id: &str) -> MaintenanceRecord {
    MaintenanceRecord {
        id: id.to_string(),
        name: "Database upgrade".to_string(),
        scheduled_start: Some(Utc.with_ymd_and_hms(2025, 11, 5, 2, 0, 0).unwrap()),
        scheduled_end: Some(Utc.with_ymd_and_hms(2025, 11, 5, 4, 0, 0).unwrap()),
        shortlink: None,
        affected_components: Vec::new(),
    }
}

pub fn with_incidents(mut snapshot: Snapshot, incidents: Vec<IncidentRecord>) -> Snapshot {
    snapshot.incidents = incidents;
    snapshot
}

/// Sample lines of `metric` whose labels contain every `key="value"` pair.
pub fn samples<'a>(text: &'a str, metric: &str, labels: &[(&str, &str)]) -> Vec<(&'a str, f64)> {
    let prefix = format!("{}{{", metric);
    text.lines()
        .filter(|line| line.starts_with(&prefix))
        .filter(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        })
        .filter_map(|line| {
            let (_, value) = line.rsplit_once(' ')?;
            Some((line, value.parse::<f64>().ok()?))
        })
        .collect()
}

/// Value of the single sample matching `labels`, if any.
pub fn value(text: &str, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let found = samples(text, metric, labels);
    assert!(
        found.len() <= 1,
        "expected at most one {} sample for {:?}, got {:?}",
        metric,
        labels,
        found
    );
    found.first().map(|(_, v)| *v)
}
