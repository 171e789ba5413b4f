//! メトリクス公開
//!
//! 調整済み状態を Prometheus のゲージ群へ反映する。
//! メトリクス名・ラベルキーは既存ダッシュボードとの互換契約なので変更しないこと。
//!
//! 1サービス分の更新は書き込みロック下でまとめて行い、`render()` は読み取りロックを
//! 取るため、スクレイプが更新途中のサービスを観測することはない。

use crate::common::error::MetricsError;
use crate::reconcile::{ReconciledState, RecordUpdate};
use crate::types::{InfoRecord, ServiceConfig};
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const SERVICE_LABELS: &[&str] = &["service_name"];
const COMPONENT_LABELS: &[&str] = &["service_name", "component_name"];
const FAILURE_LABELS: &[&str] = &["service_name", "error_type"];
const INCIDENT_LABELS: &[&str] = &[
    "service_name",
    "incident_id",
    "incident_name",
    "impact",
    "shortlink",
    "started_at",
    "affected_components",
];
const MAINTENANCE_LABELS: &[&str] = &[
    "service_name",
    "maintenance_id",
    "maintenance_name",
    "scheduled_start",
    "scheduled_end",
    "shortlink",
    "affected_components",
];

struct Gauges {
    registry: Registry,
    service_status: GaugeVec,
    response_time: GaugeVec,
    incident_info: GaugeVec,
    maintenance_info: GaugeVec,
    component_status: GaugeVec,
    component_timestamp: GaugeVec,
    probe_check: GaugeVec,
    application_timestamp: GaugeVec,
    check_failures: IntCounterVec,
}

impl Gauges {
    fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str, labels: &[&str]| -> Result<GaugeVec, MetricsError> {
            let vec = GaugeVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let service_status = gauge(
            "statuspage_service_status",
            "Overall service status (1 operational, 0 degraded)",
            SERVICE_LABELS,
        )?;
        let response_time = gauge(
            "statuspage_response_time_seconds",
            "Status page response time in seconds",
            SERVICE_LABELS,
        )?;
        let incident_info = gauge(
            "statuspage_incident_info",
            "Active incident (1 active, 0 cleared)",
            INCIDENT_LABELS,
        )?;
        let maintenance_info = gauge(
            "statuspage_maintenance_info",
            "Active or scheduled maintenance (1 active, 0 cleared)",
            MAINTENANCE_LABELS,
        )?;
        let component_status = gauge(
            "statuspage_component_status",
            "Component status (1 operational, 0 degraded)",
            COMPONENT_LABELS,
        )?;
        let component_timestamp = gauge(
            "statuspage_component_timestamp",
            "Last component status change as epoch milliseconds",
            COMPONENT_LABELS,
        )?;
        let probe_check = gauge(
            "statuspage_probe_check",
            "Whether the last fetch succeeded (1 ok, 0 failed)",
            SERVICE_LABELS,
        )?;
        let application_timestamp = gauge(
            "statuspage_application_timestamp",
            "Last observation of the service as epoch milliseconds",
            SERVICE_LABELS,
        )?;

        let check_failures = IntCounterVec::new(
            Opts::new(
                "statuspage_check_failures_total",
                "Failed status checks by error type",
            ),
            FAILURE_LABELS,
        )?;
        registry.register(Box::new(check_failures.clone()))?;

        Ok(Self {
            registry,
            service_status,
            response_time,
            incident_info,
            maintenance_info,
            component_status,
            component_timestamp,
            probe_check,
            application_timestamp,
            check_failures,
        })
    }
}

/// Series currently exported for one service.
#[derive(Default)]
struct ServiceSeries {
    /// id -> full label tuple
    incidents: HashMap<String, Vec<String>>,
    maintenances: HashMap<String, Vec<String>>,
    components: HashSet<String>,
    /// Published at 0 last round; removed at the start of the next one.
    pending_incidents: Vec<Vec<String>>,
    pending_maintenances: Vec<Vec<String>>,
    pending_components: Vec<String>,
}

struct PublisherInner {
    gauges: Gauges,
    services: HashMap<String, ServiceSeries>,
}

/// Prometheus レジストリへの公開器
pub struct MetricPublisher {
    inner: RwLock<PublisherInner>,
}

impl std::fmt::Debug for MetricPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricPublisher").finish_non_exhaustive()
    }
}

fn as_refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn epoch_millis(ts: chrono::DateTime<chrono::Utc>) -> f64 {
    ts.timestamp_millis() as f64
}

impl MetricPublisher {
    /// レジストリと全メトリクスを初期化
    pub fn new() -> Result<Self, MetricsError> {
        Ok(Self {
            inner: RwLock::new(PublisherInner {
                gauges: Gauges::new()?,
                services: HashMap::new(),
            }),
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, PublisherInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, PublisherInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 1サービス分の調整結果を反映する
    pub fn apply(&self, service: &ServiceConfig, state: &ReconciledState) {
        let mut guard = self.write();
        let PublisherInner { gauges, services } = &mut *guard;
        let series = services.entry(service.key.clone()).or_default();
        let name = service.display_name.as_str();

        clear_pending(gauges, series, name);
        apply_scalars(gauges, name, state);
        apply_components(gauges, series, name, state);

        let authoritative = state.is_authoritative();
        apply_info(
            &gauges.incident_info,
            name,
            &state.incidents,
            &mut series.incidents,
            &mut series.pending_incidents,
            authoritative,
        );
        apply_info(
            &gauges.maintenance_info,
            name,
            &state.maintenances,
            &mut series.maintenances,
            &mut series.pending_maintenances,
            authoritative,
        );

        debug!(
            service = %service.key,
            incidents = series.incidents.len(),
            maintenances = series.maintenances.len(),
            components = series.components.len(),
            "Published reconciled state"
        );
    }

    /// Prometheus テキスト形式で全メトリクスを出力
    pub fn render(&self) -> Result<String, MetricsError> {
        let guard = self.read();
        let families = guard.gauges.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// `Content-Type` ヘッダー値
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn clear_pending(gauges: &Gauges, series: &mut ServiceSeries, name: &str) {
    for labels in series.pending_incidents.drain(..) {
        let _ = gauges.incident_info.remove_label_values(&as_refs(&labels));
    }
    for labels in series.pending_maintenances.drain(..) {
        let _ = gauges.maintenance_info.remove_label_values(&as_refs(&labels));
    }
    for component in series.pending_components.drain(..) {
        let labels = [name, component.as_str()];
        let _ = gauges.component_status.remove_label_values(&labels);
        let _ = gauges.component_timestamp.remove_label_values(&labels);
    }
}

fn apply_scalars(gauges: &Gauges, name: &str, state: &ReconciledState) {
    match state.overall_status {
        Some(status) => gauges
            .service_status
            .with_label_values(&[name])
            .set(status.gauge_value()),
        None => {
            let _ = gauges.service_status.remove_label_values(&[name]);
        }
    }

    match state.response_time_seconds {
        Some(seconds) => gauges.response_time.with_label_values(&[name]).set(seconds),
        None => {
            let _ = gauges.response_time.remove_label_values(&[name]);
        }
    }

    let probe = if state.fetch_succeeded() { 1.0 } else { 0.0 };
    gauges.probe_check.with_label_values(&[name]).set(probe);
    gauges
        .application_timestamp
        .with_label_values(&[name])
        .set(epoch_millis(state.observed_at));

    if let Some(kind) = state.failure {
        gauges
            .check_failures
            .with_label_values(&[name, kind.as_str()])
            .inc();
    }
}

fn apply_components(
    gauges: &Gauges,
    series: &mut ServiceSeries,
    name: &str,
    state: &ReconciledState,
) {
    let mut listed = HashSet::with_capacity(state.components.len());
    for component in &state.components {
        let labels = [name, component.name.as_str()];
        gauges
            .component_status
            .with_label_values(&labels)
            .set(component.status.gauge_value());
        gauges
            .component_timestamp
            .with_label_values(&labels)
            .set(epoch_millis(component.last_changed_at));
        listed.insert(component.name.clone());
    }

    if state.is_authoritative() {
        let gone: Vec<String> = series
            .components
            .iter()
            .filter(|c| !listed.contains(*c))
            .cloned()
            .collect();
        for component in gone {
            gauges
                .component_status
                .with_label_values(&[name, component.as_str()])
                .set(0.0);
            series.pending_components.push(component);
        }
        series.components = listed;
    } else {
        series.components.extend(listed);
    }
}

fn full_labels<T: InfoRecord>(service_name: &str, record: &T) -> Vec<String> {
    let mut labels = Vec::with_capacity(7);
    labels.push(service_name.to_string());
    labels.extend(record.label_values());
    labels
}

/// Info gauge update for one record family.
///
/// A tuple change under the same id removes the old series before the new
/// one is set, so at most one series exists per id.
fn apply_info<T: InfoRecord>(
    gauge: &GaugeVec,
    service_name: &str,
    updates: &[RecordUpdate<T>],
    tracked: &mut HashMap<String, Vec<String>>,
    pending: &mut Vec<Vec<String>>,
    authoritative: bool,
) {
    let mut listed = HashSet::with_capacity(updates.len());

    for update in updates {
        let id = update.record.identity();
        listed.insert(id.to_string());
        let labels = full_labels(service_name, &update.record);

        if update.is_resolved() {
            let last = tracked.remove(id).unwrap_or(labels);
            gauge.with_label_values(&as_refs(&last)).set(0.0);
            pending.push(last);
            continue;
        }

        if let Some(old) = tracked.get(id) {
            if *old != labels {
                let _ = gauge.remove_label_values(&as_refs(old));
            }
        }
        gauge.with_label_values(&as_refs(&labels)).set(1.0);
        tracked.insert(id.to_string(), labels);
    }

    if authoritative {
        let stale: Vec<String> = tracked
            .keys()
            .filter(|id| !listed.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(last) = tracked.remove(&id) {
                gauge.with_label_values(&as_refs(&last)).set(0.0);
                pending.push(last);
            }
        }
    }
}
