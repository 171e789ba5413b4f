//! 調整エンジン
//!
//! 前回キャッシュと今回スナップショットを突き合わせ、公開すべき状態と
//! 次に書き込むキャッシュエントリを決める。純粋関数で I/O を行わない。
//!
//! ラベル保持: 同一IDのレコードは、上流の値が意味のある変化をしていない限り
//! キャッシュ側の値をそのまま使い、エクスポートされるラベル列を完全一致させる。

mod records;

pub use records::Reconcile;

use crate::cache::CacheEntry;
use crate::common::error::FetchErrorKind;
use crate::types::{
    ComponentState, HealthStatus, IncidentRecord, InfoRecord, MaintenanceRecord, Snapshot,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// 公開状態の出所
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    /// 今回の取得結果
    Fresh,
    /// 取得失敗のためキャッシュを再公開
    Cached,
    /// 取得失敗かつキャッシュなし
    Unknown,
}

/// レコードの変化種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChange {
    /// 前回キャッシュになかった
    New,
    /// ラベルに変化なし（キャッシュ値を使用）
    Unchanged,
    /// 同一IDでラベルが変化
    Updated,
    /// 今回消えた（最後のラベルで0を1度だけ出す）
    Resolved,
}

/// 公開対象のレコードと変化種別
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate<T> {
    /// 公開に使うレコード
    pub record: T,
    /// 変化種別
    pub change: RecordChange,
}

impl<T> RecordUpdate<T> {
    fn new(record: T, change: RecordChange) -> Self {
        Self { record, change }
    }

    /// 解決済み（クリア対象）か
    pub fn is_resolved(&self) -> bool {
        self.change == RecordChange::Resolved
    }
}

/// 1サービス分の公開状態
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledState {
    /// サービスキー
    pub service_key: String,
    /// 全体ステータス（Unknown のとき None）
    pub overall_status: Option<HealthStatus>,
    /// コンポーネント（名前で一意）
    pub components: Vec<ComponentState>,
    /// インシデント（継続・新規・更新・解決）
    pub incidents: Vec<RecordUpdate<IncidentRecord>>,
    /// メンテナンス
    pub maintenances: Vec<RecordUpdate<MaintenanceRecord>>,
    /// 応答時間（取得成功時のみ）
    pub response_time_seconds: Option<f64>,
    /// 観測時刻（失敗時も今回の時刻）
    pub observed_at: DateTime<Utc>,
    /// 出所
    pub source: StateSource,
    /// 取得失敗の原因
    pub failure: Option<FetchErrorKind>,
}

impl ReconciledState {
    /// 今回の取得に成功したか
    pub fn fetch_succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// 上流の最新状態に基づく（権威ある）状態か
    pub fn is_authoritative(&self) -> bool {
        self.source == StateSource::Fresh
    }
}

/// 調整結果
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// 公開する状態
    pub state: ReconciledState,
    /// 書き込むキャッシュエントリ（取得失敗時は None）
    pub cache_write: Option<CacheEntry>,
}

/// Diff `current` against the last cached entry for the same service.
pub fn reconcile(previous: Option<&CacheEntry>, current: &Snapshot) -> Reconciliation {
    if !current.fetch_succeeded {
        return reconcile_failure(previous, current);
    }

    let key = current.service_key.as_str();
    let components = dedupe(key, "component", current.components.clone(), |c| {
        c.name.clone()
    });
    let (incidents, surviving_incidents) = reconcile_records(
        key,
        "incident",
        previous.map(|p| p.incidents.as_slice()).unwrap_or_default(),
        &current.incidents,
    );
    let (maintenances, surviving_maintenances) = reconcile_records(
        key,
        "maintenance",
        previous.map(|p| p.maintenances.as_slice()).unwrap_or_default(),
        &current.maintenances,
    );

    // 成功スナップショットは常に全体ステータスを持つ
    let overall = current.overall_status.unwrap_or(HealthStatus::Degraded);

    let cache_write = CacheEntry {
        components: components.clone(),
        incidents: surviving_incidents,
        maintenances: surviving_maintenances,
        ..CacheEntry::new(key, overall, current.observed_at)
    };

    Reconciliation {
        state: ReconciledState {
            service_key: key.to_string(),
            overall_status: Some(overall),
            components,
            incidents,
            maintenances,
            response_time_seconds: Some(current.response_time_seconds),
            observed_at: current.observed_at,
            source: StateSource::Fresh,
            failure: None,
        },
        cache_write: Some(cache_write),
    }
}

fn reconcile_failure(previous: Option<&CacheEntry>, current: &Snapshot) -> Reconciliation {
    let failure = Some(current.failure.unwrap_or(FetchErrorKind::Transport));
    let state = match previous {
        Some(prev) => ReconciledState {
            service_key: current.service_key.clone(),
            overall_status: Some(prev.overall_status),
            components: prev.components.clone(),
            incidents: unchanged(&prev.incidents),
            maintenances: unchanged(&prev.maintenances),
            response_time_seconds: None,
            observed_at: current.observed_at,
            source: StateSource::Cached,
            failure,
        },
        None => ReconciledState {
            service_key: current.service_key.clone(),
            overall_status: None,
            components: Vec::new(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            response_time_seconds: None,
            observed_at: current.observed_at,
            source: StateSource::Unknown,
            failure,
        },
    };
    Reconciliation {
        state,
        cache_write: None,
    }
}

fn unchanged<T: Clone>(records: &[T]) -> Vec<RecordUpdate<T>> {
    records
        .iter()
        .cloned()
        .map(|r| RecordUpdate::new(r, RecordChange::Unchanged))
        .collect()
}

/// First occurrence wins; later duplicates are logged and dropped.
fn dedupe<T, F>(service_key: &str, kind: &str, items: Vec<T>, key_of: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let id = key_of(&item);
        if seen.insert(id.clone()) {
            out.push(item);
        } else {
            warn!(
                service = service_key,
                kind,
                id = %id,
                "Duplicate identity in upstream data, keeping first occurrence"
            );
        }
    }
    out
}

/// Returns (updates to publish, records to persist).
fn reconcile_records<T: Reconcile>(
    service_key: &str,
    kind: &str,
    previous: &[T],
    current: &[T],
) -> (Vec<RecordUpdate<T>>, Vec<T>) {
    let current = dedupe(service_key, kind, current.to_vec(), |r| {
        r.identity().to_string()
    });

    let mut cached: HashMap<&str, &T> = HashMap::with_capacity(previous.len());
    for record in previous {
        cached.entry(record.identity()).or_insert(record);
    }

    let mut updates = Vec::with_capacity(current.len() + previous.len());
    let mut surviving = Vec::with_capacity(current.len());
    let mut seen = HashSet::with_capacity(current.len());

    for fresh in current {
        seen.insert(fresh.identity().to_string());
        match cached.get(fresh.identity()) {
            Some(old) => {
                let (merged, changed) = T::merge(old, &fresh);
                let change = if changed {
                    RecordChange::Updated
                } else {
                    RecordChange::Unchanged
                };
                surviving.push(merged.clone());
                updates.push(RecordUpdate::new(merged, change));
            }
            None => {
                surviving.push(fresh.clone());
                updates.push(RecordUpdate::new(fresh, RecordChange::New));
            }
        }
    }

    let mut resolved = HashSet::new();
    for old in previous {
        if !seen.contains(old.identity()) && resolved.insert(old.identity()) {
            updates.push(RecordUpdate::new(old.clone(), RecordChange::Resolved));
        }
    }

    (updates, surviving)
}
