//! 正規化スナップショット型定義
//!
//! 全ソースアダプタが生成する共通レコード。ステータスコード・タイムスタンプの
//! 正規化はアダプタ側の責務で、ここに届く時点で全てUTCに揃っている。

use crate::common::error::FetchErrorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// インシデント名・メンテナンス名ラベルの最大文字数
pub const NAME_LABEL_MAX_CHARS: usize = 100;

/// 影響コンポーネントラベルの最大文字数
pub const AFFECTED_LABEL_MAX_CHARS: usize = 150;

/// shortlink が無い場合のラベル値
pub const MISSING_LINK_LABEL: &str = "N/A";

/// タイムスタンプが無い場合のラベル値
pub const MISSING_TIMESTAMP_LABEL: &str = "unknown";

/// サービス全体・コンポーネントの稼働状態
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// 正常稼働
    Operational,
    /// 劣化・障害・メンテナンス中
    Degraded,
}

impl HealthStatus {
    /// HealthStatusを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Degraded => "degraded",
        }
    }

    /// ゲージ値（1=operational, 0=degraded）
    pub fn gauge_value(&self) -> f64 {
        match self {
            Self::Operational => 1.0,
            Self::Degraded => 0.0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// インシデントの影響度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    /// 影響なし
    #[default]
    None,
    /// 軽微
    Minor,
    /// 重大
    Major,
    /// 致命的
    Critical,
}

impl Impact {
    /// Impactを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown impact '{}'", other)),
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// コンポーネント状態（スナップショット内で name が一意）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentState {
    /// コンポーネント名
    pub name: String,
    /// 稼働状態
    pub status: HealthStatus,
    /// 上流で最後に状態が更新された時刻
    pub last_changed_at: DateTime<Utc>,
}

/// アクティブなインシデント
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentRecord {
    /// 上流が割り当てたID（同一性キー）
    pub id: String,
    /// インシデント名
    pub name: String,
    /// 影響度
    pub impact: Impact,
    /// 詳細ページへのリンク
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortlink: Option<String>,
    /// 発生時刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// 影響を受けるコンポーネント（上流の順序を保持）
    #[serde(default)]
    pub affected_components: Vec<String>,
}

/// アクティブなメンテナンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceRecord {
    /// 上流が割り当てたID（同一性キー）
    pub id: String,
    /// メンテナンス名
    pub name: String,
    /// 開始予定時刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// 終了予定時刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,
    /// 詳細ページへのリンク
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortlink: Option<String>,
    /// 影響を受けるコンポーネント
    #[serde(default)]
    pub affected_components: Vec<String>,
}

/// Records exported through an info gauge keyed by their full label tuple.
pub trait InfoRecord: Clone + std::fmt::Debug + Send + Sync {
    /// Upstream identity (incident or maintenance id).
    fn identity(&self) -> &str;

    /// Label values after `service_name`, in the metric's label order.
    fn label_values(&self) -> Vec<String>;
}

impl InfoRecord for IncidentRecord {
    fn identity(&self) -> &str {
        &self.id
    }

    // incident_id, incident_name, impact, shortlink, started_at, affected_components
    fn label_values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            truncate_label(&self.name, NAME_LABEL_MAX_CHARS),
            self.impact.as_str().to_string(),
            link_label(self.shortlink.as_deref()),
            timestamp_label(self.started_at),
            affected_label(&self.affected_components),
        ]
    }
}

impl InfoRecord for MaintenanceRecord {
    fn identity(&self) -> &str {
        &self.id
    }

    // maintenance_id, maintenance_name, scheduled_start, scheduled_end, shortlink, affected_components
    fn label_values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            truncate_label(&self.name, NAME_LABEL_MAX_CHARS),
            timestamp_label(self.scheduled_start),
            timestamp_label(self.scheduled_end),
            link_label(self.shortlink.as_deref()),
            affected_label(&self.affected_components),
        ]
    }
}

/// 1回のポーリングで得られたサービスの状態
///
/// アダプタの1回の呼び出しで生成され、生成後は変更しない。
/// 取得失敗時は [`Snapshot::failed`] で空のスナップショットを作る（アダプタは作らない）。
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// サービスキー
    pub service_key: String,
    /// 全体ステータス（`fetch_succeeded` が true の時は常に Some）
    pub overall_status: Option<HealthStatus>,
    /// コンポーネント一覧（上流の順序）
    pub components: Vec<ComponentState>,
    /// アクティブなインシデント（上流の順序、重複IDを含みうる）
    pub incidents: Vec<IncidentRecord>,
    /// アクティブなメンテナンス
    pub maintenances: Vec<MaintenanceRecord>,
    /// ステータスページの応答時間（秒）
    pub response_time_seconds: f64,
    /// 取得に成功したか
    pub fetch_succeeded: bool,
    /// 観測時刻
    pub observed_at: DateTime<Utc>,
    /// 取得失敗の原因（失敗時のみ）
    pub failure: Option<FetchErrorKind>,
}

impl Snapshot {
    /// Placeholder for a poll whose fetch failed; carries no data.
    pub fn failed(
        service_key: impl Into<String>,
        observed_at: DateTime<Utc>,
        kind: FetchErrorKind,
    ) -> Self {
        Self {
            service_key: service_key.into(),
            overall_status: None,
            components: Vec::new(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            response_time_seconds: 0.0,
            fetch_succeeded: false,
            observed_at,
            failure: Some(kind),
        }
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_label(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// UTC, second precision (`2025-11-04T13:25:38Z`).
pub fn timestamp_label(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => MISSING_TIMESTAMP_LABEL.to_string(),
    }
}

fn link_label(value: Option<&str>) -> String {
    match value {
        Some(link) if !link.trim().is_empty() => link.to_string(),
        _ => MISSING_LINK_LABEL.to_string(),
    }
}

fn affected_label(components: &[String]) -> String {
    truncate_label(&components.join(", "), AFFECTED_LABEL_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn incident() -> IncidentRecord {
        IncidentRecord {
            id: "INC-1".to_string(),
            name: "Elevated error rates".to_string(),
            impact: Impact::Minor,
            shortlink: Some("https://stspg.io/abc".to_string()),
            started_at: Some(
                Utc.with_ymd_and_hms(2025, 11, 4, 13, 25, 38).unwrap()
                    + chrono::Duration::milliseconds(181),
            ),
            affected_components: vec!["API".to_string(), "Webhooks".to_string()],
        }
    }

    #[test]
    fn test_incident_label_values_order_and_format() {
        let labels = incident().label_values();
        assert_eq!(
            labels,
            vec![
                "INC-1",
                "Elevated error rates",
                "minor",
                "https://stspg.io/abc",
                "2025-11-04T13:25:38Z",
                "API, Webhooks",
            ]
        );
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let mut inc = incident();
        inc.shortlink = Some("  ".to_string());
        inc.started_at = None;
        let labels = inc.label_values();
        assert_eq!(labels[3], MISSING_LINK_LABEL);
        assert_eq!(labels[4], MISSING_TIMESTAMP_LABEL);
    }

    #[test]
    fn test_long_names_are_truncated_on_char_boundary() {
        let mut inc = incident();
        inc.name = "障".repeat(150);
        let labels = inc.label_values();
        assert_eq!(labels[1].chars().count(), NAME_LABEL_MAX_CHARS);
    }

    #[test]
    fn test_impact_parse_and_ordering() {
        assert_eq!("MAJOR".parse::<Impact>().unwrap(), Impact::Major);
        assert!("maintenance".parse::<Impact>().is_err());
        assert!(Impact::Critical > Impact::Major);
        assert!(Impact::Minor > Impact::None);
    }

    #[test]
    fn test_failed_snapshot_is_empty() {
        let now = Utc::now();
        let snap = Snapshot::failed("github", now, FetchErrorKind::Timeout);
        assert!(!snap.fetch_succeeded);
        assert!(snap.overall_status.is_none());
        assert!(snap.incidents.is_empty());
        assert_eq!(snap.failure, Some(FetchErrorKind::Timeout));
    }
}
