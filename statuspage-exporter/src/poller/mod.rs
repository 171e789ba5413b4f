//! ポーリングオーケストレーター
//!
//! 一定間隔で全サービスを並列取得し、サービスごとに
//! 照合 → メトリクス反映 → キャッシュ保存 を順に行う。
//!
//! 1ラウンドの状態遷移: `Idle → Dispatching → Awaiting → Reconciling → Idle`

use crate::cache::CacheStore;
use crate::common::error::FetchErrorKind;
use crate::config::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL_SECS,
};
use crate::metrics::MetricPublisher;
use crate::reconcile::{reconcile, ReconciledState, Reconciliation};
use crate::shutdown::ShutdownController;
use crate::source::SourceAdapter;
use crate::types::{ServiceConfig, Snapshot};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// ラウンドの進行段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// ラウンド待ち
    Idle,
    /// 取得タスクの投入中
    Dispatching,
    /// 取得結果の待機中
    Awaiting,
    /// 照合・反映・保存中
    Reconciling,
}

impl RoundPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RoundPhase::Dispatching,
            2 => RoundPhase::Awaiting,
            3 => RoundPhase::Reconciling,
            _ => RoundPhase::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RoundPhase::Idle => 0,
            RoundPhase::Dispatching => 1,
            RoundPhase::Awaiting => 2,
            RoundPhase::Reconciling => 3,
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::Idle => "idle",
            RoundPhase::Dispatching => "dispatching",
            RoundPhase::Awaiting => "awaiting",
            RoundPhase::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1ラウンドの結果
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// サービスごとの照合結果（設定順）
    pub states: Vec<ReconciledState>,
    /// 前のラウンドが実行中だったため何もしなかった
    pub skipped: bool,
    /// 所要時間
    pub elapsed: Duration,
}

impl RoundReport {
    fn skipped(elapsed: Duration) -> Self {
        Self {
            states: Vec::new(),
            skipped: true,
            elapsed,
        }
    }

    /// サービスキーで照合結果を引く
    pub fn state(&self, service_key: &str) -> Option<&ReconciledState> {
        self.states.iter().find(|s| s.service_key == service_key)
    }

    /// 取得に失敗したサービス数
    pub fn failed_count(&self) -> usize {
        self.states.iter().filter(|s| !s.fetch_succeeded()).count()
    }
}

/// ステータスポーラー
#[derive(Clone)]
pub struct StatusPoller {
    services: Arc<Vec<ServiceConfig>>,
    source: Arc<dyn SourceAdapter>,
    cache: Arc<dyn CacheStore>,
    publisher: Arc<MetricPublisher>,
    poll_interval: Duration,
    fetch_timeout: Duration,
    max_concurrency: usize,
    round_lock: Arc<Mutex<()>>,
    phase: Arc<AtomicU8>,
}

impl StatusPoller {
    /// 新しいポーラーを作成
    pub fn new(
        services: Vec<ServiceConfig>,
        source: Arc<dyn SourceAdapter>,
        cache: Arc<dyn CacheStore>,
        publisher: Arc<MetricPublisher>,
    ) -> Self {
        Self {
            services: Arc::new(services),
            source,
            cache,
            publisher,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            round_lock: Arc::new(Mutex::new(())),
            phase: Arc::new(AtomicU8::new(RoundPhase::Idle.as_u8())),
        }
    }

    /// ポーリング間隔を設定（0は1秒として扱う）
    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = if poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            poll_interval
        };
        self
    }

    /// サービスごとの取得タイムアウトを設定
    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// 同時取得数の上限を設定（0は1として扱う）
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// 監視対象サービス
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    /// 現在のラウンド段階
    pub fn phase(&self) -> RoundPhase {
        RoundPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: RoundPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// バックグラウンドでポーリングを開始
    ///
    /// 起動直後に1ラウンド実行し、その後は間隔ごとに実行する。
    /// シャットダウン要求で停止するが、実行中のラウンドは最後まで進める。
    pub fn start(self, shutdown: ShutdownController) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_round().await;
            self.poll_loop(shutdown).await;
        })
    }

    async fn poll_loop(&self, shutdown: ShutdownController) {
        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.poll_interval.as_secs(),
            services = self.services.len(),
            "Status poller started"
        );

        // 初回ラウンドは実行済みなので、即時に返る最初のtickを消費する
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_round().await;
                }
                _ = shutdown.wait() => {
                    info!("Status poller stopped");
                    break;
                }
            }
        }
    }

    /// 1ラウンド実行する
    ///
    /// 別のラウンドが実行中なら何もせず `skipped` を返す。
    pub async fn run_round(&self) -> RoundReport {
        let started = Instant::now();
        let Ok(_round) = self.round_lock.try_lock() else {
            warn!("Previous poll round still in flight, skipping this one");
            return RoundReport::skipped(started.elapsed());
        };

        self.set_phase(RoundPhase::Dispatching);
        let fetches = self.services.iter().cloned().enumerate().map(|(idx, service)| {
            let source = Arc::clone(&self.source);
            let fetch_timeout = self.fetch_timeout;
            async move {
                let snapshot = fetch_isolated(source, &service, fetch_timeout).await;
                (idx, snapshot)
            }
        });
        let mut pending = stream::iter(fetches).buffer_unordered(self.max_concurrency);

        self.set_phase(RoundPhase::Awaiting);
        let mut snapshots: Vec<(usize, Snapshot)> = Vec::with_capacity(self.services.len());
        while let Some(result) = pending.next().await {
            snapshots.push(result);
        }
        drop(pending);
        snapshots.sort_by_key(|(idx, _)| *idx);

        self.set_phase(RoundPhase::Reconciling);
        let mut states = Vec::with_capacity(snapshots.len());
        for (idx, snapshot) in snapshots {
            let service = &self.services[idx];
            states.push(self.settle(service, &snapshot).await);
        }
        self.set_phase(RoundPhase::Idle);

        let report = RoundReport {
            states,
            skipped: false,
            elapsed: started.elapsed(),
        };
        info!(
            services = report.states.len(),
            failed = report.failed_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Poll round completed"
        );
        report
    }

    /// 1サービス分の照合・反映・保存
    async fn settle(&self, service: &ServiceConfig, snapshot: &Snapshot) -> ReconciledState {
        let previous = match self.cache.load(&service.key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(service = %service.key, error = %e, "Cache load failed, treating as miss");
                None
            }
        };

        let Reconciliation { state, cache_write } = reconcile(previous.as_ref(), snapshot);
        self.publisher.apply(service, &state);

        if let Some(entry) = cache_write {
            if let Err(e) = self.cache.save(&entry).await {
                warn!(service = %service.key, error = %e, "Cache save failed");
            }
        }

        debug!(
            service = %service.key,
            source = ?state.source,
            incidents = state.incidents.len(),
            maintenances = state.maintenances.len(),
            "Service state published"
        );
        state
    }
}

/// 取得を別タスクで実行し、タイムアウト・パニックを失敗スナップショットに変換する
async fn fetch_isolated(
    source: Arc<dyn SourceAdapter>,
    service: &ServiceConfig,
    fetch_timeout: Duration,
) -> Snapshot {
    let task_service = service.clone();
    let handle = tokio::spawn(async move {
        tokio::time::timeout(fetch_timeout, source.fetch(&task_service, fetch_timeout)).await
    });

    let kind = match handle.await {
        Ok(Ok(Ok(snapshot))) => return snapshot,
        Ok(Ok(Err(e))) => {
            warn!(
                service = %service.key,
                error_type = e.kind.as_str(),
                error = %e.message,
                "Status fetch failed"
            );
            e.kind
        }
        Ok(Err(_elapsed)) => {
            warn!(
                service = %service.key,
                timeout_secs = fetch_timeout.as_secs_f64(),
                "Status fetch timed out"
            );
            FetchErrorKind::Timeout
        }
        Err(e) => {
            error!(service = %service.key, error = %e, "Status fetch task failed");
            FetchErrorKind::Transport
        }
    };
    Snapshot::failed(service.key.clone(), Utc::now(), kind)
}
