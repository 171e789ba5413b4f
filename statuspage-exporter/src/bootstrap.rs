//! エクスポーター初期化ロジック
//!
//! サービス定義の読み込み、キャッシュ準備、メトリクスレジストリ作成、
//! ポーラー構築など起動に必要なコンポーネントの初期化を担当する。

use crate::cache::{CacheStore, FileCacheStore};
use crate::config::{load_services, ExporterConfig};
use crate::metrics::MetricPublisher;
use crate::poller::StatusPoller;
use crate::source::{SourceAdapter, SourceRouter};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

/// 初期化結果
pub struct InitContext {
    /// 検証済みの設定
    pub config: ExporterConfig,
    /// `/metrics` で公開するメトリクス
    pub publisher: Arc<MetricPublisher>,
    /// 構築済みポーラー（未起動）
    pub poller: StatusPoller,
}

/// 本番構成（HTTPアダプタ + ファイルキャッシュ）で初期化する
pub async fn initialize(config: ExporterConfig) -> anyhow::Result<InitContext> {
    let cache: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(&config.cache_dir));
    initialize_with(config, Arc::new(SourceRouter::http()), cache).await
}

/// ソースとキャッシュを指定して初期化する
///
/// 設定・サービス定義の不備はここでエラーになる。起動後は
/// サービス単位の失敗がプロセスを止めることはない。
pub async fn initialize_with(
    config: ExporterConfig,
    source: Arc<dyn SourceAdapter>,
    cache: Arc<dyn CacheStore>,
) -> anyhow::Result<InitContext> {
    info!("Statuspage exporter v{}", env!("CARGO_PKG_VERSION"));
    config.validate().context("Invalid exporter configuration")?;

    let services = load_services(&config.services_path).with_context(|| {
        format!(
            "Failed to load service definitions from {}",
            config.services_path.display()
        )
    })?;
    info!(
        count = services.len(),
        path = %config.services_path.display(),
        "Loaded service definitions"
    );
    for service in &services {
        info!(
            service = %service.key,
            name = %service.display_name,
            kind = service.source_kind.as_str(),
            url = %service.url,
            "Monitoring service"
        );
    }

    if config.purge_cache {
        match cache.purge_all().await {
            Ok(removed) => info!(removed, "Purged cached snapshots"),
            Err(e) => warn!(error = %e, "Failed to purge cache, continuing with existing entries"),
        }
    }

    let publisher = Arc::new(MetricPublisher::new().context("Failed to create metric registry")?);

    let poller = StatusPoller::new(services, source, cache, Arc::clone(&publisher))
        .with_interval(config.poll_interval)
        .with_timeout(config.fetch_timeout)
        .with_max_concurrency(config.max_concurrency);

    Ok(InitContext {
        config,
        publisher,
        poller,
    })
}
