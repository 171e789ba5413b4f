//! ステータスソースアダプタ
//!
//! 取得方式ごとの差異（JSON API / HTMLスクレイピング）はここで吸収し、
//! 下流には正規化済みの [`Snapshot`] だけを渡す。

pub mod html;
pub mod scrape;
pub mod statuspage;

pub use scrape::{HttpPageRenderer, PageRenderer, ScrapeAdapter};
pub use statuspage::StatuspageApiAdapter;

use crate::common::error::FetchError;
use crate::types::{ServiceConfig, Snapshot, SourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// HTTPリクエストの User-Agent
pub const USER_AGENT: &str = concat!("statuspage-exporter/", env!("CARGO_PKG_VERSION"));

/// One status source.
///
/// On success the snapshot is fully normalized and `fetch_succeeded` is true.
/// On failure only a cause-tagged error is returned, never a partial snapshot.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch the current state of `service`, finishing within `timeout`.
    async fn fetch(&self, service: &ServiceConfig, timeout: Duration)
        -> Result<Snapshot, FetchError>;
}

/// 取得方式でアダプタを振り分ける
#[derive(Clone)]
pub struct SourceRouter {
    api: Arc<dyn SourceAdapter>,
    scrape: Arc<dyn SourceAdapter>,
}

impl SourceRouter {
    /// 方式ごとのアダプタを指定して作成
    pub fn new(api: Arc<dyn SourceAdapter>, scrape: Arc<dyn SourceAdapter>) -> Self {
        Self { api, scrape }
    }

    /// 標準のHTTPアダプタで作成
    pub fn http() -> Self {
        Self::new(
            Arc::new(StatuspageApiAdapter::new()),
            Arc::new(ScrapeAdapter::new(Arc::new(HttpPageRenderer::new()))),
        )
    }

    fn adapter_for(&self, kind: SourceKind) -> &Arc<dyn SourceAdapter> {
        match kind {
            SourceKind::Api => &self.api,
            SourceKind::Scrape => &self.scrape,
        }
    }
}

#[async_trait]
impl SourceAdapter for SourceRouter {
    async fn fetch(
        &self,
        service: &ServiceConfig,
        timeout: Duration,
    ) -> Result<Snapshot, FetchError> {
        self.adapter_for(service.source_kind)
            .fetch(service, timeout)
            .await
    }
}
