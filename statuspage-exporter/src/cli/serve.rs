//! serve サブコマンド
//!
//! ポーリングループとメトリクスHTTPサーバーを起動します。
//! 未指定の値は環境変数（`STATUSPAGE_*`）とデフォルト値から補われます。

use clap::Args;
use std::path::PathBuf;

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Services file (YAML or JSON)
    #[arg(short, long)]
    pub services: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Per-service fetch timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Maximum number of concurrent fetches
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Metrics bind address
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Metrics listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Snapshot cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Remove every cached snapshot before the first round
    #[arg(long, default_value_t = false)]
    pub purge_cache: bool,

    /// Force debug logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Also write daily-rotated log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}
