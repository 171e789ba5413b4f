//! once サブコマンド
//!
//! 1ラウンドだけポーリングし、Prometheusテキスト形式を標準出力へ書き出す。

use super::serve::ServeArgs;
use clap::Args;

/// once サブコマンドの引数
#[derive(Args, Debug, Clone, Default)]
pub struct OnceArgs {
    /// Shared settings (services file, timeouts, cache directory)
    #[command(flatten)]
    pub common: ServeArgs,

    /// Reconcile against the configured cache directory instead of an in-memory cache
    #[arg(long, default_value_t = false)]
    pub use_cache: bool,
}
