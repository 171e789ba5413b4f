//! ロギング初期化
//!
//! `tracing-subscriber` の fmt レイヤーを stderr に、`log_dir` 指定時は
//! `tracing-appender` の日次ローテーションファイルにも出力する。

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "statuspage-exporter.log";

/// フィルタ文字列を決定
///
/// `debug` が真なら常に `debug`。それ以外は `STATUSPAGE_LOG_LEVEL`、`RUST_LOG`、`info` の順。
pub fn filter_directive(debug: bool) -> String {
    if debug {
        return "debug".to_string();
    }
    std::env::var("STATUSPAGE_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// グローバルサブスクライバを初期化
///
/// 返される [`WorkerGuard`] はプロセス終了まで保持すること（drop でファイル出力が止まる）。
pub fn init(debug: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(debug);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{}'", directive))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
