//! Statuspage exporter
//!
//! サードパーティのステータスページを定期的に取得し、
//! Prometheusメトリクスとして公開する。

#![warn(missing_docs)]

/// 共通エラー型
pub mod common;

/// 型定義（サービス定義・スナップショット）
pub mod types;

/// 設定管理（環境変数ヘルパー・サービス定義ファイル）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// CLIインターフェース
pub mod cli;

/// ステータスソースアダプタ（JSON API / HTMLスクレイピング）
pub mod source;

/// サービスごとのスナップショットキャッシュ
pub mod cache;

/// 前回状態と最新スナップショットの照合
pub mod reconcile;

/// Prometheusメトリクスの公開
pub mod metrics;

/// ポーリングオーケストレーター
pub mod poller;

/// メトリクスHTTPサーバー
pub mod server;

/// Shutdown controller
pub mod shutdown;

/// 起動時の初期化
pub mod bootstrap;
