//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! サービス単位のエラー（取得失敗・キャッシュ破損）はそのサービスのパイプライン内で
//! 回復され、ラウンドの外へ伝播しない。起動時の設定エラーのみが致命的となる。

use std::path::PathBuf;
use thiserror::Error;

/// 取得失敗の原因タグ
///
/// `statuspage_check_failures_total` の `error_type` ラベル値としても使われる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// 呼び出しごとのタイムアウトを超過
    Timeout,
    /// 接続失敗・HTTPエラーステータス
    Transport,
    /// ペイロードを解釈できない
    Parse,
    /// ページのレンダリングに失敗（コンテンツが得られない）
    Render,
}

impl FetchErrorKind {
    /// ラベル用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Parse => "parse",
            Self::Render => "render",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by a source adapter. Never accompanied by a partial snapshot.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct FetchError {
    /// 原因タグ
    pub kind: FetchErrorKind,
    /// 詳細メッセージ（ログ用）
    pub message: String,
}

impl FetchError {
    /// Build an error with an explicit cause tag.
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// タイムアウト
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    /// 通信エラー
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    /// 解析エラー
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    /// レンダリングエラー
    pub fn render(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Render, message)
    }

    /// Classify a reqwest error into a cause tag.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::parse(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

/// キャッシュストアのエラー
#[derive(Debug, Error)]
pub enum CacheError {
    /// 読み書き時のI/Oエラー
    #[error("cache I/O error for '{key}': {source}")]
    Io {
        /// サービスキー（ディレクトリ操作時は空）
        key: String,
        /// 元のI/Oエラー
        #[source]
        source: std::io::Error,
    },

    /// 破損エントリ（キャッシュミスとして扱う）
    #[error("corrupt cache entry for '{key}': {reason}")]
    Corrupt {
        /// サービスキー
        key: String,
        /// 破損理由
        reason: String,
    },

    /// シリアライズ失敗
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 設定エラー（起動時のみ致命的）
#[derive(Debug, Error)]
pub enum ConfigError {
    /// サービス定義ファイルを読めない
    #[error("failed to read services file {path}: {source}")]
    Read {
        /// ファイルパス
        path: PathBuf,
        /// 元のI/Oエラー
        #[source]
        source: std::io::Error,
    },

    /// サービス定義ファイルの構文エラー
    #[error("failed to parse services file {path}: {source}")]
    Parse {
        /// ファイルパス
        path: PathBuf,
        /// 元の解析エラー
        #[source]
        source: serde_yaml::Error,
    },

    /// 有効なサービスが1件もない
    #[error("no services configured")]
    NoServices,

    /// 表示名の重複（メトリクスの service_name ラベルが衝突する）
    #[error("services '{first}' and '{second}' share the display name '{name}'")]
    DuplicateServiceName {
        /// 重複した表示名
        name: String,
        /// 先に定義されたサービスキー
        first: String,
        /// 後から定義されたサービスキー
        second: String,
    },

    /// キャッシュファイル名に使えないサービスキー
    #[error("invalid service key '{0}': only [A-Za-z0-9_.-] are allowed")]
    InvalidServiceKey(String),

    /// URLが不正
    #[error("invalid url for service '{key}': {reason}")]
    InvalidUrl {
        /// サービスキー
        key: String,
        /// 理由
        reason: String,
    },

    /// その他の設定値エラー
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// 設定名
        name: &'static str,
        /// 理由
        reason: String,
    },
}

/// メトリクスレジストリのエラー
#[derive(Debug, Error)]
pub enum MetricsError {
    /// prometheusクレートのエラー
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// テキスト出力がUTF-8でない
    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
