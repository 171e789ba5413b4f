//! 監視対象サービスの設定型

use serde::{Deserialize, Serialize};

/// ステータス情報の取得方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Statuspage.io 形式の JSON API
    #[default]
    #[serde(alias = "status_page")]
    Api,
    /// JavaScriptでレンダリングされるHTMLページ
    Scrape,
}

impl SourceKind {
    /// SourceKindを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scrape => "scrape",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 監視対象サービス
///
/// プロセス起動時に一度だけ読み込まれ、以降は変更されない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// サービスキー（キャッシュファイル名にも使う）
    pub key: String,
    /// 表示名（`service_name` ラベル値）
    pub display_name: String,
    /// ステータスページのURL
    pub url: String,
    /// 取得方式
    pub source_kind: SourceKind,
}

impl ServiceConfig {
    /// 新しいサービス設定を作成
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        url: impl Into<String>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            url: url.into(),
            source_kind,
        }
    }
}
