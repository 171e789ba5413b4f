//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names, the process-level [`ExporterConfig`], and the
//! services file loader.

use crate::cli::serve::ServeArgs;
use crate::common::error::ConfigError;
use crate::types::{ServiceConfig, SourceKind};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// デフォルトのポーリング間隔（秒）
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1200;
/// デフォルトのサービス単位タイムアウト（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
/// デフォルトの同時取得数
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// デフォルトのメトリクスポート
pub const DEFAULT_METRICS_PORT: u16 = 9001;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use statuspage_exporter::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("STATUSPAGE_METRICS_PORT", "METRICS_PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if new_name == old_name {
        return None;
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Same as [`get_env_with_fallback`], returning `default` when neither is set.
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Unparsable values are logged and replaced by `default`.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    match get_env_with_fallback(new_name, old_name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    variable = new_name,
                    value = %raw,
                    "Ignoring unparsable environment variable, using default"
                );
                default
            }
        },
        None => default,
    }
}

/// `1/true/yes/on` を真とみなす
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// 真偽値の環境変数を取得（未設定なら false）
pub fn get_env_flag(new_name: &str, old_name: &str) -> bool {
    get_env_with_fallback(new_name, old_name)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

/// エクスポーター全体の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    /// サービス定義ファイル
    pub services_path: PathBuf,
    /// ポーリング間隔
    pub poll_interval: Duration,
    /// サービス単位の取得タイムアウト
    pub fetch_timeout: Duration,
    /// 同時取得数の上限
    pub max_concurrency: usize,
    /// メトリクスHTTPのバインドホスト
    pub metrics_host: String,
    /// メトリクスHTTPのポート
    pub metrics_port: u16,
    /// キャッシュディレクトリ
    pub cache_dir: PathBuf,
    /// 起動時にキャッシュを全削除するか
    pub purge_cache: bool,
    /// デバッグログを強制するか
    pub debug: bool,
    /// ログファイル出力先（未設定ならstderrのみ）
    pub log_dir: Option<PathBuf>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            services_path: PathBuf::from("services.json"),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            cache_dir: PathBuf::from("cache"),
            purge_cache: false,
            debug: false,
            log_dir: None,
        }
    }
}

impl ExporterConfig {
    /// 環境変数から設定を読み込む
    ///
    /// 旧名の環境変数（`POLL_INTERVAL_SECS` 等）も警告付きで受け付ける。
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            services_path: PathBuf::from(get_env_with_fallback_or(
                "STATUSPAGE_SERVICES_FILE",
                "SERVICES_FILE",
                "services.json",
            )),
            poll_interval: Duration::from_secs(get_env_with_fallback_parse(
                "STATUSPAGE_POLL_INTERVAL_SECS",
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            fetch_timeout: Duration::from_secs(get_env_with_fallback_parse(
                "STATUSPAGE_FETCH_TIMEOUT_SECS",
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            max_concurrency: get_env_with_fallback_parse(
                "STATUSPAGE_MAX_CONCURRENCY",
                "STATUSPAGE_MAX_CONCURRENCY",
                DEFAULT_MAX_CONCURRENCY,
            ),
            metrics_host: get_env_with_fallback_or(
                "STATUSPAGE_METRICS_HOST",
                "STATUSPAGE_METRICS_HOST",
                &defaults.metrics_host,
            ),
            metrics_port: get_env_with_fallback_parse(
                "STATUSPAGE_METRICS_PORT",
                "METRICS_PORT",
                DEFAULT_METRICS_PORT,
            ),
            cache_dir: PathBuf::from(get_env_with_fallback_or(
                "STATUSPAGE_CACHE_DIR",
                "CACHE_DIR",
                "cache",
            )),
            purge_cache: get_env_flag("STATUSPAGE_PURGE_CACHE", "PURGE_CACHE"),
            debug: get_env_flag("STATUSPAGE_DEBUG", "DEBUG"),
            log_dir: get_env_with_fallback("STATUSPAGE_LOG_DIR", "STATUSPAGE_LOG_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// 環境変数の設定にCLI引数を上書きする
    pub fn from_args(args: &ServeArgs) -> Self {
        let mut config = Self::from_env();
        if let Some(path) = &args.services {
            config.services_path = path.clone();
        }
        if let Some(secs) = args.interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = args.timeout_secs {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = args.max_concurrency {
            config.max_concurrency = limit;
        }
        if let Some(host) = &args.host {
            config.metrics_host = host.clone();
        }
        if let Some(port) = args.port {
            config.metrics_port = port;
        }
        if let Some(dir) = &args.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(dir) = &args.log_dir {
            config.log_dir = Some(dir.clone());
        }
        config.purge_cache |= args.purge_cache;
        config.debug |= args.debug;
        config
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "fetch_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// メトリクスHTTPのバインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }
}

#[derive(Debug, Deserialize)]
struct ServiceDefinition {
    name: String,
    url: String,
    #[serde(default, alias = "type")]
    kind: SourceKind,
}

fn service_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"))
}

/// サービス定義ファイル（YAML/JSON）を読み込む
///
/// `key → {name, url, kind}` のマップ。JSONもYAMLのサブセットとして読める。
/// 戻り値はキー順に並ぶ。
pub fn load_services(path: &Path) -> Result<Vec<ServiceConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_services(&raw).map_err(|err| match err {
        ParseFailure::Syntax(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Invalid(err) => err,
    })
}

enum ParseFailure {
    Syntax(serde_yaml::Error),
    Invalid(ConfigError),
}

fn parse_services(raw: &str) -> Result<Vec<ServiceConfig>, ParseFailure> {
    let definitions: BTreeMap<String, ServiceDefinition> =
        serde_yaml::from_str(raw).map_err(ParseFailure::Syntax)?;
    if definitions.is_empty() {
        return Err(ParseFailure::Invalid(ConfigError::NoServices));
    }

    let mut services = Vec::with_capacity(definitions.len());
    let mut names: HashMap<String, String> = HashMap::with_capacity(definitions.len());
    for (key, def) in definitions {
        if !service_key_pattern().is_match(&key) {
            return Err(ParseFailure::Invalid(ConfigError::InvalidServiceKey(key)));
        }
        validate_url(&key, &def.url).map_err(ParseFailure::Invalid)?;
        let display_name = if def.name.trim().is_empty() {
            key.clone()
        } else {
            def.name
        };
        // メトリクスは表示名でラベル付けされるため、重複するとサービス間で系列が衝突する
        if let Some(first) = names.insert(display_name.clone(), key.clone()) {
            return Err(ParseFailure::Invalid(ConfigError::DuplicateServiceName {
                name: display_name,
                first,
                second: key,
            }));
        }
        services.push(ServiceConfig::new(key, display_name, def.url, def.kind));
    }
    Ok(services)
}

fn validate_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            key: key.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
