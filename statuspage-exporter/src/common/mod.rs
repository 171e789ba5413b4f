//! 共通レイヤー

pub mod error;

pub use error::{CacheError, ConfigError, FetchError, FetchErrorKind, MetricsError};
