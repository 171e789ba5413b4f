//! 型定義

pub mod service;
pub mod snapshot;

pub use service::{ServiceConfig, SourceKind};
pub use snapshot::{
    ComponentState, HealthStatus, Impact, IncidentRecord, InfoRecord, MaintenanceRecord, Snapshot,
};
