//! レコード単位のマージ規則

use crate::types::{IncidentRecord, InfoRecord, MaintenanceRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Merge of a fresh upstream copy into the cached copy with the same id.
pub trait Reconcile: InfoRecord {
    /// Returns the record to publish and persist, and whether any
    /// label-bearing field changed meaningfully.
    ///
    /// The result starts from `cached`, so an unchanged record keeps a
    /// byte-identical label tuple.
    fn merge(cached: &Self, fresh: &Self) -> (Self, bool);
}

/// 値を上書きし、変化があれば `changed` を立てる
fn take_if_changed<T: PartialEq + Clone>(slot: &mut T, fresh: &T, changed: &mut bool) {
    if slot != fresh {
        *slot = fresh.clone();
        *changed = true;
    }
}

/// 空でない別のリンクのみ変化とみなす
fn merge_link(slot: &mut Option<String>, fresh: &Option<String>, changed: &mut bool) {
    if let Some(link) = fresh.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        if slot.as_deref().map(str::trim) != Some(link) {
            *slot = Some(link.to_string());
            *changed = true;
        }
    }
}

/// 秒精度で異なる時刻のみ変化とみなす
fn merge_timestamp(
    slot: &mut Option<DateTime<Utc>>,
    fresh: &Option<DateTime<Utc>>,
    changed: &mut bool,
) {
    if let Some(ts) = fresh {
        if slot.map(|s| s.timestamp()) != Some(ts.timestamp()) {
            *slot = Some(*ts);
            *changed = true;
        }
    }
}

/// 順序だけの違いは変化とみなさない
fn merge_components(slot: &mut Vec<String>, fresh: &[String], changed: &mut bool) {
    let old: BTreeSet<&str> = slot.iter().map(String::as_str).collect();
    let new: BTreeSet<&str> = fresh.iter().map(String::as_str).collect();
    if old != new {
        *slot = fresh.to_vec();
        *changed = true;
    }
}

impl Reconcile for IncidentRecord {
    fn merge(cached: &Self, fresh: &Self) -> (Self, bool) {
        let mut merged = cached.clone();
        let mut changed = false;
        take_if_changed(&mut merged.name, &fresh.name, &mut changed);
        take_if_changed(&mut merged.impact, &fresh.impact, &mut changed);
        merge_link(&mut merged.shortlink, &fresh.shortlink, &mut changed);
        merge_timestamp(&mut merged.started_at, &fresh.started_at, &mut changed);
        merge_components(
            &mut merged.affected_components,
            &fresh.affected_components,
            &mut changed,
        );
        (merged, changed)
    }
}

impl Reconcile for MaintenanceRecord {
    fn merge(cached: &Self, fresh: &Self) -> (Self, bool) {
        let mut merged = cached.clone();
        let mut changed = false;
        take_if_changed(&mut merged.name, &fresh.name, &mut changed);
        merge_timestamp(
            &mut merged.scheduled_start,
            &fresh.scheduled_start,
            &mut changed,
        );
        merge_timestamp(&mut merged.scheduled_end, &fresh.scheduled_end, &mut changed);
        merge_link(&mut merged.shortlink, &fresh.shortlink, &mut changed);
        merge_components(
            &mut merged.affected_components,
            &fresh.affected_components,
            &mut changed,
        );
        (merged, changed)
    }
}
