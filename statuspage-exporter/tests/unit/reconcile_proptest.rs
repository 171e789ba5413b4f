//! Property-based tests for the reconciliation engine

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

use statuspage_exporter::cache::CacheEntry;
use statuspage_exporter::common::error::FetchErrorKind;
use statuspage_exporter::reconcile::{reconcile, RecordChange, StateSource};
use statuspage_exporter::types::{HealthStatus, Impact, IncidentRecord, Snapshot};

fn incident(n: u8, impact: Impact) -> IncidentRecord {
    IncidentRecord {
        id: format!("INC-{}", n),
        name: format!("Incident {}", n),
        impact,
        shortlink: None,
        started_at: Some(Utc.with_ymd_and_hms(2025, 11, 4, 12, n as u32, 0).unwrap()),
        affected_components: Vec::new(),
    }
}

fn impact_of(n: u8) -> Impact {
    match n % 3 {
        0 => Impact::Minor,
        1 => Impact::Major,
        _ => Impact::Critical,
    }
}

fn snapshot(ids: &[u8], round: u32) -> Snapshot {
    let mut snapshot = Snapshot::failed(
        "svc",
        Utc.with_ymd_and_hms(2025, 11, 4, 14, round, 0).unwrap(),
        FetchErrorKind::Transport,
    );
    snapshot.fetch_succeeded = true;
    snapshot.failure = None;
    snapshot.overall_status = Some(if ids.is_empty() {
        HealthStatus::Operational
    } else {
        HealthStatus::Degraded
    });
    snapshot.incidents = ids.iter().map(|n| incident(*n, impact_of(*n))).collect();
    snapshot
}

fn ids_strategy() -> impl Strategy<Value = Vec<BTreeSet<u8>>> {
    prop::collection::vec(prop::collection::btree_set(0u8..6, 0..5), 1..6)
}

proptest! {
    /// 各ラウンドで同じIDは高々1件、Resolvedは前回あって今回ないIDだけ
    #[test]
    fn resolved_ids_are_exactly_the_disappeared_ones(rounds in ids_strategy()) {
        let mut cache: Option<CacheEntry> = None;
        let mut previous: BTreeSet<u8> = BTreeSet::new();

        for (round, ids) in rounds.iter().enumerate() {
            let ids_vec: Vec<u8> = ids.iter().copied().collect();
            let result = reconcile(cache.as_ref(), &snapshot(&ids_vec, round as u32));

            let mut seen = HashSet::new();
            for update in &result.state.incidents {
                prop_assert!(seen.insert(update.record.id.clone()), "duplicate id {}", update.record.id);
            }

            let resolved: BTreeSet<String> = result.state.incidents.iter()
                .filter(|u| u.change == RecordChange::Resolved)
                .map(|u| u.record.id.clone())
                .collect();
            let expected: BTreeSet<String> = previous.difference(ids)
                .map(|n| format!("INC-{}", n))
                .collect();
            prop_assert_eq!(resolved, expected);

            cache = result.cache_write;
            previous = ids.clone();
        }
    }

    /// キャッシュには解決済みレコードが残らない
    #[test]
    fn cache_holds_only_active_records(rounds in ids_strategy()) {
        let mut cache: Option<CacheEntry> = None;
        for (round, ids) in rounds.iter().enumerate() {
            let ids_vec: Vec<u8> = ids.iter().copied().collect();
            let result = reconcile(cache.as_ref(), &snapshot(&ids_vec, round as u32));
            let entry = result.cache_write.expect("successful fetch writes the cache");

            let cached: BTreeSet<String> = entry.incidents.iter().map(|i| i.id.clone()).collect();
            let active: BTreeSet<String> = ids.iter().map(|n| format!("INC-{}", n)).collect();
            prop_assert_eq!(cached, active);
            cache = Some(entry);
        }
    }

    /// 同じスナップショットを2回照合しても変化なし
    #[test]
    fn repeated_snapshot_is_unchanged(ids in prop::collection::btree_set(0u8..6, 0..5)) {
        let ids: Vec<u8> = ids.into_iter().collect();
        let first = reconcile(None, &snapshot(&ids, 0));
        prop_assert!(first.state.incidents.iter().all(|u| u.change == RecordChange::New));

        let second = reconcile(first.cache_write.as_ref(), &snapshot(&ids, 1));
        prop_assert!(second.state.incidents.iter().all(|u| u.change == RecordChange::Unchanged));
        prop_assert_eq!(
            first.cache_write.map(|e| e.incidents),
            second.cache_write.map(|e| e.incidents)
        );
    }

    /// 取得失敗ではキャッシュを書かず、前回の状態をそのまま出す
    #[test]
    fn failure_never_writes_cache(ids in prop::collection::btree_set(0u8..6, 0..5)) {
        let ids: Vec<u8> = ids.into_iter().collect();
        let seeded = reconcile(None, &snapshot(&ids, 0)).cache_write;

        let failed = Snapshot::failed(
            "svc",
            Utc.with_ymd_and_hms(2025, 11, 4, 15, 0, 0).unwrap(),
            FetchErrorKind::Timeout,
        );
        let result = reconcile(seeded.as_ref(), &failed);

        prop_assert!(result.cache_write.is_none());
        prop_assert_eq!(result.state.source, StateSource::Cached);
        prop_assert_eq!(result.state.incidents.len(), ids.len());
        prop_assert_eq!(result.state.failure, Some(FetchErrorKind::Timeout));
    }
}
