//! Integration Test: ポーリングラウンド
//!
//! フェイクソース → 照合 → メトリクス → キャッシュ の一連の流れを
//! 複数ラウンドにわたって確認する。

use crate::support::{
    harness, incident, maintenance, service, snapshot, value, with_incidents, Harness,
    ScriptedSource, Step,
};
use statuspage_exporter::cache::CacheStore;
use statuspage_exporter::common::error::{FetchError, FetchErrorKind};
use statuspage_exporter::reconcile::{RecordChange, StateSource};
use statuspage_exporter::types::{HealthStatus, Impact};
use std::time::Duration;

const INCIDENT: &str = "statuspage_incident_info";
const FAILURES: &str = "statuspage_check_failures_total";

#[tokio::test]
async fn test_slow_service_does_not_block_others() {
    let source = ScriptedSource::new();
    source.push("fast", Step::Ok(snapshot("fast", HealthStatus::Operational)));
    source.push(
        "slow",
        Step::Slow(
            Duration::from_secs(10),
            snapshot("slow", HealthStatus::Operational),
        ),
    );
    let Harness {
        poller, publisher, ..
    } = harness(vec![service("fast", "Fast"), service("slow", "Slow")], source);
    let poller = poller.with_timeout(Duration::from_millis(500));

    let report = poller.run_round().await;

    assert!(
        report.elapsed < Duration::from_secs(2),
        "round took {:?}",
        report.elapsed
    );
    assert!(report.state("fast").unwrap().fetch_succeeded());
    let slow = report.state("slow").unwrap();
    assert_eq!(slow.source, StateSource::Unknown);
    assert_eq!(slow.failure, Some(FetchErrorKind::Timeout));

    let text = publisher.render().unwrap();
    assert_eq!(
        value(&text, "statuspage_service_status", &[("service_name", "Fast")]),
        Some(1.0)
    );
    assert_eq!(
        value(
            &text,
            FAILURES,
            &[("service_name", "Slow"), ("error_type", "timeout")]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_failed_fetch_falls_back_to_cached_state() {
    let source = ScriptedSource::new();
    source
        .push(
            "github",
            Step::Ok(with_incidents(
                snapshot("github", HealthStatus::Degraded),
                vec![incident("INC-1", Impact::Minor)],
            )),
        )
        .push(
            "github",
            Step::Fail(FetchError::transport("connection reset")),
        );
    let h = harness(vec![service("github", "GitHub")], source);

    h.poller.run_round().await;
    let report = h.poller.run_round().await;

    let state = report.state("github").unwrap();
    assert_eq!(state.source, StateSource::Cached);
    assert_eq!(state.overall_status, Some(HealthStatus::Degraded));
    assert_eq!(state.incidents.len(), 1);

    let text = h.publisher.render().unwrap();
    let github = [("service_name", "GitHub")];
    assert_eq!(value(&text, "statuspage_service_status", &github), Some(0.0));
    assert_eq!(value(&text, "statuspage_probe_check", &github), Some(0.0));
    assert_eq!(
        value(&text, "statuspage_response_time_seconds", &github),
        None
    );
    assert_eq!(
        value(
            &text,
            FAILURES,
            &[("service_name", "GitHub"), ("error_type", "transport")]
        ),
        Some(1.0)
    );
    assert_eq!(
        value(&text, INCIDENT, &[("incident_id", "INC-1")]),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_first_failure_without_cache_is_unknown() {
    let source = ScriptedSource::new();
    source.push("github", Step::Fail(FetchError::parse("unexpected EOF")));
    let h = harness(vec![service("github", "GitHub")], source);

    let report = h.poller.run_round().await;

    assert_eq!(report.state("github").unwrap().source, StateSource::Unknown);
    let text = h.publisher.render().unwrap();
    let github = [("service_name", "GitHub")];
    assert_eq!(value(&text, "statuspage_service_status", &github), None);
    assert_eq!(value(&text, "statuspage_probe_check", &github), Some(0.0));
    assert!(value(&text, "statuspage_application_timestamp", &github).is_some());
    assert!(h.cache.load("github").await.unwrap().is_none());
}

#[tokio::test]
async fn test_impact_escalation_keeps_single_series() {
    let source = ScriptedSource::new();
    let base = snapshot("github", HealthStatus::Degraded);
    source
        .push(
            "github",
            Step::Ok(with_incidents(
                base.clone(),
                vec![incident("INC-1", Impact::Minor)],
            )),
        )
        .push(
            "github",
            Step::Ok(with_incidents(base, vec![incident("INC-1", Impact::Major)])),
        );
    let h = harness(vec![service("github", "GitHub")], source);

    h.poller.run_round().await;
    let report = h.poller.run_round().await;

    assert_eq!(
        report.state("github").unwrap().incidents[0].change,
        RecordChange::Updated
    );
    let text = h.publisher.render().unwrap();
    assert_eq!(
        value(&text, INCIDENT, &[("incident_id", "INC-1")]),
        Some(1.0)
    );
    assert_eq!(
        value(
            &text,
            INCIDENT,
            &[("incident_id", "INC-1"), ("impact", "major")]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_resolved_incident_clears_exactly_once() {
    let source = ScriptedSource::new();
    let base = snapshot("github", HealthStatus::Operational);
    source
        .push(
            "github",
            Step::Ok(with_incidents(
                base.clone(),
                vec![incident("INC-1", Impact::Minor)],
            )),
        )
        .push("github", Step::Ok(base));
    let h = harness(vec![service("github", "GitHub")], source);
    let inc = [("incident_id", "INC-1")];

    h.poller.run_round().await;
    assert_eq!(value(&h.publisher.render().unwrap(), INCIDENT, &inc), Some(1.0));

    let report = h.poller.run_round().await;
    assert!(report.state("github").unwrap().incidents[0].is_resolved());
    assert_eq!(value(&h.publisher.render().unwrap(), INCIDENT, &inc), Some(0.0));
    let cached = h.cache.load("github").await.unwrap().unwrap();
    assert!(cached.incidents.is_empty());

    h.poller.run_round().await;
    assert_eq!(value(&h.publisher.render().unwrap(), INCIDENT, &inc), None);
}

#[tokio::test]
async fn test_unchanged_state_is_idempotent() {
    let source = ScriptedSource::new();
    let mut steady = with_incidents(
        snapshot("github", HealthStatus::Degraded),
        vec![incident("INC-1", Impact::Minor)],
    );
    steady.maintenances = vec![maintenance("MNT-1")];
    source.push("github", Step::Ok(steady));
    let h = harness(vec![service("github", "GitHub")], source);

    h.poller.run_round().await;
    let first = h.publisher.render().unwrap();
    let report = h.poller.run_round().await;
    let second = h.publisher.render().unwrap();

    let state = report.state("github").unwrap();
    assert!(state
        .incidents
        .iter()
        .all(|u| u.change == RecordChange::Unchanged));
    assert!(state
        .maintenances
        .iter()
        .all(|u| u.change == RecordChange::Unchanged));

    let info_lines = |text: &str| -> Vec<String> {
        text.lines()
            .filter(|l| {
                l.starts_with("statuspage_incident_info{")
                    || l.starts_with("statuspage_maintenance_info{")
            })
            .map(str::to_string)
            .collect()
    };
    assert_eq!(info_lines(&first), info_lines(&second));
}

#[tokio::test]
async fn test_overlapping_round_is_skipped() {
    let source = ScriptedSource::new();
    source.push(
        "github",
        Step::Slow(
            Duration::from_millis(300),
            snapshot("github", HealthStatus::Operational),
        ),
    );
    let h = harness(vec![service("github", "GitHub")], source);

    let background = h.poller.clone();
    let first = tokio::spawn(async move { background.run_round().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = h.poller.run_round().await;
    assert!(second.skipped);
    assert!(second.states.is_empty());

    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(h.source.calls(), 1);
}
