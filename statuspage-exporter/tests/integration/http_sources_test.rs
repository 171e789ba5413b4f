//! Integration Test: HTTPソース
//!
//! wiremock で JSON API とHTMLページを立て、本番用のルーター経由で
//! 1ラウンド実行した結果を `/metrics` の出力で確認する。

use crate::support::value;
use statuspage_exporter::cache::{CacheStore, FileCacheStore};
use statuspage_exporter::metrics::MetricPublisher;
use statuspage_exporter::poller::StatusPoller;
use statuspage_exporter::source::SourceRouter;
use statuspage_exporter::types::{ServiceConfig, SourceKind};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUMMARY: &str = r#"{
    "page": {"id": "p1", "name": "Acme", "url": "https://status.acme.test"},
    "status": {"indicator": "major", "description": "Partial System Outage"},
    "components": [
        {"name": "API", "status": "major_outage", "updated_at": "2025-11-04T13:00:00Z"},
        {"name": "Dashboard", "status": "operational", "updated_at": "2025-11-04T12:00:00Z"}
    ],
    "incidents": [
        {
            "id": "abc123",
            "name": "API unavailable",
            "status": "identified",
            "impact": "major",
            "shortlink": "https://stspg.io/abc123",
            "started_at": "2025-11-04T12:58:00Z",
            "components": [{"name": "API"}]
        }
    ],
    "scheduled_maintenances": []
}"#;

const PAGE: &str = r#"<html><body>
<div class="MuiButtonBase-root MuiAccordionSummary-root">
  <p class="MuiTypography-root MuiTypography-body1">Email Delivery</p>
  <span>Operational</span>
</div>
<div class="MuiButtonBase-root MuiAccordionSummary-root">
  <p class="MuiTypography-root MuiTypography-body1">Reporting</p>
  <span>Operational</span>
</div>
</body></html>"#;

async fn mock_sources() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/summary.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUMMARY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_round_against_live_http_sources() {
    let server = mock_sources().await;
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FileCacheStore::new(dir.path()));
    let publisher = Arc::new(MetricPublisher::new().unwrap());

    let services = vec![
        ServiceConfig::new(
            "acme",
            "Acme",
            format!("{}/api/v2/summary.json", server.uri()),
            SourceKind::Api,
        ),
        ServiceConfig::new(
            "outreach",
            "Outreach",
            format!("{}/status", server.uri()),
            SourceKind::Scrape,
        ),
    ];
    let poller = StatusPoller::new(
        services,
        Arc::new(SourceRouter::http()),
        cache.clone(),
        publisher.clone(),
    )
    .with_timeout(Duration::from_secs(5));

    let report = poller.run_round().await;
    assert_eq!(report.failed_count(), 0);

    let text = publisher.render().unwrap();
    assert_eq!(
        value(&text, "statuspage_service_status", &[("service_name", "Acme")]),
        Some(0.0)
    );
    assert_eq!(
        value(
            &text,
            "statuspage_service_status",
            &[("service_name", "Outreach")]
        ),
        Some(1.0)
    );
    assert_eq!(
        value(
            &text,
            "statuspage_component_status",
            &[("service_name", "Acme"), ("component_name", "API")]
        ),
        Some(0.0)
    );
    assert_eq!(
        value(
            &text,
            "statuspage_component_timestamp",
            &[("service_name", "Acme"), ("component_name", "API")]
        ),
        Some(1_762_261_200_000.0)
    );
    assert_eq!(
        value(
            &text,
            "statuspage_incident_info",
            &[
                ("incident_id", "abc123"),
                ("impact", "major"),
                ("shortlink", "https://stspg.io/abc123"),
                ("started_at", "2025-11-04T12:58:00Z"),
                ("affected_components", "API"),
            ]
        ),
        Some(1.0)
    );
    assert_eq!(
        value(
            &text,
            "statuspage_component_status",
            &[("service_name", "Outreach"), ("component_name", "Reporting")]
        ),
        Some(1.0)
    );

    let entry = cache.load("acme").await.unwrap().unwrap();
    assert_eq!(entry.incidents.len(), 1);
    assert_eq!(entry.components.len(), 2);
    assert!(cache.load("outreach").await.unwrap().is_some());
}

#[tokio::test]
async fn test_missing_page_is_recorded_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let publisher = Arc::new(MetricPublisher::new().unwrap());
    let poller = StatusPoller::new(
        vec![ServiceConfig::new(
            "gone",
            "Gone",
            format!("{}/api/v2/summary.json", server.uri()),
            SourceKind::Api,
        )],
        Arc::new(SourceRouter::http()),
        Arc::new(statuspage_exporter::cache::MemoryCacheStore::new()),
        publisher.clone(),
    )
    .with_timeout(Duration::from_secs(5));

    poller.run_round().await;

    let text = publisher.render().unwrap();
    assert_eq!(
        value(
            &text,
            "statuspage_check_failures_total",
            &[("service_name", "Gone"), ("error_type", "transport")]
        ),
        Some(1.0)
    );
    assert_eq!(
        value(&text, "statuspage_probe_check", &[("service_name", "Gone")]),
        Some(0.0)
    );
}
