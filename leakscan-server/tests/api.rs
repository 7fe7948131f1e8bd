//! API surface tests over the in-memory backends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::{Value, json};

use leakscan_core::detect::DetectionEngine;
use leakscan_core::orchestrate::JobOrchestrator;
use leakscan_core::persistence::JobRepository;
use leakscan_core::persistence::memory::InMemoryScanStore;
use leakscan_core::queue::memory::InMemoryWorkQueue;
use leakscan_core::store::memory::InMemoryObjectStore;
use leakscan_core::types::JobId;
use leakscan_core::worker::{ScanWorker, WorkerConfig};

use leakscan_server::infra::app_state::AppState;
use leakscan_server::infra::config::Config;
use leakscan_server::routes;

struct Fixture {
    server: TestServer,
    store: Arc<InMemoryScanStore>,
    objects: Arc<InMemoryObjectStore>,
    orchestrator: Arc<JobOrchestrator>,
    worker: ScanWorker,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryScanStore::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let queue = Arc::new(InMemoryWorkQueue::new(Duration::from_secs(30), 3));

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        store.clone(),
        objects.clone(),
        queue.clone(),
        100,
    ));
    let worker = ScanWorker::new(
        "api-test-worker",
        store.clone(),
        store.clone(),
        objects.clone(),
        queue.clone(),
        Arc::new(DetectionEngine::with_builtin_detectors()),
        WorkerConfig::default(),
    );

    let config = Arc::new(Config {
        server_host: "127.0.0.1".into(),
        server_port: 0,
        database_url: String::new(),
        object_store_root: PathBuf::new(),
        worker_count: 1,
        queue_visibility_secs: 30,
        queue_max_receives: 3,
        worker_poll_ms: 10,
        worker_batch_size: 10,
        enumeration_page_size: 100,
    });
    let state = AppState {
        config,
        jobs: store.clone(),
        ledger: store.clone(),
        findings: store.clone(),
        orchestrator: orchestrator.clone(),
    };

    Fixture {
        server: TestServer::new(routes::create_router(state)).expect("test server"),
        store,
        objects,
        orchestrator,
        worker,
    }
}

async fn drain(f: &Fixture) {
    while f.worker.poll_once().await.expect("poll") > 0 {}
}

fn job_id_of(body: &Value) -> JobId {
    let raw = body["job_id"].as_str().expect("job_id in response");
    JobId(raw.parse().expect("job_id is a uuid"))
}

#[tokio::test]
async fn health_is_ok() {
    let f = fixture();
    let response = f.server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn scan_request_is_accepted_with_a_job_id() {
    let f = fixture();
    let response = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "docs" }))
        .await;
    assert_eq!(response.status_code(), 202);

    let body: Value = response.json();
    let job_id = job_id_of(&body);
    assert!(f.store.get_job(job_id).await.unwrap().is_some());
}

#[tokio::test]
async fn empty_bucket_is_rejected() {
    let f = fixture();
    let response = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "  " }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: Value = response.json();
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("bucket")
    );
}

#[tokio::test]
async fn unknown_job_is_a_404() {
    let f = fixture();
    let response = f
        .server
        .get(&format!("/jobs/{}", JobId::new()))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn job_status_reports_ledger_counts() {
    let f = fixture();
    f.objects
        .put("docs", "a.txt", "ssn 123-45-6789 and alice@example.com");
    f.objects.put("docs", "b.txt", "nothing sensitive");

    let accepted = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "docs" }))
        .await;
    let job_id = job_id_of(&accepted.json());

    // Seed deterministically instead of racing the spawned enumeration;
    // re-seeding the same objects is idempotent either way.
    let job = f.store.get_job(job_id).await.unwrap().expect("job");
    f.orchestrator.seed_job(&job).await.unwrap();
    drain(&f).await;

    let response = f.server.get(&format!("/jobs/{job_id}")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["job"]["bucket"], "docs");
    assert_eq!(body["counts"]["succeeded"], 2);
}

#[tokio::test]
async fn job_status_nests_the_job_under_its_own_key() {
    let f = fixture();
    let accepted = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "docs", "prefix": "hr/" }))
        .await;
    let job_id = job_id_of(&accepted.json());

    let body: Value = f.server.get(&format!("/jobs/{job_id}")).await.json();
    let job = body.get("job").expect("job envelope");
    assert_eq!(job["job_id"], job_id.to_string());
    assert_eq!(job["bucket"], "docs");
    assert_eq!(job["prefix"], "hr/");
    assert!(job.get("created_at").is_some());
    assert!(body.get("counts").is_some());
    // Job fields live only inside the envelope, not at the top level.
    assert!(body.get("bucket").is_none());
}

#[tokio::test]
async fn results_paginate_with_a_chained_cursor() {
    let f = fixture();
    // Five SSNs on distinct lines, each a separate finding.
    let content = (0..5)
        .map(|i| format!("row {i}: 123-45-678{i}"))
        .collect::<Vec<_>>()
        .join("\n");
    f.objects.put("docs", "bulk.txt", content);

    let accepted = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "docs" }))
        .await;
    let job_id = job_id_of(&accepted.json());
    let job = f.store.get_job(job_id).await.unwrap().expect("job");
    f.orchestrator.seed_job(&job).await.unwrap();
    drain(&f).await;

    let first: Value = f
        .server
        .get("/results")
        .add_query_param("bucket", "docs")
        .add_query_param("limit", "3")
        .await
        .json();
    assert_eq!(first["items"].as_array().unwrap().len(), 3);
    let cursor = first["next_cursor"].as_i64().expect("full page has cursor");

    let second: Value = f
        .server
        .get("/results")
        .add_query_param("bucket", "docs")
        .add_query_param("limit", "3")
        .add_query_param("cursor", cursor.to_string())
        .await
        .json();
    assert_eq!(second["items"].as_array().unwrap().len(), 2);
    assert!(second["next_cursor"].is_null());

    // No raw values anywhere in the payload.
    for item in first["items"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["items"].as_array().unwrap())
    {
        let masked = item["masked_match"].as_str().unwrap();
        assert!(!masked.contains("123-45"), "unmasked value: {masked}");
    }
}

#[tokio::test]
async fn results_filter_by_key_prefix() {
    let f = fixture();
    f.objects.put("docs", "hr/a.txt", "ssn 123-45-6789");
    f.objects.put("docs", "eng/b.txt", "ssn 987-65-4321");

    let accepted = f
        .server
        .post("/scan")
        .json(&json!({ "bucket": "docs" }))
        .await;
    let job_id = job_id_of(&accepted.json());
    let job = f.store.get_job(job_id).await.unwrap().expect("job");
    f.orchestrator.seed_job(&job).await.unwrap();
    drain(&f).await;

    let body: Value = f
        .server
        .get("/results")
        .add_query_param("prefix", "hr/")
        .await
        .json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["key"], "hr/a.txt");
}
