use super::*;
use async_trait::async_trait;
use axum::{body, body::Body, http::Request};
use schemagen::DslGenerator;
use shared::domain::{AllowedSubject, NamespaceDefinition, Relation, Rewrite, RewriteChild};
use std::sync::atomic::{AtomicBool, Ordering};
use storage::Storage;
use tokio::sync::Notify;
use tower::ServiceExt;

struct UnreachableDatastore;

#[async_trait]
impl Datastore for UnreachableDatastore {
    async fn is_ready(&self) -> anyhow::Result<bool> {
        anyhow::bail!("dial tcp 10.0.0.1:5432: connection refused")
    }

    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceDefinition>> {
        unreachable!("listing must not follow a failed readiness check")
    }
}

/// Sets its flag when the future holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A readiness check that never completes, as with a hung database.
#[derive(Default)]
struct HungDatastore {
    started: Notify,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Datastore for HungDatastore {
    async fn is_ready(&self) -> anyhow::Result<bool> {
        let _guard = DropFlag(self.dropped.clone());
        self.started.notify_one();
        std::future::pending::<anyhow::Result<bool>>().await
    }

    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceDefinition>> {
        Ok(Vec::new())
    }
}

async fn wait_for_flag(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    flag.load(Ordering::SeqCst)
}

fn test_args() -> DashboardArgs {
    DashboardArgs {
        grpc_addr: "localhost:50051".into(),
        grpc_no_tls: true,
        datastore_engine: "sqlite".into(),
    }
}

fn dashboard(datastore: Arc<dyn Datastore>) -> Dashboard {
    Dashboard::new(test_args(), datastore, Arc::new(DslGenerator))
}

async fn body_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

fn sample_namespaces() -> Vec<NamespaceDefinition> {
    vec![
        NamespaceDefinition::new("user"),
        NamespaceDefinition::new("resource")
            .with_relation(Relation::relation(
                "reader",
                vec![AllowedSubject::direct("user")],
            ))
            .with_relation(Relation::relation(
                "writer",
                vec![AllowedSubject::direct("user")],
            ))
            .with_relation(Relation::permission(
                "write",
                Rewrite::Union(vec![RewriteChild::Computed("writer".into())]),
            ))
            .with_relation(Relation::permission(
                "view",
                Rewrite::Union(vec![
                    RewriteChild::Computed("reader".into()),
                    RewriteChild::Computed("write".into()),
                ]),
            )),
    ]
}

#[tokio::test]
async fn unmigrated_store_renders_migration_guidance() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let app = dashboard(Arc::new(storage)).router();

    let request = Request::get("/").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    let html = body_text(response).await;
    assert!(html.contains("spicedb migrate head --datastore-engine=sqlite"));
}

#[tokio::test]
async fn migrated_store_without_schema_renders_define_guidance() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.migrate().await.expect("migrate");
    let app = dashboard(Arc::new(storage)).router();

    let request = Request::post("/").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Defining the permissions schema"));
}

#[tokio::test]
async fn sample_schema_renders_current_schema_and_sample_calls() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.migrate().await.expect("migrate");
    for definition in sample_namespaces() {
        storage.write_namespace(&definition).await.expect("write");
    }
    let app = dashboard(Arc::new(storage)).router();

    let request = Request::get("/anything/else")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("<pre>definition user {}\n\ndefinition resource {\n"));
    assert!(html.contains("\tpermission view = reader + write\n}</pre>"));
    assert!(html.contains("How to check a permission"));
}

#[tokio::test]
async fn resolution_failure_answers_ok_with_opaque_body() {
    let app = dashboard(Arc::new(UnreachableDatastore)).router();

    let request = Request::get("/").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert_eq!(text, "Internal Error");
    assert!(!text.contains("10.0.0.1"));
}

#[tokio::test]
async fn start_serves_until_stopped() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.migrate().await.expect("migrate");
    let handle = dashboard(Arc::new(storage))
        .start("127.0.0.1:0")
        .await
        .expect("start");
    let url = format!("http://{}/", handle.local_addr());

    let client = reqwest::Client::new();
    let response = client.get(&url).send().await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let html = response.text().await.expect("body");
    assert!(html.contains("Defining the permissions schema"));
    drop(client);

    handle.stop(Duration::from_secs(5)).await.expect("stop");
    assert!(reqwest::get(&url).await.is_err());
}

#[tokio::test]
async fn start_reports_bind_failures() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = dashboard(Arc::new(storage.clone()))
        .start("127.0.0.1:0")
        .await
        .expect("start");

    let addr = first.local_addr().to_string();
    let err = dashboard(Arc::new(storage))
        .start(&addr)
        .await
        .err()
        .expect("second bind should fail");
    assert!(err.to_string().contains("failed to bind dashboard"));

    first.stop(Duration::from_secs(5)).await.expect("stop");
}

#[tokio::test]
async fn dropping_request_drops_pending_store_call() {
    let store = Arc::new(HungDatastore::default());
    let app = dashboard(store.clone()).router();

    let request = Request::get("/").body(Body::empty()).expect("request");
    let outcome = tokio::time::timeout(Duration::from_millis(100), app.oneshot(request)).await;
    assert!(outcome.is_err(), "request should still be pending");

    assert!(store.dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stop_past_grace_cancels_in_flight_store_calls() {
    let store = Arc::new(HungDatastore::default());
    let handle = dashboard(store.clone())
        .start("127.0.0.1:0")
        .await
        .expect("start");
    let url = format!("http://{}/", handle.local_addr());

    let request = tokio::spawn(async move { reqwest::get(&url).await });
    store.started.notified().await;
    assert!(!store.dropped.load(Ordering::SeqCst));

    let err = handle
        .stop(Duration::from_millis(200))
        .await
        .expect_err("hung request should outlive the grace period");
    assert!(err.to_string().contains("did not shut down within 200ms"));

    assert!(
        wait_for_flag(&store.dropped).await,
        "in-flight store call should be dropped after stop"
    );
    request.abort();
}
