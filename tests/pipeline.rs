//! End-to-end probe cycles against a local echo server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use pingwatch::api::{router, state::AppState};
use pingwatch::broadcast::ObserverRegistry;
use pingwatch::probes::http::HttpProbe;
use pingwatch::probes::PayloadGenerator;
use pingwatch::scheduler::Monitor;
use pingwatch::storage::{open_memory_pool, SqliteStore, DEFAULT_RECENT_LIMIT};

async fn spawn_echo(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/anything",
        post(move |Json(body): Json<Value>| async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "json": body, "method": "POST", "url": "/anything" }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_black_hole() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

fn monitor_for(addr: SocketAddr, timeout: Duration) -> Monitor {
    let probe = HttpProbe::new(format!("http://{}/anything", addr), timeout).unwrap();
    Monitor::new(
        PayloadGenerator::default(),
        Arc::new(probe),
        Arc::new(SqliteStore::new(open_memory_pool().unwrap())),
        ObserverRegistry::new(),
    )
}

#[tokio::test]
async fn test_empty_history() {
    let addr = spawn_echo(Duration::ZERO).await;
    let monitor = monitor_for(addr, Duration::from_secs(10));

    assert!(monitor.recent(DEFAULT_RECENT_LIMIT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fast_endpoint_is_recorded_and_broadcast() {
    let addr = spawn_echo(Duration::from_millis(50)).await;
    let monitor = monitor_for(addr, Duration::from_secs(10));
    let mut observer = monitor.observers().subscribe();

    let stored = monitor.run_once().await.expect("cycle should store a result");

    assert_eq!(stored.status_code, 200);
    assert!(stored.response_time >= 50, "response_time {}", stored.response_time);
    assert!(stored.response_time < 2_000, "response_time {}", stored.response_time);

    let echoed = stored.parsed_response().unwrap();
    let sent = stored.parsed_request().unwrap();
    assert_eq!(echoed["json"]["data"]["value2"], sent.data.value2);

    let seen = observer.recv().await.unwrap();
    assert_eq!(*seen, stored);
    assert!(observer.try_recv().is_none());

    assert_eq!(monitor.recent(1).await.unwrap(), vec![stored]);
}

#[tokio::test]
async fn test_unresponsive_endpoint_records_failure() {
    let addr = spawn_black_hole().await;
    let timeout = Duration::from_millis(500);
    let monitor = monitor_for(addr, timeout);
    let mut observer = monitor.observers().subscribe();

    let started = std::time::Instant::now();
    let stored = monitor.run_once().await.expect("failure should still be stored");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(stored.status_code, 0);
    assert!(stored.response_time >= 500, "response_time {}", stored.response_time);
    assert!(stored.response_time < 3_000, "response_time {}", stored.response_time);
    assert!(stored.parsed_response().unwrap()["error"]
        .as_str()
        .unwrap()
        .contains("timed out"));
    assert_eq!(observer.recv().await.unwrap().id, stored.id);
}

#[tokio::test]
async fn test_remaining_observer_receives_after_other_leaves() {
    let addr = spawn_echo(Duration::ZERO).await;
    let monitor = monitor_for(addr, Duration::from_secs(10));
    let leaving = monitor.observers().subscribe();
    let mut staying = monitor.observers().subscribe();

    let cycle = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run_once().await })
    };
    drop(leaving);

    let stored = cycle.await.unwrap().unwrap();
    assert_eq!(staying.recv().await.unwrap().id, stored.id);
    assert_eq!(monitor.observers().len(), 1);
}

#[tokio::test]
async fn test_http_trigger_runs_full_cycle() {
    let addr = spawn_echo(Duration::ZERO).await;
    let monitor = monitor_for(addr, Duration::from_secs(10));
    let mut observer = monitor.observers().subscribe();
    let app = router(AppState::new(monitor.clone()), &[]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/monitor/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let triggered: Value = serde_json::from_slice(&body).unwrap();

    let seen = observer.recv().await.unwrap();
    assert_eq!(triggered["id"], seen.id);
    assert_eq!(triggered["statusCode"], 200);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/monitor/responses")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let list: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], seen.id);
}
