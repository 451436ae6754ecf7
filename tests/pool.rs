//! Pool dispatch behavior: rotation, timeout failover, fallback.

use std::time::Duration;

use reqwest::Method;
use sockstream::config::{ParsedProxy, ProxyKind};
use sockstream::pool::{PoolError, ProxyEntry, ProxyPool, Rotation};

mod common;

fn descriptor(id: usize) -> ParsedProxy {
    ParsedProxy {
        kind: ProxyKind::Socks5,
        address: format!("p{id}:1080"),
        username: None,
        password: None,
    }
}

fn entry(id: usize, timeout: Option<Duration>) -> ProxyEntry {
    ProxyEntry::new(
        descriptor(id),
        common::tagged_client(&format!("p{id}"), timeout),
    )
}

#[tokio::test]
async fn round_robin_cycles_through_entries_in_order() {
    let (origin, _) = common::start_echo_origin(Duration::ZERO).await;
    let pool = ProxyPool::from_entries(
        vec![entry(1, None), entry(2, None), entry(3, None)],
        Rotation::RoundRobin,
    );

    let mut served_by = Vec::new();
    for _ in 0..6 {
        let req = common::pool_request(Method::GET, &format!("http://{origin}/"), None);
        let resp = pool.execute(req).await.unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        served_by.push(common::field(&body, "x_proxy_id"));
    }

    assert_eq!(served_by, vec!["p1", "p2", "p3", "p1", "p2", "p3"]);
}

#[tokio::test]
async fn timeout_failover_marks_entry_unhealthy_and_retries() {
    // The origin answers after 300 ms; the first entry gives up at 50 ms.
    let (origin, _) = common::start_echo_origin(Duration::from_millis(300)).await;
    let pool = ProxyPool::from_entries(
        vec![
            entry(1, Some(Duration::from_millis(50))),
            entry(2, None),
        ],
        Rotation::RoundRobin,
    );

    let req = common::pool_request(Method::GET, &format!("http://{origin}/"), None);
    let resp = pool.execute(req).await.unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(common::field(&body, "x_proxy_id"), "p2");

    let status = pool.status();
    assert!(!status[0].healthy, "timed-out entry should be unhealthy");
    assert!(!status[0].last_error.is_empty());
    assert!(status[1].healthy);
    assert_eq!(pool.healthy_count(), 1);
}

#[tokio::test]
async fn body_is_replayed_byte_identical_on_retry() {
    let (origin, seen) = common::start_echo_origin(Duration::from_millis(300)).await;
    let pool = ProxyPool::from_entries(
        vec![
            entry(1, Some(Duration::from_millis(50))),
            entry(2, None),
        ],
        Rotation::RoundRobin,
    );

    let payload = "replay-me: \u{1F980} bytes";
    let req = common::pool_request(Method::POST, &format!("http://{origin}/submit"), Some(payload));
    let resp = pool.execute(req).await.unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(common::field(&body, "body"), payload);

    // Every attempt that reached the origin carried identical bytes.
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    for received in seen.iter() {
        assert_eq!(received, payload);
    }
}

#[tokio::test]
async fn non_timeout_failure_is_not_retried() {
    // Nothing listens on the target port: connection refused, not a timeout.
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let pool = ProxyPool::from_entries(
        vec![entry(1, None), entry(2, None)],
        Rotation::RoundRobin,
    );

    let req = common::pool_request(Method::GET, &format!("http://{closed}/"), None);
    let err = pool.execute(req).await.unwrap_err();
    assert!(
        matches!(err, PoolError::Upstream(_)),
        "expected first-failure-wins, got {err}"
    );
    // No timeout occurred, so nothing was marked unhealthy.
    assert_eq!(pool.healthy_count(), 2);
}

#[tokio::test]
async fn all_unhealthy_pool_still_serves_via_fallback() {
    let (origin, _) = common::start_echo_origin(Duration::ZERO).await;
    let first = entry(1, None);
    let second = entry(2, None);
    first.set_healthy(false, "probe failed");
    second.set_healthy(false, "probe failed");
    let pool = ProxyPool::from_entries(vec![first, second], Rotation::RoundRobin);
    assert_eq!(pool.healthy_count(), 0);

    let req = common::pool_request(Method::GET, &format!("http://{origin}/"), None);
    let resp = pool.execute(req).await.unwrap();
    assert!(resp.status().is_success());
}
