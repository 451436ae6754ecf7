//! End-to-end scenarios through the full server: middleware chain, header
//! rewrites, and failure surfaces.

use std::sync::Arc;
use std::time::Duration;

use sockstream::config::Config;
use sockstream::http::Server;
use sockstream::lifecycle::Shutdown;
use sockstream::pool::ProxyPool;

mod common;

async fn spawn_proxy(mut cfg: Config, listen: &str) -> Shutdown {
    cfg.listen = listen.to_string();
    let pool = Arc::new(ProxyPool::new(&cfg.proxy).unwrap());
    let server = Server::new(cfg, pool).unwrap();

    let shutdown = Shutdown::new();
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(&run_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown
}

fn config_for(target: &str) -> Config {
    Config {
        target: target.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn forwards_to_origin_with_header_rewrites() {
    let (origin, _) = common::start_echo_origin(Duration::ZERO).await;
    let mut cfg = config_for(&format!("http://{origin}"));
    cfg.headers
        .add
        .insert("X-Injected".to_string(), "yes".to_string());
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28281").await;

    let resp = common::test_client()
        .get("http://127.0.0.1:28281/hello?x=1")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(common::field(&body, "method"), "GET");
    assert_eq!(common::field(&body, "path"), "/hello");
    assert_eq!(common::field(&body, "query"), "x=1");
    // rewrite_host defaults to true, so the origin sees its own authority.
    assert_eq!(common::field(&body, "host"), origin.to_string());
    assert_eq!(common::field(&body, "x_injected"), "yes");
    assert_eq!(common::field(&body, "x_forwarded_for"), "127.0.0.1");
}

#[tokio::test]
async fn healthz_answers_ok_without_touching_origin() {
    let cfg = config_for("http://127.0.0.1:9");
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28282").await;

    let resp = common::test_client()
        .get("http://127.0.0.1:28282/healthz")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn cors_preflight_short_circuits_with_204() {
    let cfg = config_for("http://127.0.0.1:9");
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28283").await;

    let resp = common::test_client()
        .request(reqwest::Method::OPTIONS, "http://127.0.0.1:28283/any")
        .header("Origin", "https://x")
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(
        resp.headers()
            .get("access-control-max-age")
            .and_then(|v| v.to_str().ok()),
        Some("600")
    );
}

#[tokio::test]
async fn access_control_blocks_and_permits_by_cidr() {
    let (origin, _) = common::start_echo_origin(Duration::ZERO).await;
    let mut cfg = config_for(&format!("http://{origin}"));
    cfg.access.allow = vec!["192.168.0.0/16".to_string()];
    cfg.access.block = vec!["192.168.1.0/24".to_string()];
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28284").await;

    let denied = common::test_client()
        .get("http://127.0.0.1:28284/")
        .header("X-Forwarded-For", "192.168.1.50")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(denied.status(), 403);
    assert_eq!(denied.text().await.unwrap(), "forbidden");

    let permitted = common::test_client()
        .get("http://127.0.0.1:28284/")
        .header("X-Forwarded-For", "192.168.2.10")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(permitted.status(), 200);
}

#[tokio::test]
async fn upstream_failure_surfaces_as_502() {
    // Nothing listens on the origin port.
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let cfg = config_for(&format!("http://{closed}"));
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28285").await;

    let resp = common::test_client()
        .get("http://127.0.0.1:28285/")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(resp.status(), 502);
    assert_eq!(resp.text().await.unwrap(), "proxy error");
}

#[tokio::test]
async fn post_body_reaches_origin_through_direct_pool() {
    let (origin, seen) = common::start_echo_origin(Duration::ZERO).await;
    let cfg = config_for(&format!("http://{origin}"));
    let _shutdown = spawn_proxy(cfg, "127.0.0.1:28286").await;

    let resp = common::test_client()
        .post("http://127.0.0.1:28286/submit")
        .body("streamed payload")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(common::field(&body, "body"), "streamed payload");
    assert_eq!(seen.lock().unwrap().as_slice(), ["streamed payload"]);
}
