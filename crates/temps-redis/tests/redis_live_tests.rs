//! Tests against a running Redis server
//!
//! Tests needing a server are ignored; run them with
//! `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.

use std::time::Duration;

use serde_json::json;
use temps_core::{DecorationScope, PluginServer};
use temps_redis::{RedisBundle, RedisClients, RedisPlugin, RedisPluginError, PLUGIN_NAME};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn test_live_set_and_get() {
    let server = PluginServer::new();
    server
        .register(&RedisPlugin::new(), json!({ "settings": redis_url() }))
        .await
        .unwrap();

    let clients = server
        .plugin_state::<RedisClients>(PLUGIN_NAME, "client")
        .unwrap();
    let mut conn = clients.single().unwrap().connection();

    redis::cmd("SET")
        .arg("temps-redis:live")
        .arg("ok")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();
    let value: String = redis::cmd("GET")
        .arg("temps-redis:live")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(value, "ok");

    server.stop().await;
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn test_live_global_decoration_pings() {
    let server = PluginServer::new();
    server
        .register(
            &RedisPlugin::new(),
            json!({ "settings": redis_url(), "decorate": true }),
        )
        .await
        .unwrap();

    let bundle = server
        .decoration::<RedisBundle>(DecorationScope::Request, "redis")
        .unwrap();
    let mut conn = bundle.client.single().unwrap().connection();
    let pong: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
    assert_eq!(pong, "PONG");

    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_server_fails_registration_fast() {
    let server = PluginServer::new();
    let mut logs = server.subscribe_logs();

    // Nothing listens on port 1
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        server.register(
            &RedisPlugin::new(),
            json!({ "settings": "redis://127.0.0.1:1" }),
        ),
    )
    .await
    .expect("registration should fail without retrying");

    let err = result.unwrap_err();
    assert!(matches!(
        err.registration_source::<RedisPluginError>(),
        Some(RedisPluginError::Connection { .. })
    ));

    let error_log = logs.try_recv().unwrap();
    assert!(error_log.has_tag("error"));
    assert!(error_log.data.starts_with("Failed to connect to redis://127.0.0.1:1/0: "));
    assert!(!server.is_registered(PLUGIN_NAME));
}
