//! Token workflow and endpoint driven through the refresh engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, eventually, identity_pem, FakeProvider};
use identityd::api::TokenResponse;
use identityd::cache::TokenCache;
use identityd::engine::{EngineState, RefreshEngine};
use identityd::workflows::TokenWorkflow;
use identityd::IdentityConfig;
use tokio_util::sync::CancellationToken;

fn write_identity(config: &IdentityConfig) {
    let (cert, key) = identity_pem("pod-0");
    std::fs::write(&config.cert_file, cert).unwrap();
    std::fs::write(&config.key_file, key).unwrap();
}

async fn request(addr: std::net::SocketAddr, domain: &str, role: &str) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("http://{}/", addr));
    if !domain.is_empty() {
        request = request.header("X-Athenz-Domain", domain);
    }
    if !role.is_empty() {
        request = request.header("X-Athenz-Role", role);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_tokens_are_served_and_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.token_refresh = Duration::from_secs(3600);
    write_identity(&config);
    let cache = Arc::new(TokenCache::new());

    let workflow =
        Arc::new(TokenWorkflow::new(Arc::new(config.clone()), FakeProvider::new(true), cache));
    let engine = RefreshEngine::new(workflow.clone(), TokenWorkflow::engine_settings(&config));
    let stop = CancellationToken::new();
    let handle = engine.start(stop.clone()).await.unwrap();
    let addr = workflow.server_addr().await.unwrap();

    let response = request(addr, "media.prod", "readers").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["authorization"], "bearer at0");
    assert_eq!(response.headers()["yahoo-role-auth"], "rt0");
    let body: TokenResponse = response.json().await.unwrap();
    assert_eq!(body, TokenResponse { accesstoken: "at0".into(), roletoken: "rt0".into() });

    assert_eq!(request(addr, "", "readers").await.status(), 400);
    assert_eq!(request(addr, "sports", "readers").await.status(), 404);
    assert_eq!(request(addr, "media.prod", "admins").await.status(), 404);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("tokens/media.prod:role.readers.accesstoken")).unwrap(),
        "at0"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("tokens/media.prod:role.readers.roletoken")).unwrap(),
        "rt0"
    );

    stop.cancel();
    handle.join().await.unwrap();
    assert!(workflow.server_addr().await.is_none());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_trigger_refreshes_served_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.token_refresh = Duration::from_secs(3600);
    write_identity(&config);

    let workflow = Arc::new(TokenWorkflow::new(
        Arc::new(config.clone()),
        FakeProvider::new(true),
        Arc::new(TokenCache::new()),
    ));
    let engine = RefreshEngine::new(workflow.clone(), TokenWorkflow::engine_settings(&config));
    let stop = CancellationToken::new();
    let handle = engine.start(stop.clone()).await.unwrap();

    assert!(handle.trigger());
    let cache = workflow.cache().clone();
    assert!(
        eventually(|| {
            cache.lookup("media.prod", "readers").found().map(|pair| pair.access_token)
                == Some("at1".to_string())
        })
        .await
    );

    let addr = workflow.server_addr().await.unwrap();
    assert_eq!(request(addr, "media.prod", "readers").await.headers()["authorization"], "bearer at1");

    stop.cancel();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_init_mode_without_identity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.init = true;

    let workflow = Arc::new(TokenWorkflow::new(
        Arc::new(config.clone()),
        FakeProvider::new(true),
        Arc::new(TokenCache::new()),
    ));
    let engine = RefreshEngine::new(workflow.clone(), TokenWorkflow::engine_settings(&config));

    assert!(engine.start(CancellationToken::new()).await.is_err());
    assert!(workflow.server_addr().await.is_none());
}

#[tokio::test]
async fn test_server_runs_before_first_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let workflow = Arc::new(TokenWorkflow::new(
        Arc::new(config.clone()),
        FakeProvider::new(true),
        Arc::new(TokenCache::new()),
    ));
    let engine = RefreshEngine::new(workflow.clone(), TokenWorkflow::engine_settings(&config));
    let stop = CancellationToken::new();
    let handle = engine.start(stop.clone()).await.unwrap();
    let addr = workflow.server_addr().await.unwrap();

    assert_eq!(request(addr, "media.prod", "readers").await.status(), 404);

    // Credentials appear; a later tick picks them up.
    write_identity(&config);
    let cache = workflow.cache().clone();
    assert!(eventually(|| cache.lookup("media.prod", "readers").found().is_some()).await);
    assert_eq!(request(addr, "media.prod", "readers").await.status(), 200);

    stop.cancel();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_port_in_use_keeps_token_files_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = config(dir.path());
    config.token_server_addr = occupied.local_addr().unwrap().to_string();
    write_identity(&config);

    let provider = FakeProvider::new(true);
    let workflow = Arc::new(TokenWorkflow::new(
        Arc::new(config.clone()),
        provider.clone(),
        Arc::new(TokenCache::new()),
    ));
    let engine = RefreshEngine::new(workflow.clone(), TokenWorkflow::engine_settings(&config));
    let stop = CancellationToken::new();
    let handle = engine.start(stop.clone()).await.unwrap();

    assert_eq!(handle.state(), EngineState::Steady);
    assert!(workflow.server_addr().await.is_none());

    // Later ticks still refresh the files on disk.
    let token_file = dir.path().join("tokens/media.prod:role.readers.accesstoken");
    assert!(eventually(|| std::fs::read_to_string(&token_file).is_ok_and(|t| t != "at0")).await);

    stop.cancel();
    handle.join().await.unwrap();
    drop(occupied);
}
