//! Release checker tests against a mock feed.

use hub_update::UpdateError;
use hub_update::config::ReleaseConfig;
use hub_update::update::ReleaseChecker;
use hub_update::version::PrereleaseType;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn release(tag: &str, prerelease: bool, draft: bool) -> Value {
    json!({
        "tag_name": tag,
        "name": format!("Release {tag}"),
        "body": format!("Changes in {tag}"),
        "draft": draft,
        "prerelease": prerelease,
        "published_at": "2025-03-01T12:00:00Z",
        "assets": [
            {
                "name": format!("hub-{tag}-darwin-arm64.zip"),
                "size": 2048,
                "browser_download_url": format!("https://dl.example.com/{tag}/darwin.zip")
            },
            {
                "name": format!("hub-{tag}-windows-amd64.zip"),
                "size": 4096,
                "browser_download_url": format!("https://dl.example.com/{tag}/windows.zip")
            }
        ]
    })
}

fn feed() -> Value {
    json!([
        release("v1.0.0", false, false),
        release("v1.1.0", false, false),
        release("v1.2.0-beta", true, false),
    ])
}

fn config(server: &MockServer, current: &str) -> ReleaseConfig {
    ReleaseConfig {
        feed_url: format!("{}/releases", server.uri()),
        platform: "windows-amd64".to_owned(),
        current_version: current.to_owned(),
        ..ReleaseConfig::default()
    }
}

#[tokio::test]
async fn stable_policy_picks_latest_stable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    let info = checker.check_for_updates().await.unwrap();

    assert!(info.has_update);
    assert_eq!(info.latest_version, "v1.1.0");
    assert_eq!(info.current_version, "v1.0.0");
    assert_eq!(info.asset_name, "hub-v1.1.0-windows-amd64.zip");
    assert_eq!(info.download_url, "https://dl.example.com/v1.1.0/windows.zip");
    assert_eq!(info.size, 4096);
    assert!(!info.is_prerelease);
}

#[tokio::test]
async fn prerelease_policy_picks_beta() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .mount(&server)
        .await;

    let mut cfg = config(&server, "v1.1.0");
    cfg.include_prerelease = true;
    let checker = ReleaseChecker::new(cfg).unwrap();
    let info = checker.check_for_updates().await.unwrap();

    assert!(info.has_update);
    assert_eq!(info.latest_version, "v1.2.0-beta");
    assert!(info.is_prerelease);
    assert_eq!(info.prerelease_type, PrereleaseType::Beta);
}

#[tokio::test]
async fn drafts_are_never_offered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            release("v1.0.0", false, false),
            release("v3.0.0", false, true),
        ])))
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    let info = checker.check_for_updates().await.unwrap();
    assert!(!info.has_update);
    assert_eq!(info.latest_version, "v1.0.0");
}

#[tokio::test]
async fn second_check_within_ttl_uses_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .expect(1)
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    let first = checker.check_for_updates().await.unwrap();
    let second = checker.check_for_updates().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn invalidated_cache_refetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .expect(2)
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    checker.check_for_updates().await.unwrap();
    checker.invalidate_cache();
    assert!(checker.cached().is_none());
    checker.check_for_updates().await.unwrap();
}

#[tokio::test]
async fn rate_limited_feed_falls_back_to_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rate limit exceeded"))
        .mount(&server)
        .await;

    let mut cfg = config(&server, "v1.0.0");
    cfg.cache_ttl_hours = 0;
    let checker = ReleaseChecker::new(cfg).unwrap();

    let fresh = checker.check_for_updates().await.unwrap();
    let fallback = checker.check_for_updates().await.unwrap();
    assert_eq!(fresh, fallback);
    assert_eq!(fallback.latest_version, "v1.1.0");
}

#[tokio::test]
async fn rate_limit_without_cache_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    let err = checker.check_for_updates().await.unwrap_err();
    assert!(matches!(err, UpdateError::Status { status: 429, .. }));
}

#[tokio::test]
async fn server_error_does_not_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut cfg = config(&server, "v1.0.0");
    cfg.cache_ttl_hours = 0;
    let checker = ReleaseChecker::new(cfg).unwrap();

    checker.check_for_updates().await.unwrap();
    let err = checker.check_for_updates().await.unwrap_err();
    assert!(matches!(err, UpdateError::Status { status: 500, .. }));
}

#[tokio::test]
async fn malformed_feed_is_feed_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let checker = ReleaseChecker::new(config(&server, "v1.0.0")).unwrap();
    let err = checker.check_for_updates().await.unwrap_err();
    assert!(matches!(err, UpdateError::Feed(_)));
}

#[tokio::test]
async fn unreachable_feed_without_cache_propagates() {
    let cfg = ReleaseConfig {
        feed_url: "http://127.0.0.1:1/releases".to_owned(),
        timeout_secs: 2,
        ..ReleaseConfig::default()
    };
    let checker = ReleaseChecker::new(cfg).unwrap();
    let err = checker.check_for_updates().await.unwrap_err();
    assert!(matches!(err, UpdateError::Http(_)));
}

#[tokio::test]
async fn background_check_populates_cache_and_stops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed()))
        .mount(&server)
        .await;

    let checker = std::sync::Arc::new(ReleaseChecker::new(config(&server, "v1.0.0")).unwrap());
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = std::sync::Arc::clone(&checker)
        .spawn_background_check(std::time::Duration::from_secs(3600), cancel.clone());

    for _ in 0..100 {
        if checker.cached().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(checker.cached().unwrap().latest_version, "v1.1.0");
}
