#![allow(clippy::unwrap_used)]

use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::json;
use sessionkeeper::provider::{
    build_client, ProviderClient, ProviderEndpoints, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_HEALTH_PATH, DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH,
    DEFAULT_REQUEST_TIMEOUT,
};
use sessionkeeper::session::{
    RefreshReport, RequestOptions, SessionError, SessionRefreshManager, SessionState,
    ACCESS_TOKEN_KEY, DEFAULT_REFRESH_INTERVAL, REFRESH_TOKEN_KEY,
};
use sessionkeeper::store::{FileStore, KeyValueStore, MemoryStore};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROFILE_PATH: &str = "/api/user/profile";

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn manager_for(
    server: &MockServer,
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
) -> SessionRefreshManager {
    let base = Url::parse(&server.uri()).unwrap();
    let http = build_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT).unwrap();
    let provider = ProviderClient::new(http, ProviderEndpoints::from_base(&base));
    SessionRefreshManager::new(provider, store, interval)
}

fn signed_in_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, "at1"),
        (REFRESH_TOKEN_KEY, "rt1"),
    ]))
}

fn tokens_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": { "accessToken": access, "refreshToken": refresh }
    }))
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(DEFAULT_REFRESH_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, target: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == target)
        .count()
}

#[tokio::test]
async fn concurrent_refreshes_share_one_network_call() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_REFRESH_PATH))
        .and(body_json(json!({ "refreshToken": "rt1" })))
        .respond_with(tokens_response("at2", "rt2").set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, signed_in_store(), DEFAULT_REFRESH_INTERVAL);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh_access_token().await })
        })
        .collect();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(), SessionState::Refreshing);

    for handle in handles {
        let pair = handle.await.unwrap().unwrap();
        assert_eq!(pair.access_token.expose_secret(), "at2");
        assert_eq!(pair.refresh_token.expose_secret(), "rt2");
    }

    server.verify().await;
    assert_eq!(manager.state(), SessionState::Scheduled);
}

#[tokio::test]
async fn refresh_after_a_completed_one_calls_the_provider_again() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_REFRESH_PATH))
        .respond_with(tokens_response("at2", "rt2"))
        .expect(2)
        .mount(&server)
        .await;

    let manager = manager_for(&server, signed_in_store(), DEFAULT_REFRESH_INTERVAL);

    manager.refresh_access_token().await.unwrap();
    manager.refresh_access_token().await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn refresh_with_only_refresh_token_stores_new_pair() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    let store = Arc::new(MemoryStore::with_entries([(REFRESH_TOKEN_KEY, "rt1")]));
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let result = manager.refresh_access_token().await;

    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), Some("at2".to_string()));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), Some("rt2".to_string()));
    assert_eq!(store.keys().unwrap(), vec![ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]);
    assert!(manager.is_refresh_scheduled());
    assert_eq!(
        serde_json::to_value(RefreshReport::from(&result)).unwrap(),
        json!({ "success": true, "accessToken": "at2", "refreshToken": "rt2" })
    );
}

#[tokio::test]
async fn refresh_with_empty_store_makes_no_network_call() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    let manager = manager_for(
        &server,
        Arc::new(MemoryStore::new()),
        DEFAULT_REFRESH_INTERVAL,
    );

    let result = manager.refresh_access_token().await;

    assert_eq!(result.as_ref().unwrap_err(), &SessionError::NoRefreshToken);
    assert_eq!(RefreshReport::from(&result).reason, Some("no_refresh_token"));
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 0);
    assert!(!manager.is_refresh_scheduled());
}

#[tokio::test]
async fn rejected_refresh_clears_store_and_timer() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Invalid refresh token"
        })),
    )
    .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);
    manager.initialize_token_management().unwrap();
    assert!(manager.is_refresh_scheduled());

    let err = manager.refresh_access_token().await.unwrap_err();

    match err {
        SessionError::RefreshFailed(message) => {
            assert!(message.contains("Invalid refresh token"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.keys().unwrap().is_empty());
    assert!(!manager.is_refresh_scheduled());
    assert!(!manager.is_authenticated().unwrap());
}

#[tokio::test]
async fn unsuccessful_envelope_clears_store() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "success": false })),
    )
    .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let result = manager.refresh_access_token().await;

    assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
    assert!(store.keys().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_request_is_retried_once_with_new_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .and(header("authorization", "Bearer at1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .and(header("authorization", "Bearer at2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "alice" })))
        .mount(&server)
        .await;

    let manager = manager_for(&server, signed_in_store(), DEFAULT_REFRESH_INTERVAL);

    let response = manager
        .make_authenticated_request(PROFILE_PATH, &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<serde_json::Value>().await.unwrap(),
        json!({ "name": "alice" })
    );
    assert_eq!(requests_to(&server, PROFILE_PATH).await, 2);
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 1);
}

#[tokio::test]
async fn second_unauthorized_response_is_returned_without_third_attempt() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let manager = manager_for(&server, signed_in_store(), DEFAULT_REFRESH_INTERVAL);

    let response = manager
        .make_authenticated_request(PROFILE_PATH, &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(requests_to(&server, PROFILE_PATH).await, 2);
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 1);
}

#[tokio::test]
async fn unauthorized_request_with_failed_refresh_expires_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, ResponseTemplate::new(401)).await;

    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let err = manager
        .make_authenticated_request(PROFILE_PATH, &RequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::SessionExpired);
    assert!(err.requires_sign_in());
    assert_eq!(requests_to(&server, PROFILE_PATH).await, 1);
    assert!(store.keys().unwrap().is_empty());
}

#[tokio::test]
async fn non_401_responses_are_returned_as_is() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    Mock::given(method("POST"))
        .and(path("/api/subscription"))
        .and(header("authorization", "Bearer at1"))
        .and(header("content-type", "application/json"))
        .and(header("x-request-id", "req-1"))
        .and(body_json(json!({ "plan": "pro" })))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server, signed_in_store(), DEFAULT_REFRESH_INTERVAL);
    let options = RequestOptions::new(Method::POST)
        .json(json!({ "plan": "pro" }))
        .header("X-Request-Id", "req-1");

    let response = manager
        .make_authenticated_request(&format!("{}/api/subscription", server.uri()), &options)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 0);
    server.verify().await;
}

#[tokio::test]
async fn request_without_access_token_omits_authorization() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/public"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let manager = manager_for(
        &server,
        Arc::new(MemoryStore::new()),
        DEFAULT_REFRESH_INTERVAL,
    );

    let response = manager
        .make_authenticated_request("/api/public", &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn initialize_without_tokens_arms_nothing() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    let manager = manager_for(
        &server,
        Arc::new(MemoryStore::new()),
        Duration::from_millis(100),
    );

    assert!(!manager.initialize_token_management().unwrap());
    assert_eq!(manager.state(), SessionState::Idle);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 0);
}

#[tokio::test]
async fn initializing_twice_keeps_a_single_timer() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    let manager = manager_for(&server, signed_in_store(), Duration::from_millis(600));

    assert!(manager.initialize_token_management().unwrap());
    sleep(Duration::from_millis(300)).await;
    assert!(manager.initialize_token_management().unwrap());

    // the first timer would have fired at 600ms
    sleep(Duration::from_millis(450)).await;
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 0);

    // the second fires at 900ms, its successor not before 1500ms
    sleep(Duration::from_millis(450)).await;
    assert_eq!(requests_to(&server, DEFAULT_REFRESH_PATH).await, 1);
    assert!(manager.is_refresh_scheduled());
}

#[tokio::test]
async fn scheduled_refresh_rotates_tokens() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(&server, tokens_response("at2", "rt2")).await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), Duration::from_millis(150));
    manager.schedule_refresh();

    sleep(Duration::from_millis(400)).await;

    assert!(requests_to(&server, DEFAULT_REFRESH_PATH).await >= 1);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), Some("at2".to_string()));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), Some("rt2".to_string()));
    manager.cancel_scheduled_refresh();
}

#[tokio::test]
async fn sign_in_persists_pair_and_arms_timer() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_LOGIN_PATH))
        .and(body_json(json!({ "email": "user@example.com", "password": "pw" })))
        .respond_with(tokens_response("at1", "rt1"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("tokens.json");
    let manager = manager_for(
        &server,
        Arc::new(FileStore::new(&store_path)),
        DEFAULT_REFRESH_INTERVAL,
    );

    let pair = manager.sign_in("user@example.com", "pw").await.unwrap();
    assert_eq!(pair.access_token.expose_secret(), "at1");
    assert!(manager.is_refresh_scheduled());

    // a later process picks the session up from disk
    let restarted = manager_for(
        &server,
        Arc::new(FileStore::new(&store_path)),
        DEFAULT_REFRESH_INTERVAL,
    );
    assert!(restarted.initialize_token_management().unwrap());
    server.verify().await;
}

#[tokio::test]
async fn rejected_sign_in_leaves_store_untouched() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_LOGIN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Invalid credentials"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let err = manager.sign_in("user@example.com", "bad").await.unwrap_err();

    assert!(matches!(err, SessionError::SignInRejected(_)));
    assert!(store.keys().unwrap().is_empty());
    assert!(!manager.is_refresh_scheduled());
}

#[tokio::test]
async fn sign_out_clears_session_even_if_logout_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_LOGOUT_PATH))
        .and(body_json(json!({ "accessToken": "at1", "refreshToken": "rt1" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);
    manager.initialize_token_management().unwrap();

    manager.sign_out().await.unwrap();

    assert!(store.keys().unwrap().is_empty());
    assert_eq!(manager.state(), SessionState::Idle);
    server.verify().await;
}

#[tokio::test]
async fn wait_for_provider_reports_unavailable() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DEFAULT_HEALTH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let manager = manager_for(
        &server,
        Arc::new(MemoryStore::new()),
        DEFAULT_REFRESH_INTERVAL,
    );

    let err = manager
        .wait_for_provider(Duration::from_millis(1500))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ProviderUnavailable(_)));
    assert_eq!(err.code(), "provider_unavailable");
    assert!(requests_to(&server, DEFAULT_HEALTH_PATH).await >= 2);
}

#[tokio::test]
async fn wait_for_provider_succeeds_when_healthy() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DEFAULT_HEALTH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(
        &server,
        Arc::new(MemoryStore::new()),
        DEFAULT_REFRESH_INTERVAL,
    );

    manager.wait_for_provider(Duration::from_secs(2)).await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn sign_out_during_refresh_stays_signed_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        tokens_response("at2", "rt2").set_delay(Duration::from_millis(300)),
    )
    .await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_LOGOUT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh_access_token().await })
    };

    sleep(Duration::from_millis(50)).await;
    manager.sign_out().await.unwrap();
    assert!(store.keys().unwrap().is_empty());

    let err = refresh.await.unwrap().unwrap_err();

    match err {
        SessionError::RefreshFailed(message) => {
            assert!(message.contains("session ended"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.keys().unwrap().is_empty());
    assert!(!manager.is_refresh_scheduled());
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn sign_in_during_failing_refresh_keeps_new_pair() {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return;
    }
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        ResponseTemplate::new(401)
            .set_body_json(json!({ "success": false, "message": "Invalid refresh token" }))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_LOGIN_PATH))
        .respond_with(tokens_response("at9", "rt9"))
        .mount(&server)
        .await;

    let store = signed_in_store();
    let manager = manager_for(&server, store.clone(), DEFAULT_REFRESH_INTERVAL);

    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh_access_token().await })
    };

    sleep(Duration::from_millis(50)).await;
    manager.sign_in("user@example.com", "pw").await.unwrap();

    let result = refresh.await.unwrap();

    assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), Some("at9".to_string()));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), Some("rt9".to_string()));
    assert!(manager.is_refresh_scheduled());
    assert!(manager.is_authenticated().unwrap());
}
