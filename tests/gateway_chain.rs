// End-to-end checks of the request chain against a live server
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use gatehouse::{
    GatewayServer,
    adapters::{InMemoryMovieStore, InMemoryPrincipalStore, apply_chain},
    config::{SeedPrincipal, SeedToken, ServerConfig},
    core::Gatekeeper,
    ports::{Notifier, ResourceEvent},
    utils::{LifecycleCoordinator, ShutdownSignal},
};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

const WRITER_TOKEN: &str = "WRITERWRITERWRITERWRITERAA";
const READER_TOKEN: &str = "READERREADERREADERREADERAA";
const INACTIVE_TOKEN: &str = "INACTIVEINACTIVEINACTIVEAA";
const TRUSTED_ORIGIN: &str = "https://app.example.com";

fn principal(id: i64, activated: bool, permissions: &[&str], token: &str) -> SeedPrincipal {
    SeedPrincipal {
        id,
        name: format!("user{id}"),
        email: format!("user{id}@example.com"),
        activated,
        password_hash: None,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        tokens: vec![SeedToken {
            plaintext: token.to_string(),
            ttl_secs: 3600,
        }],
    }
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.limiter.enabled = false;
    config.cors.trusted_origins = vec![TRUSTED_ORIGIN.to_string()];
    config.seed.principals = vec![
        principal(1, true, &["movies:read", "movies:write"], WRITER_TOKEN),
        principal(2, true, &["movies:read"], READER_TOKEN),
        principal(3, false, &["movies:read"], INACTIVE_TOKEN),
    ];
    config
}

struct TestServer {
    server: Arc<GatewayServer>,
    base: String,
    handle: JoinHandle<eyre::Result<()>>,
}

/// Keeps every event so tests can read activation tokens.
#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<ResourceEvent>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: ResourceEvent) -> eyre::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = GatewayServer::new(Arc::new(config));
        Self::start_server(server).await
    }

    async fn start_server(server: GatewayServer) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(server);

        let running = server.clone();
        let handle = tokio::spawn(async move { running.run_with_listener(listener).await });

        Self {
            server,
            base: format!("http://{addr}"),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn stop(self) {
        self.server.coordinator().trigger(ShutdownSignal::Terminate);
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_authentication_and_authorization_outcomes() {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();
    let url = server.url("/v1/movies");

    // Anonymous requests reach the gate and are asked to authenticate.
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "authentication required");

    // Malformed header: single 401 message plus a Bearer challenge.
    let resp = client
        .get(&url)
        .header("Authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid authentication token");

    // Well-formed but unknown token gets the same answer.
    let resp = client
        .get(&url)
        .bearer_auth("ZZZZZZZZZZZZZZZZZZZZZZZZZZ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid authentication token");

    let resp = client
        .get(&url)
        .bearer_auth(INACTIVE_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "account not activated");

    let resp = client
        .post(&url)
        .bearer_auth(READER_TOKEN)
        .json(&json!({"title": "Heat", "year": 1995, "runtime": 170, "genres": ["crime"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not permitted");

    let resp = client
        .get(&url)
        .bearer_auth(READER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let vary: Vec<_> = resp
        .headers()
        .get_all("vary")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(vary.contains(&"Authorization".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_movie_crud_through_chain() {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/v1/movies"))
        .bearer_auth(WRITER_TOKEN)
        .json(&json!({"title": "Heat", "year": 1995, "runtime": 170, "genres": ["crime"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, "/v1/movies/1");

    let resp = client
        .patch(server.url(&location))
        .bearer_auth(WRITER_TOKEN)
        .header("X-Expected-Version", "7")
        .json(&json!({"runtime": 171}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = client
        .get(server.url(&location))
        .bearer_auth(READER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["movie"]["title"], "Heat");
    assert_eq!(body["movie"]["runtime"], 170);

    let resp = client
        .delete(server.url(&location))
        .bearer_auth(WRITER_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_account_registration_to_authenticated_request() {
    let mut config = test_config();
    config.auth.password_cost = 4;
    let config = Arc::new(config);
    let notifier = Arc::new(RecordingNotifier::default());
    let server = TestServer::start_server(GatewayServer::with_stores(
        config.clone(),
        Arc::new(InMemoryPrincipalStore::from_seed(&config.seed)),
        Arc::new(InMemoryMovieStore::new()),
        notifier.clone(),
    ))
    .await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/v1/users"))
        .json(&json!({"name": "Dana", "email": "dana@example.com", "password": "pa55word"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user"]["id"], 4);

    server.server.coordinator().background().wait_idle().await;
    let activation_token = notifier
        .events
        .lock()
        .unwrap()
        .iter()
        .find_map(|event| match event {
            ResourceEvent::PrincipalRegistered {
                activation_token, ..
            } => Some(activation_token.clone()),
            _ => None,
        })
        .unwrap();

    let resp = client
        .put(server.url("/v1/users/activated"))
        .json(&json!({"token": activation_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({"email": "dana@example.com", "password": "pa55word"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let token = body["authentication_token"]["token"].as_str().unwrap();

    let resp = client
        .get(server.url("/v1/movies"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["movies"], json!([]));
    assert_eq!(body["metadata"], json!({}));

    server.stop().await;
}

#[tokio::test]
async fn test_rate_limit_rejects_after_burst() {
    let mut config = test_config();
    config.limiter.enabled = true;
    config.limiter.rps = 0.5;
    config.limiter.burst = 2;
    let server = TestServer::start(config).await;
    let client = reqwest::Client::new();
    let url = server.url("/v1/healthcheck");

    for _ in 0..2 {
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");

    server.stop().await;
}

#[tokio::test]
async fn test_cors_preflight_and_untrusted_origin() {
    let server = TestServer::start(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .request(Method::OPTIONS, server.url("/v1/movies/1"))
        .header("Origin", TRUSTED_ORIGIN)
        .header("Access-Control-Request-Method", "PATCH")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        TRUSTED_ORIGIN
    );
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "OPTIONS, PUT, PATCH, DELETE"
    );
    assert!(resp.text().await.unwrap().is_empty());

    let resp = client
        .get(server.url("/v1/healthcheck"))
        .header("Origin", "https://evil.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
    let vary: Vec<_> = resp
        .headers()
        .get_all("vary")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(vary.contains(&"Origin".to_string()));
    assert!(vary.contains(&"Access-Control-Request-Method".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_panic_is_contained_to_one_request() {
    let config = test_config();
    let gatekeeper = Arc::new(
        Gatekeeper::new(
            &config,
            Arc::new(gatehouse::adapters::InMemoryPrincipalStore::new()),
        )
        .unwrap(),
    );
    let router = axum::Router::new()
        .route(
            "/boom",
            axum::routing::get(|| async {
                let empty: Vec<&'static str> = Vec::new();
                empty[0]
            }),
        )
        .route("/ok", axum::routing::get(|| async { "still serving" }));
    let app = apply_chain(router, gatekeeper);

    let coordinator = LifecycleCoordinator::new(&config.shutdown);
    let listener = coordinator.bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let running = coordinator.clone();
    let handle = tokio::spawn(async move { running.serve(listener, app).await });

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/boom"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );

    let resp = client
        .get(format!("http://{addr}/ok"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "still serving");

    coordinator.trigger(ShutdownSignal::Interrupt);
    handle.await.unwrap().unwrap();
}
