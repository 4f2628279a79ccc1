//! RuralCafe Server - HTTP control API.
//!
//! This crate exposes the remote proxy core over HTTP to local proxies
//! and browsers.
//!
//! ## Endpoints
//!
//! - `POST /api/auth/signup` - Register a user, returns the assigned id
//! - `POST /api/auth/login` - Bind the calling IP to a user session
//! - `POST /api/auth/logout` - End the calling session
//! - `POST /api/request/add` - Queue a page fetch (requires session)
//! - `GET /api/request/richness?r=<value>` - Set richness (requires session)
//! - `GET /api/request/remove?i=<id>` - Cancel a pending request (requires session)
//! - `GET /api/package` - Bundle cached text pages into one package
//! - `GET /api/status` - Queue, worker, session, and cache counters
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ruralcafe_cache::CacheManager;
//! use ruralcafe_core::{SessionManager, SettingsStore, UserStore};
//! use ruralcafe_proxy::{
//!     Dispatcher, DispatcherConfig, FlatUriMapper, HttpFetcher, ProxyRole, RequestQueue,
//! };
//! use ruralcafe_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = CacheManager::new("/var/cache/ruralcafe");
//!     let queue = Arc::new(RequestQueue::new());
//!     let settings = SettingsStore::new();
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         Arc::clone(&queue),
//!         Arc::new(HttpFetcher::new()),
//!         Arc::new(FlatUriMapper),
//!         cache.clone(),
//!         DispatcherConfig::default(),
//!     ));
//!     let state = AppState::remote(
//!         SessionManager::new(),
//!         Arc::new(UserStore::new("/var/lib/ruralcafe/users.txt")),
//!         ProxyRole::remote(queue, settings),
//!         cache,
//!         dispatcher,
//!     );
//!     let server = Server::with_state(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Response header declaring a package's uncompressed index byte count.
pub const PACKAGE_INDEX_SIZE_HEADER: &str = "x-package-index-size";

/// Response header declaring a package's uncompressed content byte count.
pub const PACKAGE_CONTENT_SIZE_HEADER: &str = "x-package-content-size";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8081).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The HTTP control API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over the given application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        // Local proxies and browsers call in from other origins.
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Router::new()
            .route("/api/auth/signup", post(handlers::signup))
            .route("/api/auth/login", post(handlers::login))
            .route("/api/auth/logout", post(handlers::logout))
            .route("/api/request/add", post(handlers::add_request))
            .route("/api/request/richness", get(handlers::set_richness))
            .route("/api/request/remove", get(handlers::remove_request))
            .route("/api/package", get(handlers::get_package))
            .route("/api/status", get(handlers::get_status))
            .layer(cors)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting control API on {}", self.addr);

        // SO_REUSEADDR lets a restart bind past lingering sockets.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use ruralcafe_cache::CacheManager;
    use ruralcafe_core::{SessionManager, SettingsStore, UserStore};
    use ruralcafe_proxy::{
        Dispatcher, DispatcherConfig, FlatUriMapper, HttpFetcher, ProxyRole, RequestQueue,
    };

    struct TestApp {
        _dir: TempDir,
        router: Router,
        queue: Arc<RequestQueue>,
        cache: CacheManager,
    }

    fn create_test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path().join("cache"));
        assert!(cache.initialize());

        let queue = Arc::new(RequestQueue::new());
        let settings = SettingsStore::new();
        // The dispatcher is constructed but never started, so enqueued
        // requests stay queued for inspection.
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            Arc::new(HttpFetcher::new()),
            Arc::new(FlatUriMapper),
            cache.clone(),
            DispatcherConfig::default(),
        ));
        let state = AppState::remote(
            SessionManager::new(),
            Arc::new(UserStore::new(dir.path().join("users.txt"))),
            ProxyRole::remote(Arc::clone(&queue), settings),
            cache.clone(),
            dispatcher,
        );

        let server = Server::with_state(ServerConfig::default(), state).unwrap();
        TestApp {
            _dir: dir,
            router: server.router(),
            queue,
            cache,
        }
    }

    fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::new(ip.parse().unwrap(), 40000))
    }

    fn get(uri: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .extension(peer(ip))
            .body(Body::empty())
            .unwrap()
    }

    fn post(uri: &str, ip: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .extension(peer(ip))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn sign_up_and_log_in(app: &TestApp, ip: &str, username: &str) {
        let creds = json!({"username": username, "password": "pw"});
        let response = app
            .router
            .clone()
            .oneshot(post("/api/auth/signup", ip, creds.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(post("/api/auth/login", ip, creds))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_assigns_sequential_ids() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/auth/signup",
                "10.0.0.1",
                json!({"username": "alice", "password": "pw1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], 1);

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/auth/signup",
                "10.0.0.1",
                json!({"username": "bob", "password": "pw2"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["id"], 2);
    }

    #[tokio::test]
    async fn duplicate_signup_is_a_validation_error() {
        let app = create_test_app();
        let creds = json!({"username": "alice", "password": "pw"});

        app.router
            .clone()
            .oneshot(post("/api/auth/signup", "10.0.0.1", creds.clone()))
            .await
            .unwrap();
        let response = app
            .router
            .clone()
            .oneshot(post("/api/auth/signup", "10.0.0.1", creds))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "validation_error");
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let app = create_test_app();
        app.router
            .clone()
            .oneshot(post(
                "/api/auth/signup",
                "10.0.0.1",
                json!({"username": "alice", "password": "pw"}),
            ))
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/auth/login",
                "10.0.0.1",
                json!({"username": "alice", "password": "wrong"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn richness_requires_a_session() {
        let app = create_test_app();

        let response = app
            .router
            .clone()
            .oneshot(get("/api/request/richness?r=high", "10.0.0.9"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "not_authenticated");
    }

    #[tokio::test]
    async fn richness_is_set_case_insensitively() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(get("/api/request/richness?r=HIGH", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["richness"], "high");
    }

    #[tokio::test]
    async fn bogus_richness_is_a_validation_error() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(get("/api/request/richness?r=bogus", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "validation_error");
    }

    #[tokio::test]
    async fn remove_of_unknown_id_is_not_found() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(get("/api/request/remove?i=99", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "not_found");
    }

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(post(
                "/api/request/add",
                "10.0.0.1",
                json!({"uri": "http://example.org/page"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["id"].as_u64().unwrap();
        assert_eq!(app.queue.queued_len(), 1);

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/request/remove?i={id}"), "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["outcome"], "removed");
        assert_eq!(app.queue.queued_len(), 0);
    }

    #[tokio::test]
    async fn logout_invalidates_the_session() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(post("/api/auth/logout", "10.0.0.1", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(get("/api/request/richness?r=high", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn package_declares_segment_sizes() {
        use std::io::Read;

        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;

        let page = app.cache.root().join("example.org_page");
        std::fs::write(&page, b"<html>cached page</html>").unwrap();

        let response = app
            .router
            .clone()
            .oneshot(get("/api/package", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let index_size: u64 = response
            .headers()
            .get(PACKAGE_INDEX_SIZE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let content_size: u64 = response
            .headers()
            .get(PACKAGE_CONTENT_SIZE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(content_size, 24);
        assert!(index_size > 0);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut decompressed = Vec::new();
        flate2::read::GzDecoder::new(&bytes[..])
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed.len() as u64, index_size + content_size);
    }

    #[tokio::test]
    async fn status_reports_queue_and_session_counts() {
        let app = create_test_app();
        sign_up_and_log_in(&app, "10.0.0.1", "alice").await;
        app.queue
            .enqueue(ruralcafe_proxy::FetchRequest {
                endpoint: "10.0.0.1".to_string(),
                user_id: 1,
                uri: "http://example.org/".to_string(),
                richness: ruralcafe_core::Richness::Normal,
            });

        let response = app
            .router
            .clone()
            .oneshot(get("/api/status", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["queued"], 1);
        assert_eq!(json["sessions"], 1);
        assert_eq!(json["max_inflight"], 50);
        assert_eq!(json["active"], 0);
    }

    #[tokio::test]
    async fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);

        let config = config.with_port(9000);
        assert_eq!(config.port, 9000);
    }
}
