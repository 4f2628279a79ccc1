//! RuralCafe - cached web browsing for bandwidth-constrained links.
//!
//! This binary runs one proxy process. In the remote role it serves the
//! control API, drains the request queue through the fetch dispatcher,
//! and fills the page cache; in the local role it serves the same API but
//! relays fetch requests to an upstream remote proxy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ruralcafe_cache::CacheManager;
use ruralcafe_core::{Richness, SessionManager, SettingsStore, UserStore};
use ruralcafe_proxy::{
    Dispatcher, DispatcherConfig, FlatUriMapper, HttpFetcher, ProxyRole, RequestQueue,
    DEFAULT_MAX_INFLIGHT,
};
use ruralcafe_server::{AppState, Server, ServerConfig, DEFAULT_PORT};

/// RuralCafe - cached web browsing for bandwidth-constrained links
#[derive(Parser, Debug)]
#[command(name = "ruralcafe", version, about)]
struct Args {
    /// Host to bind the control API to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the control API
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Cache root directory (defaults to the platform data dir)
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Credential store file (defaults to the platform data dir)
    #[arg(long)]
    user_file: Option<PathBuf>,

    /// Maximum concurrently dispatched fetches
    #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT)]
    max_inflight: usize,

    /// Per-fetch deadline in seconds
    #[arg(long, default_value_t = 60)]
    fetch_timeout: u64,

    /// Run as the local role, relaying requests to this remote proxy
    /// (e.g. http://remote-proxy:8081)
    #[arg(long)]
    upstream: Option<String>,

    /// Richness tier new users start with
    #[arg(long, default_value = "normal")]
    richness: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the platform data directory.
fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "ruralcafe", "RuralCafe").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Initialize logging with file rotation and a console layer.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ruralcafe={},warn", log_level)));

    if let Some(log_dir) = data_dir().map(|dir| dir.join("logs")) {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("ruralcafe")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program.
    let _log_guard = init_logging(&args);

    tracing::info!("Starting RuralCafe...");
    tracing::info!("Args: {:?}", args);

    let default_richness = Richness::parse(&args.richness)
        .map_err(|e| anyhow::anyhow!("invalid --richness: {}", e))?;
    let settings = SettingsStore::new().with_default_richness(default_richness);

    let cache_root = args
        .cache_root
        .clone()
        .or_else(|| data_dir().map(|dir| dir.join("cache")))
        .unwrap_or_else(|| PathBuf::from("cache"));
    let cache = CacheManager::new(&cache_root);
    if !cache.initialize() {
        anyhow::bail!("failed to create cache root at {:?}", cache_root);
    }
    tracing::info!("Cache root: {:?} ({} files)", cache_root, cache.count());

    let user_file = args
        .user_file
        .clone()
        .or_else(|| data_dir().map(|dir| dir.join("users.txt")))
        .unwrap_or_else(|| PathBuf::from("users.txt"));
    let users = Arc::new(UserStore::new(user_file));

    let sessions = SessionManager::new();
    let server_config = ServerConfig::default()
        .with_host(args.host.clone())
        .with_port(args.port);

    match args.upstream {
        Some(upstream) => {
            tracing::info!("Running as local proxy, relaying to {}", upstream);
            let role = ProxyRole::local(upstream, settings);
            let state = AppState::local(sessions, users, role, cache);
            Server::with_state(server_config, state)?.run().await?;
            Ok(())
        }
        None => {
            tracing::info!("Running as remote proxy");
            let queue = Arc::new(RequestQueue::new());
            let dispatcher = Arc::new(Dispatcher::new(
                Arc::clone(&queue),
                Arc::new(HttpFetcher::new()),
                Arc::new(FlatUriMapper),
                cache.clone(),
                DispatcherConfig::default()
                    .with_max_inflight(args.max_inflight)
                    .with_fetch_timeout(Duration::from_secs(args.fetch_timeout)),
            ));
            let dispatcher_handle = Arc::clone(&dispatcher).start();

            let role = ProxyRole::remote(queue, settings);
            let state = AppState::remote(sessions, users, role, cache, dispatcher);
            let result = Server::with_state(server_config, state)?.run().await;

            dispatcher_handle.stop().await;
            tracing::info!("RuralCafe shutting down");
            result.map_err(Into::into)
        }
    }
}
