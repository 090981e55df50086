use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use codex_bridge::config::{load_config, ProxyConfig};
use codex_bridge::observability::init_tracing;
use codex_bridge::routing::dispatch::dispatch_request;
use codex_bridge::state::AppState;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;

const CONFIG_PATH_ENV: &str = "CODEX_BRIDGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{config_path}': {e}");
        eprintln!("Please copy 'config.example.json' to 'config.json' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    let runtime = build_runtime();

    runtime.block_on(async move {
        run(config).await;
    });
}

fn build_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        })
}

async fn run(config: ProxyConfig) {
    let bind_addr = config.bind_addr();
    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            eprintln!("Failed to initialize proxy: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "codex-bridge starting on {} (chat upstream: {}, code upstream: {}, auth_token: {})",
        bind_addr,
        state.chat_endpoint.url(),
        state.code_endpoint.url(),
        if state.auth().is_enabled() { "set" } else { "unset" }
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {bind_addr}: {err}");
            std::process::exit(1);
        });

    tracing::info!("codex-bridge is ready to accept connections");
    serve_accept_loop(listener, AutoBuilder::new(TokioExecutor::new()), state).await;
}

async fn serve_accept_loop(
    listener: tokio::net::TcpListener,
    conn_builder: AutoBuilder<TokioExecutor>,
    dispatch_state: Arc<AppState>,
) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                tracing::warn!("Accept error: {err}");
                continue;
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!("failed to enable TCP_NODELAY for {remote_addr}: {err}");
        }

        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let request_state = Arc::clone(&dispatch_state);
        let hyper_service = service_fn(move |request: Request<Incoming>| {
            dispatch_request(Arc::clone(&request_state), request.map(Body::new))
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, hyper_service).await {
                tracing::debug!("failed to serve connection from {remote_addr}: {err:#}");
            }
        });
    }
}
