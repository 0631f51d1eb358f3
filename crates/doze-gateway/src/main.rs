//! doze-gateway entrypoint.

mod error;
mod handler;
mod health;
mod state;
mod tls;
mod waiting_page;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::signal;
use tower_http::trace::TraceLayer;

use doze::config::load_config;
use doze::{build_runtime, RuntimeTopology};
use state::ListenerState;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    println!(
        r#"
     _
  __| | ___ _______
 / _` |/ _ \_  / _ \
| (_| | (_) / /  __/
 \__,_|\___/___\___|

  wake-on-demand reverse proxy
                     AGPL-3.0
"#
    );

    let config_path = parse_config_flag();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let log_level = config.log_level.clone();
    if let Some(level) = log_level {
        tracing::debug!(configured_level = %level, "log_level from config is informational only; set RUST_LOG to control verbosity");
    }

    let topology = match build_runtime(&config).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to build runtime topology");
            std::process::exit(1);
        }
    };

    tracing::info!(backends = topology.store.len(), "instances registered");

    let mut listener_handles = Vec::new();
    for listen_address in topology.routes.listen_addresses().map(str::to_string).collect::<Vec<_>>() {
        match spawn_listener(&topology, &config, listen_address.clone()).await {
            Ok(handle) => listener_handles.push(handle),
            Err(e) => {
                tracing::error!(listen_address = %listen_address, error = %e, "failed to bind listener");
                std::process::exit(1);
            }
        }
    }

    let admin_addr = match to_socket_addr(&config.port) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(port = %config.port, error = %e, "invalid admin port");
            std::process::exit(1);
        }
    };
    let admin_listener = match tokio::net::TcpListener::bind(admin_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %admin_addr, error = %e, "failed to bind admin listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %admin_addr, "admin health listener bound");
    let admin_handle = tokio::spawn(async move {
        let _ = axum::serve(admin_listener, health::router()).await;
    });
    listener_handles.push(admin_handle);

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    // Shutdown is abrupt by design: listener tasks are aborted, in-flight
    // requests are not drained.
    for handle in &listener_handles {
        handle.abort();
    }

    topology.store.close().await;
    tracing::info!("all monitors halted, exiting");
}

async fn spawn_listener(
    topology: &RuntimeTopology,
    config: &doze::config::Config,
    listen_address: String,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error>> {
    let addr = to_socket_addr(&listen_address)?;
    let state = ListenerState::new(
        listen_address.clone(),
        Arc::clone(&topology.routes),
        Arc::clone(&topology.store),
        config.secret_key.clone(),
    );

    let app = Router::new()
        .fallback(handler::pipeline)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let tls_config = tls::build_server_config(&topology.routes, &listen_address)?;

    let handle = match tls_config {
        Some(server_config) => {
            tracing::info!(addr = %addr, "listener bound (TLS)");
            let rustls_config = RustlsConfig::from_config(server_config);
            tokio::spawn(async move {
                let _ = axum_server::bind_rustls(addr, rustls_config).serve(app.into_make_service()).await;
            })
        }
        None => {
            tracing::info!(addr = %addr, "listener bound (plain HTTP)");
            tokio::spawn(async move {
                let _ = axum_server::bind(addr).serve(app.into_make_service()).await;
            })
        }
    };

    Ok(handle)
}

fn to_socket_addr(address: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    if let Some(port) = address.strip_prefix(':') {
        format!("0.0.0.0:{port}").parse()
    } else {
        address.parse()
    }
}

fn parse_config_flag() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "-config" || arg == "--config" {
            if let Some(path) = iter.next() {
                return path.clone();
            }
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
