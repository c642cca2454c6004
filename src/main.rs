//! `llm-bridge`: the Request Pipeline (§4.7), outbound wire adapters (§6),
//! the admin JSON API (§6), configuration loading, logging setup, and the
//! binary entry point tying them together.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use llm_bridge::config::{self, BridgeConfig};
use llm_bridge::state::AppState;
use llm_bridge::{admin, proxy};

/// Startup flags (§1 "CLI"): config path and the two listen addresses
/// (client-facing proxy, admin API).
#[derive(Parser, Debug)]
#[command(name = "llm-bridge", version, about = "Multi-upstream LLM API bridge")]
struct Cli {
    /// Path to the TOML config file. Defaults to `$LLM_BRIDGE_CONFIG`, then `./llm-bridge.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the client-facing listen address from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Override the admin API listen address from the config file.
    #[arg(long)]
    admin_listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config);
    let mut bridge_config = match BridgeConfig::load(&config_path) {
        Ok(config) => config,
        Err(_) if !config_path.exists() => {
            tracing::warn!(path = %config_path.display(), "config file not found, starting from defaults");
            BridgeConfig::default()
        }
        Err(err) => return Err(err.into()),
    };
    if let Some(listen) = cli.listen {
        bridge_config.listen = listen;
    }
    if let Some(admin_listen) = cli.admin_listen {
        bridge_config.admin_listen = admin_listen;
    }

    let listen_addr = bridge_config.listen.clone();
    let admin_listen_addr = bridge_config.admin_listen.clone();

    let state = AppState::new(bridge_config, config_path)?;
    state.spawn_sweepers();

    let proxy_app = proxy::router().with_state(Arc::clone(&state));
    let admin_app = admin::router().with_state(Arc::clone(&state));

    let proxy_listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_listen_addr).await?;
    tracing::info!(listen = %listen_addr, admin_listen = %admin_listen_addr, "llm-bridge starting");

    let proxy_server = axum::serve(proxy_listener, proxy_app).with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_app).with_graceful_shutdown(shutdown_signal());

    let (proxy_result, admin_result) = tokio::join!(proxy_server, admin_server);
    proxy_result?;
    admin_result?;
    Ok(())
}

/// Waits for Ctrl+C so both listeners drain in-flight requests before exit
/// (§3 "Supplemental Features: graceful shutdown").
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
}
