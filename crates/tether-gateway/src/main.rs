//! Tether gateway entry point.
//!
//! Loads configuration and serves the audit and assets APIs, forwarding each
//! call to the configured upstream.
//!
//! # Configuration
//!
//! | Source | Example | Notes |
//! |--------|---------|-------|
//! | `GATEWAY_CONFIG` | `gateway.toml` | Optional file (toml, yaml or json). |
//! | `TETHER_*` | `TETHER_UPSTREAM_ENDPOINT=http://127.0.0.1:9090` | Overrides file values. |
//! | `RUST_LOG` | `tether_gateway=debug` | Log filter. |

use std::sync::Arc;
use tether_gateway::interceptor::LoggingInterceptor;
use tether_gateway::router::GatewayMux;
use tether_gateway::server::GatewayServer;
use tether_gateway::services::{assets, audit};
use tether_kernel::gateway::GatewayConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "tether_gateway=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::var("GATEWAY_CONFIG").ok();
    let config = match GatewayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Gateway configuration error: {e}");
            std::process::exit(1);
        }
    };

    let mut mux = GatewayMux::from_config(&config);
    mux.add_interceptor(Arc::new(LoggingInterceptor::new()));

    match config.upstream_endpoint.as_deref() {
        Some(endpoint) => {
            let bound = audit::register_audit_api_handler_from_endpoint(
                &mut mux,
                endpoint,
                config.connect_timeout(),
            )
            .and_then(|channel| {
                assets::register_assets_api_handler(&mut mux, channel)?;
                Ok(())
            });
            if let Err(e) = bound {
                eprintln!("Gateway error: {e}");
                std::process::exit(1);
            }
        }
        None => warn!(
            "no upstream endpoint configured (TETHER_UPSTREAM_ENDPOINT); \
             every routed request will return 404"
        ),
    }

    info!(
        gateway  = %config.id,
        listen   = %config.listen_addr,
        upstream = config.upstream_endpoint.as_deref().unwrap_or("-"),
        timeout_ms = config.request_timeout_ms,
        "Tether gateway configuration loaded"
    );

    if let Err(e) = GatewayServer::new(config, mux).start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}
