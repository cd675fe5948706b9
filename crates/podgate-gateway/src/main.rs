// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Podgate Gateway - Workload Admission Server
//!
//! Serves the admission gateway over:
//! - QUIC RPC (podgate-sdk and podgate-ctl)
//! - HTTP (JSON envelope)

use tracing::{info, warn};

use podgate_gateway::config::Config;
use podgate_gateway::runtime::GatewayRuntimeBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podgate_gateway=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = ?config.http_addr,
        rpc_addr = ?config.rpc_addr,
        control_plane = ?config.control_plane,
        call_timeout_ms = config.call_timeout.as_millis() as u64,
        max_attempts = config.retry.max_attempts,
        "Starting Podgate Gateway"
    );

    let control_plane = config.build_control_plane()?;
    info!(control_plane = control_plane.name(), "Control plane initialized");

    let runtime = GatewayRuntimeBuilder::from_config(&config)
        .control_plane(control_plane)
        .tls_identity(config.tls_identity()?)
        .build()?
        .start()
        .await?;

    info!(
        http_addr = ?runtime.http_addr(),
        rpc_addr = ?runtime.rpc_addr(),
        "Gateway ready"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Podgate Gateway shut down");

    Ok(())
}
