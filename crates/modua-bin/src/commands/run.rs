// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `run` command: start the gateway and block until shutdown.

use std::sync::Arc;

use tracing::{info, warn};

use modua_config::load_project;
use modua_config::schema::OpcUaServerConfig;
use modua_core::diag::DiagBus;
use modua_core::error::ConfigError;
use modua_engine::{DataBuffer, Runtime, WriteQueue};
use modua_opcua::OpcUaBridge;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::shutdown;

/// Loads the project, starts engine and OPC UA server, and waits for a
/// termination signal.
///
/// Configuration problems exclude the affected tag or device and are
/// logged; only an unloadable project file aborts startup. With
/// `--auto-start` the schedulers come up before the OPC UA endpoint,
/// otherwise the endpoint opens first.
pub async fn execute(cli: &Cli, args: &RunArgs) -> BinResult<()> {
    let mut project = load_project(&cli.project)?;
    if let Some(endpoint) = &args.opcua_endpoint {
        apply_endpoint_override(&mut project.opcua, endpoint)?;
    }

    for problem in project.validate() {
        warn!(error = %problem, "Configuration problem");
    }

    info!(
        project = %project.name,
        channels = project.channels.len(),
        tags = project.tag_count(),
        "Starting gateway"
    );

    let buffer = Arc::new(DataBuffer::new());
    let writes = Arc::new(WriteQueue::new());
    let diag = Arc::new(DiagBus::default());

    let (engine, bridge) = if args.auto_start {
        let (engine, errors) =
            Runtime::start_with(&project, buffer.clone(), writes.clone(), diag);
        report_startup_errors(&errors);
        let bridge = OpcUaBridge::start(&project, buffer, writes)?;
        (engine, bridge)
    } else {
        let bridge = OpcUaBridge::start(&project, buffer.clone(), writes.clone())?;
        let (engine, errors) = Runtime::start_with(&project, buffer, writes, diag);
        report_startup_errors(&errors);
        (engine, bridge)
    };

    info!(
        endpoint = bridge.endpoint(),
        devices = engine.device_count(),
        nodes = bridge.node_count(),
        "Gateway running"
    );

    shutdown::wait_for_signal().await;

    bridge.stop().await;
    let stats = engine.writes().stats();
    engine.shutdown().await;
    info!(
        executed = stats.executed,
        failed = stats.failed,
        superseded = stats.replaced,
        "Write totals at shutdown"
    );
    Ok(())
}

fn report_startup_errors(errors: &[ConfigError]) {
    if !errors.is_empty() {
        warn!(count = errors.len(), "Tags or devices excluded at startup");
    }
}

/// Applies a `host:port` (or `opc.tcp://host:port`) endpoint override.
fn apply_endpoint_override(
    config: &mut OpcUaServerConfig,
    endpoint: &str,
) -> Result<(), ConfigError> {
    let stripped = endpoint.strip_prefix("opc.tcp://").unwrap_or(endpoint);
    let (host, port) = stripped.rsplit_once(':').ok_or_else(|| {
        ConfigError::validation("opcua_endpoint", "expected host:port")
    })?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::validation("opcua_endpoint", "invalid port"))?;
    if host.is_empty() {
        return Err(ConfigError::validation("opcua_endpoint", "empty host"));
    }
    config.host = host.to_string();
    config.port = port;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
