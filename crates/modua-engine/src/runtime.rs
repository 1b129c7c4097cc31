// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine assembly and lifecycle.
//!
//! `Runtime::start` turns a parsed project into running scheduler tasks
//! plus the shared state the OPC UA bridge works against. One Modbus
//! client exists per channel; devices behind the same channel take turns
//! on it through an async mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use modua_config::schema::{ChannelConfig, ProjectConfig, TransportConfig};
use modua_core::diag::DiagBus;
use modua_core::error::ConfigError;
use modua_core::types::{ChannelId, WriteRequest};
use modua_modbus::client::{ModbusClient, TimingPolicy};
use modua_modbus::serial::SerialTransport;
use modua_modbus::tcp::{TcpFraming, TcpTransport};
use modua_modbus::transport::ModbusTransport;

use crate::buffer::DataBuffer;
use crate::scheduler::{DeviceScheduler, DeviceSpec};
use crate::write_queue::WriteQueue;

/// A channel's Modbus client, shared by its device schedulers.
pub type SharedClient = Arc<Mutex<ModbusClient>>;

// =============================================================================
// Runtime
// =============================================================================

/// Builds and starts the polling engine.
pub struct Runtime;

impl Runtime {
    /// Starts scheduler tasks for every enabled device in the project.
    ///
    /// Configuration problems exclude the affected tag or device and are
    /// returned alongside the handle; the rest of the project runs.
    pub fn start(project: &ProjectConfig) -> (RuntimeHandle, Vec<ConfigError>) {
        Self::start_with(
            project,
            Arc::new(DataBuffer::new()),
            Arc::new(WriteQueue::new()),
            Arc::new(DiagBus::default()),
        )
    }

    /// Like [`Runtime::start`], but over externally created shared state.
    ///
    /// Lets the caller hand the buffer and write queue to the OPC UA
    /// bridge before or after the schedulers come up.
    pub fn start_with(
        project: &ProjectConfig,
        buffer: Arc<DataBuffer>,
        writes: Arc<WriteQueue>,
        diag: Arc<DiagBus>,
    ) -> (RuntimeHandle, Vec<ConfigError>) {
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut errors = Vec::new();
        let mut tasks = Vec::new();
        let mut device_count = 0usize;

        for channel in &project.channels {
            let client = build_client(channel, diag.clone());

            for device in &channel.devices {
                if !device.enabled {
                    info!(channel = %channel.name, device = %device.name, "Device disabled, skipping");
                    continue;
                }

                let (spec, device_errors) = DeviceSpec::from_config(&channel.name, device);
                for e in &device_errors {
                    warn!(device = %device.name, error = %e, "Tag excluded");
                }
                errors.extend(device_errors);

                if spec.tags.is_empty() {
                    warn!(channel = %channel.name, device = %device.name, "Device has no usable tags");
                    continue;
                }

                let scheduler = DeviceScheduler::new(
                    spec,
                    client.clone(),
                    buffer.clone(),
                    writes.clone(),
                );
                let shutdown_rx = shutdown_tx.subscribe();
                tasks.push(tokio::spawn(scheduler.run(shutdown_rx)));
                device_count += 1;
            }
        }

        info!(
            channels = project.channels.len(),
            devices = device_count,
            tags = buffer.len(),
            "Engine started"
        );

        let handle = RuntimeHandle {
            buffer,
            writes,
            diag,
            shutdown_tx,
            tasks,
            device_count,
        };
        (handle, errors)
    }
}

/// Builds the shared client for one channel.
///
/// Transport timeouts are channel-wide, so the longest device timeout on
/// the channel wins; retry counts stay per device.
fn build_client(channel: &ChannelConfig, diag: Arc<DiagBus>) -> SharedClient {
    let defaults = TimingPolicy::default();
    let connect_timeout = channel
        .devices
        .iter()
        .filter(|d| d.enabled)
        .map(|d| Duration::from_millis(d.timing.connect_timeout_ms))
        .max()
        .unwrap_or(defaults.connect_timeout);
    let request_timeout = channel
        .devices
        .iter()
        .filter(|d| d.enabled)
        .map(|d| Duration::from_millis(d.timing.request_timeout_ms))
        .max()
        .unwrap_or(defaults.request_timeout);

    let transport: Box<dyn ModbusTransport> = match &channel.transport {
        TransportConfig::Tcp { host, port } => Box::new(TcpTransport::new(
            host.clone(),
            *port,
            TcpFraming::Tcp,
            connect_timeout,
            request_timeout,
        )),
        TransportConfig::RtuOverTcp { host, port } => Box::new(TcpTransport::new(
            host.clone(),
            *port,
            TcpFraming::Rtu,
            connect_timeout,
            request_timeout,
        )),
        TransportConfig::Serial(params) => {
            Box::new(SerialTransport::new(params.clone(), request_timeout))
        }
    };

    Arc::new(Mutex::new(ModbusClient::new(
        ChannelId::new(&channel.name),
        transport,
        diag,
    )))
}

// =============================================================================
// Runtime Handle
// =============================================================================

/// Handle to a running engine.
pub struct RuntimeHandle {
    buffer: Arc<DataBuffer>,
    writes: Arc<WriteQueue>,
    diag: Arc<DiagBus>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    device_count: usize,
}

impl RuntimeHandle {
    /// The live data buffer.
    pub fn buffer(&self) -> Arc<DataBuffer> {
        self.buffer.clone()
    }

    /// The pending write queue.
    pub fn writes(&self) -> Arc<WriteQueue> {
        self.writes.clone()
    }

    /// The diagnostics bus.
    pub fn diag(&self) -> Arc<DiagBus> {
        self.diag.clone()
    }

    /// Number of running device schedulers.
    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Queues a write toward a device.
    pub fn submit_write(&self, request: WriteRequest) {
        self.writes.enqueue(request);
    }

    /// Signals shutdown and waits for every scheduler to finish its
    /// current cycle and exit.
    pub async fn shutdown(self) {
        info!("Engine shutting down");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Engine stopped");
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("devices", &self.device_count)
            .field("tags", &self.buffer.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
