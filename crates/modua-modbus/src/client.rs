// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus client: retry, pacing and diagnostics around a transport.
//!
//! One `ModbusClient` wraps one channel transport. Devices sharing the
//! channel (RTU multidrop, gateways) go through the same client, which the
//! engine wraps in an async mutex so only one request is in flight per
//! line. Independent channels have independent clients and proceed
//! concurrently.
//!
//! The client enforces the per-device timing policy:
//!
//! - request retries for retryable failures (timeouts, lost connections)
//! - a minimum gap between consecutive requests on the line
//! - connection attempts with a bounded count
//!
//! Every request and response is mirrored onto the diagnostics bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use modua_core::diag::{DiagBus, DiagDirection, DiagEvent, DiagKind, DiagOutcome};
use modua_core::error::{ModbusError, ModbusResult};
use modua_core::types::{ChannelId, DeviceId, TagId};

use crate::blocks::ReadBlock;
use crate::transport::{read_function_code, BlockData, ModbusTransport};

/// Delay between request retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Delay between connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

// =============================================================================
// Timing Policy
// =============================================================================

/// Per-device communication timing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,

    /// Connection attempts before the device faults.
    pub connect_attempts: u32,

    /// Timeout for a single request.
    pub request_timeout: Duration,

    /// Attempts per request (1 = no retry).
    pub request_attempts: u32,

    /// Minimum gap between consecutive requests on the line.
    pub inter_request_delay: Duration,

    /// Pending writes drained per polling cycle.
    pub max_writes_per_cycle: usize,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            connect_attempts: 3,
            request_timeout: Duration::from_millis(1000),
            request_attempts: 1,
            inter_request_delay: Duration::ZERO,
            max_writes_per_cycle: 5,
        }
    }
}

// =============================================================================
// Device Writes
// =============================================================================

/// An encoded write operation ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceWrite {
    /// Single coil (FC 5).
    Coil {
        /// Protocol address.
        address: u16,
        /// Coil state.
        value: bool,
    },

    /// Multiple coils (FC 15).
    Coils {
        /// Protocol address of the first coil.
        address: u16,
        /// Coil states.
        values: Vec<bool>,
    },

    /// Single register (FC 6).
    Register {
        /// Protocol address.
        address: u16,
        /// Register value.
        value: u16,
    },

    /// Multiple registers (FC 16).
    Registers {
        /// Protocol address of the first register.
        address: u16,
        /// Register values.
        values: Vec<u16>,
    },
}

impl DeviceWrite {
    /// The Modbus function code this write uses.
    pub fn function_code(&self) -> u8 {
        match self {
            DeviceWrite::Coil { .. } => 0x05,
            DeviceWrite::Coils { .. } => 0x0F,
            DeviceWrite::Register { .. } => 0x06,
            DeviceWrite::Registers { .. } => 0x10,
        }
    }

    /// Protocol address of the first unit written.
    pub fn address(&self) -> u16 {
        match self {
            DeviceWrite::Coil { address, .. }
            | DeviceWrite::Coils { address, .. }
            | DeviceWrite::Register { address, .. }
            | DeviceWrite::Registers { address, .. } => *address,
        }
    }

    /// Number of units written.
    pub fn count(&self) -> u16 {
        match self {
            DeviceWrite::Coil { .. } | DeviceWrite::Register { .. } => 1,
            DeviceWrite::Coils { values, .. } => values.len() as u16,
            DeviceWrite::Registers { values, .. } => values.len() as u16,
        }
    }

    fn payload_bytes(&self) -> Vec<u8> {
        match self {
            DeviceWrite::Coil { value, .. } => vec![u8::from(*value)],
            DeviceWrite::Coils { values, .. } => {
                BlockData::Bits(values.clone()).to_payload_bytes()
            }
            DeviceWrite::Register { value, .. } => value.to_be_bytes().to_vec(),
            DeviceWrite::Registers { values, .. } => {
                BlockData::Words(values.clone()).to_payload_bytes()
            }
        }
    }
}

// =============================================================================
// Client Statistics
// =============================================================================

/// Request counters for one client, updated atomically.
#[derive(Debug, Default)]
pub struct ClientStats {
    requests: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    exceptions: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests attempted.
    pub requests: u64,

    /// Failed requests (all causes).
    pub errors: u64,

    /// Requests that timed out.
    pub timeouts: u64,

    /// Requests answered with a Modbus exception.
    pub exceptions: u64,
}

impl ClientStats {
    fn record(&self, result: &ModbusResult<()>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = result {
            self.errors.fetch_add(1, Ordering::Relaxed);
            match e {
                ModbusError::Timeout { .. } => {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                ModbusError::Exception { .. } => {
                    self.exceptions.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    /// Takes a snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// ModbusClient
// =============================================================================

/// Channel-level Modbus client.
pub struct ModbusClient {
    channel: ChannelId,
    transport: Box<dyn ModbusTransport>,
    diag: Arc<DiagBus>,
    stats: ClientStats,
    last_request_end: Option<Instant>,
}

impl ModbusClient {
    /// Creates a client over the given transport.
    pub fn new(channel: ChannelId, transport: Box<dyn ModbusTransport>, diag: Arc<DiagBus>) -> Self {
        Self {
            channel,
            transport,
            diag,
            stats: ClientStats::default(),
            last_request_end: None,
        }
    }

    /// The channel this client serves.
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Returns `true` if the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Current request counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connects the transport, retrying up to `connect_attempts` times.
    pub async fn ensure_connected(&mut self, timing: &TimingPolicy) -> ModbusResult<()> {
        if self.transport.is_connected() {
            return Ok(());
        }

        let attempts = timing.connect_attempts.max(1);
        let mut last_error = ModbusError::NotConnected;
        for attempt in 1..=attempts {
            match self.transport.connect().await {
                Ok(()) => {
                    self.diag.publish(DiagEvent::new(
                        self.channel.clone(),
                        None,
                        DiagKind::Link {
                            connected: true,
                            detail: None,
                        },
                    ));
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %self.channel,
                        endpoint = %self.transport.display_name(),
                        attempt,
                        attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = e;
                    if attempt < attempts {
                        sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        }

        self.diag.publish(DiagEvent::new(
            self.channel.clone(),
            None,
            DiagKind::Link {
                connected: false,
                detail: Some(last_error.to_string()),
            },
        ));
        Err(last_error)
    }

    /// Disconnects the transport.
    pub async fn disconnect(&mut self) {
        if self.transport.is_connected() {
            let _ = self.transport.disconnect().await;
            self.diag.publish(DiagEvent::new(
                self.channel.clone(),
                None,
                DiagKind::Link {
                    connected: false,
                    detail: None,
                },
            ));
        }
    }

    /// Reads one block, honoring retry policy and inter-request pacing.
    pub async fn read_block(
        &mut self,
        unit: u8,
        device: &DeviceId,
        block: &ReadBlock,
        timing: &TimingPolicy,
    ) -> ModbusResult<BlockData> {
        let function = read_function_code(block.space);
        let attempts = timing.request_attempts.max(1);

        let mut attempt = 1;
        loop {
            self.pace(timing).await;
            self.emit_request(device, function, unit, block.start, block.count);

            let result = self
                .transport
                .read_space(unit, block.space, block.start, block.count)
                .await;
            self.last_request_end = Some(Instant::now());
            self.stats.record(&result.as_ref().map(|_| ()).map_err(|e| e.clone()));

            match result {
                Ok(data) => {
                    self.emit_response(
                        device,
                        function,
                        unit,
                        block.start,
                        block.count,
                        data.to_payload_bytes(),
                        DiagOutcome::Ok,
                    );
                    return Ok(data);
                }
                Err(e) => {
                    self.emit_response(
                        device,
                        function,
                        unit,
                        block.start,
                        block.count,
                        Vec::new(),
                        outcome_for(&e),
                    );
                    if e.is_retryable() && attempt < attempts {
                        tracing::debug!(
                            channel = %self.channel,
                            device = %device,
                            attempt,
                            attempts,
                            error = %e,
                            "Retrying block read"
                        );
                        attempt += 1;
                        sleep(RETRY_DELAY).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Executes one encoded write, honoring retry policy and pacing.
    pub async fn write(
        &mut self,
        unit: u8,
        device: &DeviceId,
        tag: &TagId,
        write: &DeviceWrite,
        timing: &TimingPolicy,
    ) -> ModbusResult<()> {
        let function = write.function_code();
        let attempts = timing.request_attempts.max(1);

        let mut attempt = 1;
        let result = loop {
            self.pace(timing).await;
            self.emit_request(device, function, unit, write.address(), write.count());

            let result = match write {
                DeviceWrite::Coil { address, value } => {
                    self.transport.write_single_coil(unit, *address, *value).await
                }
                DeviceWrite::Coils { address, values } => {
                    self.transport.write_multiple_coils(unit, *address, values).await
                }
                DeviceWrite::Register { address, value } => {
                    self.transport.write_single_register(unit, *address, *value).await
                }
                DeviceWrite::Registers { address, values } => {
                    self.transport
                        .write_multiple_registers(unit, *address, values)
                        .await
                }
            };
            self.last_request_end = Some(Instant::now());
            self.stats.record(&result.as_ref().map(|_| ()).map_err(|e| e.clone()));

            match result {
                Ok(()) => {
                    self.emit_response(
                        device,
                        function,
                        unit,
                        write.address(),
                        write.count(),
                        write.payload_bytes(),
                        DiagOutcome::Ok,
                    );
                    break Ok(());
                }
                Err(e) => {
                    self.emit_response(
                        device,
                        function,
                        unit,
                        write.address(),
                        write.count(),
                        Vec::new(),
                        outcome_for(&e),
                    );
                    if e.is_retryable() && attempt < attempts {
                        attempt += 1;
                        sleep(RETRY_DELAY).await;
                        continue;
                    }
                    break Err(e);
                }
            }
        };

        self.diag.publish(DiagEvent::new(
            self.channel.clone(),
            Some(device.clone()),
            DiagKind::Write {
                tag: tag.clone(),
                ok: result.is_ok(),
            },
        ));
        result
    }

    /// Waits out the inter-request gap since the previous request ended.
    async fn pace(&mut self, timing: &TimingPolicy) {
        if timing.inter_request_delay.is_zero() {
            return;
        }
        if let Some(end) = self.last_request_end {
            let elapsed = end.elapsed();
            if elapsed < timing.inter_request_delay {
                sleep(timing.inter_request_delay - elapsed).await;
            }
        }
    }

    fn emit_request(&self, device: &DeviceId, function: u8, unit: u8, address: u16, count: u16) {
        self.diag.publish(DiagEvent::new(
            self.channel.clone(),
            Some(device.clone()),
            DiagKind::Adu {
                direction: DiagDirection::Tx,
                function,
                unit,
                address,
                count,
                payload: Vec::new(),
                outcome: DiagOutcome::Ok,
            },
        ));
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_response(
        &self,
        device: &DeviceId,
        function: u8,
        unit: u8,
        address: u16,
        count: u16,
        payload: Vec<u8>,
        outcome: DiagOutcome,
    ) {
        self.diag.publish(DiagEvent::new(
            self.channel.clone(),
            Some(device.clone()),
            DiagKind::Adu {
                direction: DiagDirection::Rx,
                function,
                unit,
                address,
                count,
                payload,
                outcome,
            },
        ));
    }
}

impl std::fmt::Debug for ModbusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusClient")
            .field("channel", &self.channel)
            .field("endpoint", &self.transport.display_name())
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

fn outcome_for(error: &ModbusError) -> DiagOutcome {
    match error {
        ModbusError::Timeout { .. } => DiagOutcome::Timeout,
        ModbusError::Exception { code, .. } => DiagOutcome::Exception(*code),
        other => DiagOutcome::Error(other.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modua_core::address::RegisterSpace;
    use parking_lot::Mutex;

    /// Scripted transport for client behavior tests.
    struct ScriptedTransport {
        connected: bool,
        // Outcomes popped front-first, one per read request.
        read_script: Mutex<Vec<ModbusResult<Vec<u16>>>>,
        reads: Arc<AtomicU64>,
        writes: Arc<AtomicU64>,
    }

    impl ScriptedTransport {
        fn new(read_script: Vec<ModbusResult<Vec<u16>>>) -> Self {
            Self {
                connected: true,
                read_script: Mutex::new(read_script),
                reads: Arc::new(AtomicU64::new(0)),
                writes: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    #[async_trait]
    impl ModbusTransport for ScriptedTransport {
        async fn connect(&mut self) -> ModbusResult<()> {
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> ModbusResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn display_name(&self) -> String {
            "scripted".to_string()
        }

        async fn read_coils(&mut self, _: u8, _: u16, _: u16) -> ModbusResult<Vec<bool>> {
            unimplemented!("not scripted")
        }

        async fn read_discrete_inputs(&mut self, _: u8, _: u16, _: u16) -> ModbusResult<Vec<bool>> {
            unimplemented!("not scripted")
        }

        async fn read_holding_registers(
            &mut self,
            _: u8,
            _: u16,
            _: u16,
        ) -> ModbusResult<Vec<u16>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut script = self.read_script.lock();
            if script.is_empty() {
                return Ok(vec![0]);
            }
            script.remove(0)
        }

        async fn read_input_registers(&mut self, _: u8, _: u16, _: u16) -> ModbusResult<Vec<u16>> {
            unimplemented!("not scripted")
        }

        async fn write_single_coil(&mut self, _: u8, _: u16, _: bool) -> ModbusResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn write_single_register(&mut self, _: u8, _: u16, _: u16) -> ModbusResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn write_multiple_coils(&mut self, _: u8, _: u16, _: &[bool]) -> ModbusResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn write_multiple_registers(&mut self, _: u8, _: u16, _: &[u16]) -> ModbusResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn holding_block(start: u16, count: u16) -> ReadBlock {
        ReadBlock {
            space: RegisterSpace::HoldingRegister,
            start,
            count,
            scan_ms: 1000,
            members: Vec::new(),
        }
    }

    fn client(script: Vec<ModbusResult<Vec<u16>>>) -> (ModbusClient, Arc<AtomicU64>) {
        let transport = ScriptedTransport::new(script);
        let reads = transport.reads.clone();
        let client = ModbusClient::new(
            ChannelId::new("ch1"),
            Box::new(transport),
            Arc::new(DiagBus::default()),
        );
        (client, reads)
    }

    #[tokio::test]
    async fn test_read_success() {
        let (mut client, reads) = client(vec![Ok(vec![7, 8])]);
        let timing = TimingPolicy::default();
        let data = client
            .read_block(1, &DeviceId::new("d1"), &holding_block(0, 2), &timing)
            .await
            .unwrap();
        assert_eq!(data, BlockData::Words(vec![7, 8]));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().requests, 1);
        assert_eq!(client.stats().errors, 0);
    }

    #[tokio::test]
    async fn test_timeout_retries_then_succeeds() {
        let (mut client, reads) = client(vec![
            Err(ModbusError::timeout(Duration::from_millis(10))),
            Ok(vec![42]),
        ]);
        let timing = TimingPolicy {
            request_attempts: 2,
            ..TimingPolicy::default()
        };
        let data = client
            .read_block(1, &DeviceId::new("d1"), &holding_block(0, 1), &timing)
            .await
            .unwrap();
        assert_eq!(data, BlockData::Words(vec![42]));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(client.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_exception_is_not_retried() {
        let (mut client, reads) = client(vec![
            Err(ModbusError::exception(0x03, 0x02)),
            Ok(vec![42]),
        ]);
        let timing = TimingPolicy {
            request_attempts: 3,
            ..TimingPolicy::default()
        };
        let result = client
            .read_block(1, &DeviceId::new("d1"), &holding_block(0, 1), &timing)
            .await;
        assert!(matches!(result, Err(ModbusError::Exception { code: 0x02, .. })));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().exceptions, 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let (mut client, reads) = client(vec![
            Err(ModbusError::timeout(Duration::from_millis(10))),
            Err(ModbusError::timeout(Duration::from_millis(10))),
        ]);
        let timing = TimingPolicy {
            request_attempts: 2,
            ..TimingPolicy::default()
        };
        let result = client
            .read_block(1, &DeviceId::new("d1"), &holding_block(0, 1), &timing)
            .await;
        assert!(matches!(result, Err(ModbusError::Timeout { .. })));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_emits_diag_events() {
        let transport = ScriptedTransport::new(vec![]);
        let diag = Arc::new(DiagBus::default());
        let mut client = ModbusClient::new(ChannelId::new("ch1"), Box::new(transport), diag.clone());

        let write = DeviceWrite::Register { address: 5, value: 99 };
        client
            .write(
                1,
                &DeviceId::new("d1"),
                &TagId::new("t1"),
                &write,
                &TimingPolicy::default(),
            )
            .await
            .unwrap();

        let events = diag.recent(10);
        // TX request, RX response, write confirmation.
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2].kind,
            DiagKind::Write { ok: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_inter_request_pacing() {
        let (mut client, _) = client(vec![Ok(vec![1]), Ok(vec![2])]);
        let timing = TimingPolicy {
            inter_request_delay: Duration::from_millis(50),
            ..TimingPolicy::default()
        };
        let device = DeviceId::new("d1");
        let block = holding_block(0, 1);

        let start = Instant::now();
        client.read_block(1, &device, &block, &timing).await.unwrap();
        client.read_block(1, &device, &block, &timing).await.unwrap();
        // Second request waits out the gap from the first.
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_device_write_metadata() {
        let w = DeviceWrite::Registers { address: 10, values: vec![1, 2, 3] };
        assert_eq!(w.function_code(), 0x10);
        assert_eq!(w.address(), 10);
        assert_eq!(w.count(), 3);

        let w = DeviceWrite::Coil { address: 4, value: true };
        assert_eq!(w.function_code(), 0x05);
        assert_eq!(w.count(), 1);
    }
}
