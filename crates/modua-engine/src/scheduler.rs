// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-device polling scheduler.
//!
//! Each enabled device runs one scheduler task driving a small state
//! machine:
//!
//! ```text
//! Idle ──► Connecting ──► Polling ◄──► WriteDraining
//!              ▲             │
//!              └── Faulted ◄─┘  (repeated cycle failures)
//! ```
//!
//! A polling cycle drains a bounded batch of pending writes first, then
//! reads every due block. After a successful write the covering block is
//! re-read immediately, so the confirmed device state reaches the buffer
//! without waiting for the next scan. Faulted devices mark all their
//! tags bad and reconnect with exponential backoff; devices on other
//! channels are unaffected.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use modua_config::schema::{DeviceConfig, ResolvedTag};
use modua_core::error::{ConfigError, ModbusError, ModbusResult};
use modua_core::scaling::Scaling;
use modua_core::types::{BadReason, ChannelId, DataQuality, DeviceId, TagDataType, TagId, TagValue};
use modua_modbus::blocks::{plan_blocks, PlannedTag, ReadBlock};
use modua_modbus::client::{DeviceWrite, TimingPolicy};
use modua_modbus::codec::{decode_bits, decode_registers, encode_bits, encode_registers, EncodingConfig};
use modua_modbus::transport::BlockData;

use crate::buffer::DataBuffer;
use crate::runtime::SharedClient;
use crate::write_queue::WriteQueue;
use std::sync::Arc;

/// Initial reconnect backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Backoff ceiling.
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Shortest pause between cycles.
const MIN_PAUSE: Duration = Duration::from_millis(10);

/// Longest pause between cycles; keeps write latency bounded.
const MAX_PAUSE: Duration = Duration::from_millis(100);

// =============================================================================
// Device State
// =============================================================================

/// Scheduler state for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Created but not started.
    #[default]
    Idle,

    /// Establishing the connection.
    Connecting,

    /// Reading due blocks.
    Polling,

    /// Draining pending writes.
    WriteDraining,

    /// Communication lost; reconnecting with backoff.
    Faulted,
}

// =============================================================================
// Device Spec
// =============================================================================

/// Everything the scheduler needs to know about one device, resolved
/// from configuration.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Owning channel.
    pub channel: ChannelId,

    /// Device identifier (`channel/device`).
    pub device: DeviceId,

    /// Modbus unit identifier.
    pub unit: u8,

    /// Timing policy.
    pub timing: TimingPolicy,

    /// Multi-register encoding options.
    pub encoding: EncodingConfig,

    /// Use FC 5 for single-coil writes.
    pub func_05: bool,

    /// Use FC 6 for single-register writes.
    pub func_06: bool,

    /// Resolved tags by identifier.
    pub tags: HashMap<TagId, ResolvedTag>,

    /// Planned read blocks covering every tag.
    pub blocks: Vec<ReadBlock>,
}

impl DeviceSpec {
    /// Builds the spec from a device's configuration.
    ///
    /// Tags that fail to resolve or to plan are excluded and reported;
    /// the rest of the device keeps running.
    pub fn from_config(channel: &str, config: &DeviceConfig) -> (Self, Vec<ConfigError>) {
        let (resolved, mut errors) = config.resolve_tags(channel);

        let planned: Vec<PlannedTag> = resolved
            .iter()
            .map(|t| PlannedTag {
                id: t.id.clone(),
                address: t.address,
                data_type: t.data_type,
                scan_ms: t.scan_ms,
            })
            .collect();
        let (blocks, plan_errors) = plan_blocks(&planned, &config.blocks);
        errors.extend(plan_errors);

        // Keep only tags some block actually covers.
        let tags: HashMap<TagId, ResolvedTag> = resolved
            .into_iter()
            .filter(|t| blocks.iter().any(|b| b.contains(&t.id)))
            .map(|t| (t.id.clone(), t))
            .collect();

        let spec = Self {
            channel: ChannelId::new(channel),
            device: DeviceId::new(device_path(channel, &config.name)),
            unit: config.unit,
            timing: config.timing.to_policy(),
            encoding: config.encoding,
            func_05: config.access.func_05,
            func_06: config.access.func_06,
            tags,
            blocks,
        };
        (spec, errors)
    }
}

/// Builds the project-wide device identifier.
pub fn device_path(channel: &str, device: &str) -> String {
    format!("{channel}/{device}")
}

// =============================================================================
// Device Scheduler
// =============================================================================

/// The polling task for one device.
pub struct DeviceScheduler {
    spec: DeviceSpec,
    client: SharedClient,
    buffer: Arc<DataBuffer>,
    writes: Arc<WriteQueue>,

    state: DeviceState,
    due: Vec<Instant>,
    consecutive_failures: u32,
    backoff: Duration,
}

impl DeviceScheduler {
    /// Creates a scheduler; call [`run`](Self::run) to start it.
    pub fn new(
        spec: DeviceSpec,
        client: SharedClient,
        buffer: Arc<DataBuffer>,
        writes: Arc<WriteQueue>,
    ) -> Self {
        let due = vec![Instant::now(); spec.blocks.len()];
        Self {
            spec,
            client,
            buffer,
            writes,
            state: DeviceState::Idle,
            due,
            consecutive_failures: 0,
            backoff: BACKOFF_BASE,
        }
    }

    /// Current scheduler state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Runs the scheduler until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        for tag in self.spec.tags.keys() {
            self.buffer.register(tag.clone());
        }
        info!(
            device = %self.spec.device,
            unit = self.spec.unit,
            tags = self.spec.tags.len(),
            blocks = self.spec.blocks.len(),
            "Device scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.step() => {}
            }
        }

        self.mark_all(DataQuality::Bad(BadReason::OutOfService));
        info!(device = %self.spec.device, "Device scheduler stopped");
    }

    async fn step(&mut self) {
        match self.state {
            DeviceState::Idle => self.state = DeviceState::Connecting,
            DeviceState::Connecting => self.connect().await,
            DeviceState::Polling | DeviceState::WriteDraining => self.cycle().await,
            DeviceState::Faulted => self.back_off().await,
        }
    }

    async fn connect(&mut self) {
        let result = {
            let mut client = self.client.lock().await;
            client.ensure_connected(&self.spec.timing).await
        };
        match result {
            Ok(()) => {
                self.state = DeviceState::Polling;
                self.consecutive_failures = 0;
                self.backoff = BACKOFF_BASE;
                let now = Instant::now();
                for due in &mut self.due {
                    *due = now;
                }
            }
            Err(e) => {
                warn!(device = %self.spec.device, error = %e, "Connection failed");
                self.fault();
            }
        }
    }

    fn fault(&mut self) {
        self.state = DeviceState::Faulted;
        self.mark_all(DataQuality::Bad(BadReason::NotConnected));
    }

    async fn back_off(&mut self) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
        debug!(
            device = %self.spec.device,
            backoff_ms = self.backoff.as_millis() as u64,
            "Backing off before reconnect"
        );
        sleep(self.backoff + jitter).await;
        self.backoff = (self.backoff * 2).min(BACKOFF_MAX);
        self.state = DeviceState::Connecting;
    }

    /// One polling cycle: drain writes, then read due blocks.
    async fn cycle(&mut self) {
        let mut cycle_failed = false;

        let batch = self
            .writes
            .dequeue_batch(&self.spec.device, self.spec.timing.max_writes_per_cycle);
        if !batch.is_empty() {
            self.state = DeviceState::WriteDraining;
            for request in batch {
                if !self.execute_write(&request.tag, &request.value).await {
                    cycle_failed = true;
                }
            }
            self.state = DeviceState::Polling;
        }

        let now = Instant::now();
        let mut did_work = false;
        for index in 0..self.spec.blocks.len() {
            if self.due[index] > now {
                continue;
            }
            did_work = true;
            if !self.read_block(index).await {
                cycle_failed = true;
            }
        }

        if cycle_failed {
            self.consecutive_failures += 1;
            // The device's connect-attempts setting doubles as the number
            // of failed cycles tolerated before the device faults.
            if self.consecutive_failures >= self.spec.timing.connect_attempts.max(1) {
                warn!(
                    device = %self.spec.device,
                    failures = self.consecutive_failures,
                    "Repeated cycle failures, faulting device"
                );
                self.fault();
                return;
            }
        } else if did_work {
            self.consecutive_failures = 0;
        }

        self.pause().await;
    }

    /// Sleeps until the next block is due, bounded so pending writes are
    /// picked up promptly.
    async fn pause(&self) {
        let now = Instant::now();
        let next_due = self.due.iter().min().copied().unwrap_or(now + MAX_PAUSE);
        let mut wait = next_due.saturating_duration_since(now);
        if self.writes.pending_for(&self.spec.device) > 0 {
            wait = MIN_PAUSE;
        }
        sleep(wait.clamp(MIN_PAUSE, MAX_PAUSE)).await;
    }

    /// Reads one block and publishes its members. Returns `false` on a
    /// communication failure.
    async fn read_block(&mut self, index: usize) -> bool {
        let block = self.spec.blocks[index].clone();
        let result = {
            let mut client = self.client.lock().await;
            client
                .read_block(self.spec.unit, &self.spec.device, &block, &self.spec.timing)
                .await
        };
        self.due[index] = Instant::now() + Duration::from_millis(block.scan_ms);

        match result {
            Ok(data) => {
                self.publish_block(&block, &data);
                true
            }
            Err(e) => {
                debug!(device = %self.spec.device, error = %e, "Block read failed");
                let members: Vec<&TagId> = block.members.iter().map(|m| &m.tag).collect();
                self.buffer
                    .set_quality_many(members, DataQuality::Bad(BadReason::CommunicationFailure));
                false
            }
        }
    }

    /// Decodes every member of a block response into the buffer.
    ///
    /// A decode failure degrades only the affected tag; its siblings in
    /// the same block still publish.
    fn publish_block(&self, block: &ReadBlock, data: &BlockData) {
        for member in &block.members {
            let range = block.member_range(member);
            let decoded = match data {
                BlockData::Bits(bits) => {
                    let end = range.end.min(bits.len());
                    Ok(decode_bits(&bits[range.start.min(end)..end], member.count))
                }
                BlockData::Words(words) => {
                    if range.end > words.len() {
                        Err(ModbusError::invalid_response("short block response"))
                    } else {
                        decode_registers(
                            &words[range],
                            member.data_type,
                            member.count,
                            &self.spec.encoding,
                        )
                    }
                }
            };

            match decoded {
                Ok(value) => {
                    let scaling = self
                        .spec
                        .tags
                        .get(&member.tag)
                        .and_then(|t| t.scaling.as_ref());
                    self.buffer.publish(&member.tag, apply_scaling(value, scaling));
                }
                Err(e) => {
                    debug!(tag = %member.tag, error = %e, "Decode failed");
                    self.buffer
                        .set_quality(&member.tag, DataQuality::Bad(BadReason::DecodeFailure));
                }
            }
        }
    }

    /// Executes one pending write and re-reads the covering block.
    /// Returns `false` when the failure should count against the device.
    async fn execute_write(&mut self, tag_id: &TagId, value: &TagValue) -> bool {
        let Some(tag) = self.spec.tags.get(tag_id) else {
            warn!(tag = %tag_id, "Write for unknown tag dropped");
            self.writes.record_failed();
            return true;
        };

        let write = match encode_write(tag, value, &self.spec.encoding, self.spec.func_05, self.spec.func_06) {
            Ok(write) => write,
            Err(e) => {
                // A rejected value is the client's fault, not the device's.
                warn!(tag = %tag_id, error = %e, "Write rejected before the wire");
                self.writes.record_failed();
                return true;
            }
        };

        let result = {
            let mut client = self.client.lock().await;
            client
                .write(self.spec.unit, &self.spec.device, tag_id, &write, &self.spec.timing)
                .await
        };

        match result {
            Ok(()) => {
                self.writes.record_executed();
                // Confirm through the device: re-read the covering block now.
                if let Some(index) = self.spec.blocks.iter().position(|b| b.contains(tag_id)) {
                    self.read_block(index).await;
                }
                true
            }
            Err(e) => {
                warn!(tag = %tag_id, error = %e, "Write failed");
                self.writes.record_failed();
                !e.is_retryable()
            }
        }
    }

    fn mark_all(&self, quality: DataQuality) {
        self.buffer.set_quality_many(self.spec.tags.keys(), quality);
    }
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Maps a decoded raw value into engineering units.
///
/// Array elements scale individually; non-numeric values pass through.
fn apply_scaling(value: TagValue, scaling: Option<&Scaling>) -> TagValue {
    let Some(scaling) = scaling else {
        return value;
    };
    match value {
        TagValue::Word(v) => TagValue::Double(scaling.apply(v as f64)),
        TagValue::Float(v) => TagValue::Double(scaling.apply(v as f64)),
        TagValue::Double(v) => TagValue::Double(scaling.apply(v)),
        TagValue::Array(items) => TagValue::Array(
            items
                .into_iter()
                .map(|item| apply_scaling(item, Some(scaling)))
                .collect(),
        ),
        other => other,
    }
}

/// Builds the wire operation for one write.
fn encode_write(
    tag: &ResolvedTag,
    value: &TagValue,
    enc: &EncodingConfig,
    func_05: bool,
    func_06: bool,
) -> ModbusResult<DeviceWrite> {
    let address = tag.address.offset;

    if tag.address.space.is_bit() {
        let bits = encode_bits(value, tag.address.count)?;
        return Ok(if bits.len() == 1 && func_05 {
            DeviceWrite::Coil { address, value: bits[0] }
        } else {
            DeviceWrite::Coils { address, values: bits }
        });
    }

    let raw = to_raw_value(tag, value)?;
    let words = encode_registers(&raw, tag.data_type, tag.address.count, enc)?;
    Ok(if words.len() == 1 && func_06 {
        DeviceWrite::Register { address, value: words[0] }
    } else {
        DeviceWrite::Registers { address, values: words }
    })
}

/// Converts an engineering-unit value to its raw wire value, applying
/// reverse scaling and rounding for integral types.
fn to_raw_value(tag: &ResolvedTag, value: &TagValue) -> ModbusResult<TagValue> {
    if tag.address.count > 1 && tag.data_type != TagDataType::String {
        let items = value
            .as_array()
            .ok_or_else(|| ModbusError::write_rejected("expected an array value"))?;
        if items.len() != tag.address.count as usize {
            return Err(ModbusError::write_rejected(format!(
                "expected {} elements, got {}",
                tag.address.count,
                items.len()
            )));
        }
        let raw = items
            .iter()
            .map(|item| raw_scalar(tag, item))
            .collect::<ModbusResult<Vec<_>>>()?;
        return Ok(TagValue::Array(raw));
    }
    raw_scalar(tag, value)
}

fn raw_scalar(tag: &ResolvedTag, value: &TagValue) -> ModbusResult<TagValue> {
    match tag.data_type {
        TagDataType::Boolean => value
            .as_bool()
            .map(TagValue::Bool)
            .ok_or_else(|| ModbusError::write_rejected("expected a boolean value")),
        TagDataType::String => value
            .as_str()
            .map(|s| TagValue::Text(s.to_string()))
            .ok_or_else(|| ModbusError::write_rejected("expected a string value")),
        TagDataType::Word | TagDataType::Bcd => {
            let raw = unscaled(tag, value)?.round();
            if !(0.0..=65535.0).contains(&raw) {
                return Err(ModbusError::write_rejected(format!(
                    "raw value {raw} out of range for a 16-bit register"
                )));
            }
            Ok(TagValue::Word(raw as u16))
        }
        TagDataType::Float => Ok(TagValue::Float(unscaled(tag, value)? as f32)),
        TagDataType::Double => Ok(TagValue::Double(unscaled(tag, value)?)),
    }
}

fn unscaled(tag: &ResolvedTag, value: &TagValue) -> ModbusResult<f64> {
    let scaled = value
        .as_f64()
        .ok_or_else(|| ModbusError::write_rejected("expected a numeric value"))?;
    Ok(match &tag.scaling {
        Some(scaling) => scaling.unapply(scaled),
        None => scaled,
    })
}

// =============================================================================
// Tests
// =============================================================================
