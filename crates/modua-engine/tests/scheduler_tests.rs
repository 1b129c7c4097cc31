// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Scheduler behavior against a scripted in-memory device.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use modua_config::schema::{
    AccessConfig, DeviceConfig, GroupConfig, TagAccess, TagConfig, TimingConfig,
};
use modua_core::diag::DiagBus;
use modua_core::error::{ModbusError, ModbusResult};
use modua_core::scaling::Scaling;
use modua_core::types::{
    BadReason, ChannelId, DataQuality, DeviceId, TagDataType, TagId, TagValue, WriteOrigin,
    WriteRequest,
};
use modua_engine::{DataBuffer, DeviceScheduler, DeviceSpec, WriteQueue};
use modua_modbus::blocks::BlockLimits;
use modua_modbus::client::ModbusClient;
use modua_modbus::codec::EncodingConfig;
use modua_modbus::transport::ModbusTransport;

// =============================================================================
// Mock Device
// =============================================================================

#[derive(Debug, Default)]
struct MockState {
    holdings: Vec<u16>,
    coils: Vec<bool>,
    fail_connect: bool,
    fail_reads: bool,
    write_ops: u64,
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
    connected: bool,
}

impl MockTransport {
    fn new(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            connected: false,
        }
    }
}

#[async_trait]
impl ModbusTransport for MockTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.state.lock().fail_connect {
            return Err(ModbusError::connection_failed("mock refused"));
        }
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
        "mock".to_string()
    }

    async fn read_coils(&mut self, _: u8, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(ModbusError::timeout(Duration::from_millis(10)));
        }
        Ok(state.coils[address as usize..(address + count) as usize].to_vec())
    }

    async fn read_discrete_inputs(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        self.read_coils(unit, address, count).await
    }

    async fn read_holding_registers(
        &mut self,
        _: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(ModbusError::timeout(Duration::from_millis(10)));
        }
        Ok(state.holdings[address as usize..(address + count) as usize].to_vec())
    }

    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        self.read_holding_registers(unit, address, count).await
    }

    async fn write_single_coil(&mut self, _: u8, address: u16, value: bool) -> ModbusResult<()> {
        let mut state = self.state.lock();
        state.coils[address as usize] = value;
        state.write_ops += 1;
        Ok(())
    }

    async fn write_single_register(&mut self, _: u8, address: u16, value: u16) -> ModbusResult<()> {
        let mut state = self.state.lock();
        state.holdings[address as usize] = value;
        state.write_ops += 1;
        Ok(())
    }

    async fn write_multiple_coils(&mut self, _: u8, address: u16, values: &[bool]) -> ModbusResult<()> {
        let mut state = self.state.lock();
        for (i, v) in values.iter().enumerate() {
            state.coils[address as usize + i] = *v;
        }
        state.write_ops += 1;
        Ok(())
    }

    async fn write_multiple_registers(
        &mut self,
        _: u8,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let mut state = self.state.lock();
        for (i, v) in values.iter().enumerate() {
            state.holdings[address as usize + i] = *v;
        }
        state.write_ops += 1;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn tag(name: &str, address: &str, data_type: TagDataType, access: TagAccess) -> TagConfig {
    TagConfig {
        name: name.to_string(),
        address: address.to_string(),
        data_type,
        access,
        scan_ms: 20,
        scaling: None,
        description: None,
    }
}

fn device(name: &str, tags: Vec<TagConfig>) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        unit: 1,
        enabled: true,
        timing: TimingConfig {
            connect_attempts: 1,
            ..TimingConfig::default()
        },
        access: AccessConfig::default(),
        encoding: EncodingConfig::default(),
        blocks: BlockLimits::default(),
        groups: vec![GroupConfig {
            name: "g".to_string(),
            tags,
        }],
    }
}

struct Harness {
    state: Arc<Mutex<MockState>>,
    buffer: Arc<DataBuffer>,
    writes: Arc<WriteQueue>,
    shutdown_tx: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

fn start(config: &DeviceConfig, state: Arc<Mutex<MockState>>) -> Harness {
    let (spec, errors) = DeviceSpec::from_config("ch1", config);
    assert!(errors.is_empty(), "unexpected config errors: {errors:?}");

    let buffer = Arc::new(DataBuffer::new());
    let writes = Arc::new(WriteQueue::new());
    let client = Arc::new(tokio::sync::Mutex::new(ModbusClient::new(
        ChannelId::new("ch1"),
        Box::new(MockTransport::new(state.clone())),
        Arc::new(DiagBus::default()),
    )));

    let scheduler = DeviceScheduler::new(spec, client, buffer.clone(), writes.clone());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(scheduler.run(shutdown_rx));

    Harness {
        state,
        buffer,
        writes,
        shutdown_tx,
        task,
    }
}

impl Harness {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

fn tag_id(name: &str) -> TagId {
    TagId::new(format!("ch1/d1/g/{name}"))
}

fn device_id() -> DeviceId {
    DeviceId::new("ch1/d1")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_polling_publishes_good_values() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));
    state.lock().holdings[0] = 1234;

    let config = device("d1", vec![tag("speed", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = harness.buffer.get(&tag_id("speed")).unwrap();
    assert_eq!(entry.value, TagValue::Word(1234));
    assert!(entry.quality.is_good());

    harness.stop().await;
}

#[tokio::test]
async fn test_scaled_tag_publishes_engineering_units() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));
    state.lock().holdings[0] = 32768;

    let mut config = device("d1", vec![tag("pct", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    config.groups[0].tags[0].scaling = Some(Scaling::linear(0.0, 65535.0, 0.0, 100.0));
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = harness.buffer.get(&tag_id("pct")).unwrap();
    match entry.value {
        TagValue::Double(v) => assert!((v - 50.0).abs() < 0.01, "got {v}"),
        other => panic!("expected Double, got {other:?}"),
    }

    harness.stop().await;
}

#[tokio::test]
async fn test_boolean_array_from_discrete_inputs() {
    let state = Arc::new(Mutex::new(MockState {
        coils: vec![false; 2000],
        ..MockState::default()
    }));
    state.lock().coils[1023] = true;
    state.lock().coils[1030] = true;

    let config = device(
        "d1",
        vec![tag("flags", "101024 [40]", TagDataType::Boolean, TagAccess::ReadOnly)],
    );
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = harness.buffer.get(&tag_id("flags")).unwrap();
    let items = entry.value.as_array().expect("array value");
    assert_eq!(items.len(), 40);
    assert_eq!(items[0], TagValue::Bool(true));
    assert_eq!(items[7], TagValue::Bool(true));
    assert_eq!(items[1], TagValue::Bool(false));

    harness.stop().await;
}

#[tokio::test]
async fn test_end_to_end_write_confirms_through_read() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));

    let config = device("d1", vec![tag("sp", "400005", TagDataType::Word, TagAccess::ReadWrite)]);
    let harness = start(&config, state.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.writes.enqueue(WriteRequest::new(
        tag_id("sp"),
        device_id(),
        TagValue::Word(777),
        WriteOrigin::OpcUa,
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.lock().holdings[4], 777);
    let entry = harness.buffer.get(&tag_id("sp")).unwrap();
    assert_eq!(entry.value, TagValue::Word(777));
    assert!(entry.quality.is_good());
    assert_eq!(harness.writes.stats().executed, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_last_write_wins_reaches_wire_once() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));

    let config = device("d1", vec![tag("sp", "400001", TagDataType::Word, TagAccess::ReadWrite)]);

    // Enqueue a burst before the scheduler starts draining.
    let writes_before = {
        let harness = start(&config, state.clone());
        for value in [1u16, 2, 3] {
            harness.writes.enqueue(WriteRequest::new(
                tag_id("sp"),
                device_id(),
                TagValue::Word(value),
                WriteOrigin::OpcUa,
            ));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = harness.writes.stats();
        harness.stop().await;
        stats
    };

    assert_eq!(state.lock().holdings[0], 3);
    assert_eq!(writes_before.executed, 1);
    assert_eq!(writes_before.replaced, 2);
}

#[tokio::test]
async fn test_connect_failure_marks_tags_bad() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        fail_connect: true,
        ..MockState::default()
    }));

    let config = device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = harness.buffer.get(&tag_id("t")).unwrap();
    assert_eq!(entry.quality, DataQuality::Bad(BadReason::NotConnected));
    assert_eq!(entry.value, TagValue::Null);

    harness.stop().await;
}

#[tokio::test]
async fn test_read_failure_keeps_last_value_with_bad_quality() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));
    state.lock().holdings[0] = 42;

    let config = device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    let harness = start(&config, state.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(harness.buffer.get(&tag_id("t")).unwrap().quality.is_good());

    state.lock().fail_reads = true;
    tokio::time::sleep(Duration::from_millis(250)).await;

    let entry = harness.buffer.get(&tag_id("t")).unwrap();
    assert!(entry.quality.is_bad());
    // Last known value survives the quality change.
    assert_eq!(entry.value, TagValue::Word(42));

    harness.stop().await;
}

#[tokio::test]
async fn test_fault_threshold_follows_connect_attempts() {
    // Reads fail from the first cycle. With a generous connect_attempts
    // setting the device stays degraded instead of faulting outright, so
    // the tags keep the read-failure quality rather than NotConnected.
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        fail_reads: true,
        ..MockState::default()
    }));

    let mut config = device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    config.timing.connect_attempts = 100;
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let entry = harness.buffer.get(&tag_id("t")).unwrap();
    assert_eq!(
        entry.quality,
        DataQuality::Bad(BadReason::CommunicationFailure)
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_persistent_read_failures_fault_the_device() {
    // The default test device tolerates a single failed cycle, so the
    // same failing reads push it all the way to the faulted state.
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        fail_reads: true,
        ..MockState::default()
    }));

    let config = device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let entry = harness.buffer.get(&tag_id("t")).unwrap();
    assert_eq!(entry.quality, DataQuality::Bad(BadReason::NotConnected));

    harness.stop().await;
}

#[tokio::test]
async fn test_faulted_device_leaves_others_polling() {
    let failing_state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        fail_connect: true,
        ..MockState::default()
    }));
    let healthy_state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));
    healthy_state.lock().holdings[0] = 55;

    let failing = start(
        &device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]),
        failing_state,
    );
    let healthy = start(
        &device("d2", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]),
        healthy_state,
    );
    let healthy_tag = TagId::new("ch1/d2/g/t");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let faulted = failing.buffer.get(&tag_id("t")).unwrap();
    assert_eq!(faulted.quality, DataQuality::Bad(BadReason::NotConnected));

    let entry = healthy.buffer.get(&healthy_tag).unwrap();
    assert_eq!(entry.value, TagValue::Word(55));
    assert!(entry.quality.is_good());

    // The healthy scheduler keeps cycling while its neighbor retries.
    let count = entry.update_count;
    healthy.state.lock().holdings[0] = 56;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let entry = healthy.buffer.get(&healthy_tag).unwrap();
    assert_eq!(entry.value, TagValue::Word(56));
    assert!(entry.update_count > count);

    failing.stop().await;
    healthy.stop().await;
}

#[tokio::test]
async fn test_shutdown_marks_out_of_service() {
    let state = Arc::new(Mutex::new(MockState {
        holdings: vec![0; 100],
        ..MockState::default()
    }));

    let config = device("d1", vec![tag("t", "400001", TagDataType::Word, TagAccess::ReadOnly)]);
    let harness = start(&config, state);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let buffer = harness.buffer.clone();
    harness.stop().await;

    let entry = buffer.get(&tag_id("t")).unwrap();
    assert_eq!(entry.quality, DataQuality::Bad(BadReason::OutOfService));
}
