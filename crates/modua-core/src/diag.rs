// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! ADU-level diagnostics event stream.
//!
//! Every Modbus request and response, connection transition and executed
//! write is published as a [`DiagEvent`] on a bounded broadcast channel.
//! Consumers (a diagnostics terminal, a log shipper) subscribe without
//! affecting the engine: a slow consumer loses the oldest events instead of
//! applying backpressure to the polling loop.
//!
//! The bus also keeps a bounded in-memory ring of recent events so a
//! consumer attaching late can show history.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::types::{ChannelId, DeviceId, TagId};

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default size of the retained event ring.
pub const DEFAULT_RECORD_CAPACITY: usize = 512;

// =============================================================================
// Events
// =============================================================================

/// Frame direction relative to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagDirection {
    /// Gateway to device.
    Tx,

    /// Device to gateway.
    Rx,
}

impl fmt::Display for DiagDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagDirection::Tx => write!(f, "TX"),
            DiagDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Outcome of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagOutcome {
    /// Normal response.
    Ok,

    /// The device answered with a Modbus exception code.
    Exception(u8),

    /// No response within the request timeout.
    Timeout,

    /// Transport-level failure.
    Error(String),
}

/// What a diagnostics event describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagKind {
    /// A request or response ADU summary.
    Adu {
        /// Frame direction.
        direction: DiagDirection,
        /// Modbus function code.
        function: u8,
        /// Unit identifier.
        unit: u8,
        /// Starting protocol address.
        address: u16,
        /// Number of bits or registers.
        count: u16,
        /// Payload bytes (register/bit data, empty for requests).
        payload: Vec<u8>,
        /// Exchange outcome (always `Ok` for TX frames).
        outcome: DiagOutcome,
    },

    /// Connection state transition on a channel.
    Link {
        /// `true` on connect, `false` on disconnect.
        connected: bool,
        /// Optional detail (error text on failed connects).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// A queued write reached the wire.
    Write {
        /// The tag that was written.
        tag: TagId,
        /// Whether the device confirmed the write.
        ok: bool,
    },
}

/// A timestamped diagnostics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagEvent {
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,

    /// The channel the event belongs to.
    pub channel: ChannelId,

    /// The device involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,

    /// Event payload.
    pub kind: DiagKind,
}

impl DiagEvent {
    /// Creates an event with the current timestamp.
    pub fn new(channel: ChannelId, device: Option<DeviceId>, kind: DiagKind) -> Self {
        Self {
            timestamp: Utc::now(),
            channel,
            device,
            kind,
        }
    }

    /// Renders the ADU payload as uppercase hex, space-separated.
    pub fn payload_hex(&self) -> Option<String> {
        match &self.kind {
            DiagKind::Adu { payload, .. } => Some(
                payload
                    .iter()
                    .map(|b| format!("{:02X}", b))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }
}

// =============================================================================
// DiagBus
// =============================================================================

/// Broadcast bus for diagnostics events with a bounded history ring.
///
/// Publishing never blocks and never fails: with no subscribers the event
/// only lands in the history ring.
pub struct DiagBus {
    tx: broadcast::Sender<DiagEvent>,
    records: RwLock<VecDeque<DiagEvent>>,
    record_capacity: usize,
    published: AtomicU64,
}

impl DiagBus {
    /// Creates a bus with the given channel and history capacities.
    pub fn new(event_capacity: usize, record_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            tx,
            records: RwLock::new(VecDeque::with_capacity(record_capacity)),
            record_capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Publishes an event to all subscribers and the history ring.
    pub fn publish(&self, event: DiagEvent) {
        {
            let mut records = self.records.write();
            if records.len() >= self.record_capacity {
                records.pop_front();
            }
            records.push_back(event.clone());
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        // An error here only means no subscriber is attached.
        let _ = self.tx.send(event);
    }

    /// Subscribes to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagEvent> {
        self.tx.subscribe()
    }

    /// Returns up to `limit` most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<DiagEvent> {
        let records = self.records.read();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    /// Total number of events published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Clears the history ring. Live subscribers are unaffected.
    pub fn clear_records(&self) {
        self.records.write().clear();
    }
}

impl Default for DiagBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY, DEFAULT_RECORD_CAPACITY)
    }
}

impl fmt::Debug for DiagBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagBus")
            .field("record_capacity", &self.record_capacity)
            .field("published", &self.published_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
