// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The ModUA polling engine.
//!
//! The engine owns the shared runtime state and one scheduler task per
//! enabled device:
//!
//! ```text
//! ProjectConfig ──► Runtime::start
//!                     │
//!                     ├── DataBuffer   (last known value per tag)
//!                     ├── WriteQueue   (pending writes, last-write-wins)
//!                     ├── DiagBus      (ADU / link / write events)
//!                     └── one DeviceScheduler task per device
//!                           └── shared ModbusClient per channel
//! ```
//!
//! Schedulers on the same channel serialize on the channel's client;
//! schedulers on different channels are fully independent. The OPC UA
//! bridge reads the buffer and feeds the write queue without ever
//! touching a transport.

pub mod buffer;
pub mod scheduler;
pub mod runtime;
pub mod write_queue;

pub use buffer::DataBuffer;
pub use runtime::{Runtime, RuntimeHandle, SharedClient};
pub use scheduler::{device_path, DeviceScheduler, DeviceSpec, DeviceState};
pub use write_queue::{QueueStats, WriteQueue};
