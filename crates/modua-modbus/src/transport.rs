// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport abstraction for Modbus channels.
//!
//! A transport owns one physical or logical line (a TCP socket or a serial
//! port). Several devices can live behind one transport, so the unit
//! identifier is a per-request argument rather than transport state. The
//! engine serializes access to a shared transport; implementations assume
//! exclusive access through `&mut self`.

use async_trait::async_trait;

use modua_core::address::RegisterSpace;
use modua_core::error::ModbusResult;

// =============================================================================
// Transport State
// =============================================================================

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    /// Not connected.
    #[default]
    Disconnected,

    /// Connection attempt in progress.
    Connecting,

    /// Connected and operational.
    Connected,

    /// Reconnecting after a failure.
    Reconnecting,
}

// =============================================================================
// Block Data
// =============================================================================

/// Raw response data for one read block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    /// Coil or discrete input states.
    Bits(Vec<bool>),

    /// Register contents.
    Words(Vec<u16>),
}

impl BlockData {
    /// Number of units in the response.
    pub fn len(&self) -> usize {
        match self {
            BlockData::Bits(bits) => bits.len(),
            BlockData::Words(words) => words.len(),
        }
    }

    /// Returns `true` if the response is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the data as payload bytes for diagnostics.
    pub fn to_payload_bytes(&self) -> Vec<u8> {
        match self {
            BlockData::Bits(bits) => {
                // Pack LSB-first, as on the wire.
                let mut bytes = vec![0u8; bits.len().div_ceil(8)];
                for (i, bit) in bits.iter().enumerate() {
                    if *bit {
                        bytes[i / 8] |= 1 << (i % 8);
                    }
                }
                bytes
            }
            BlockData::Words(words) => words
                .iter()
                .flat_map(|w| w.to_be_bytes())
                .collect(),
        }
    }
}

// =============================================================================
// ModbusTransport
// =============================================================================

/// Async Modbus transport.
///
/// All read and write operations take the target unit identifier; the
/// per-request timeout is enforced inside the implementation.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Establishes the connection.
    async fn connect(&mut self) -> ModbusResult<()>;

    /// Closes the connection. Safe to call when already disconnected.
    async fn disconnect(&mut self) -> ModbusResult<()>;

    /// Returns `true` if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Human-readable endpoint description for logging.
    fn display_name(&self) -> String;

    /// Reads coils (FC 1).
    async fn read_coils(&mut self, unit: u8, address: u16, count: u16) -> ModbusResult<Vec<bool>>;

    /// Reads discrete inputs (FC 2).
    async fn read_discrete_inputs(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<bool>>;

    /// Reads holding registers (FC 3).
    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>>;

    /// Reads input registers (FC 4).
    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>>;

    /// Writes a single coil (FC 5).
    async fn write_single_coil(&mut self, unit: u8, address: u16, value: bool) -> ModbusResult<()>;

    /// Writes a single register (FC 6).
    async fn write_single_register(
        &mut self,
        unit: u8,
        address: u16,
        value: u16,
    ) -> ModbusResult<()>;

    /// Writes multiple coils (FC 15).
    async fn write_multiple_coils(
        &mut self,
        unit: u8,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<()>;

    /// Writes multiple registers (FC 16).
    async fn write_multiple_registers(
        &mut self,
        unit: u8,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()>;

    /// Reads one register space, dispatching to the matching function code.
    async fn read_space(
        &mut self,
        unit: u8,
        space: RegisterSpace,
        address: u16,
        count: u16,
    ) -> ModbusResult<BlockData> {
        match space {
            RegisterSpace::Coil => self.read_coils(unit, address, count).await.map(BlockData::Bits),
            RegisterSpace::DiscreteInput => self
                .read_discrete_inputs(unit, address, count)
                .await
                .map(BlockData::Bits),
            RegisterSpace::HoldingRegister => self
                .read_holding_registers(unit, address, count)
                .await
                .map(BlockData::Words),
            RegisterSpace::InputRegister => self
                .read_input_registers(unit, address, count)
                .await
                .map(BlockData::Words),
        }
    }
}

/// Function code for reading a register space.
#[inline]
pub fn read_function_code(space: RegisterSpace) -> u8 {
    match space {
        RegisterSpace::Coil => 0x01,
        RegisterSpace::DiscreteInput => 0x02,
        RegisterSpace::HoldingRegister => 0x03,
        RegisterSpace::InputRegister => 0x04,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_data_len() {
        assert_eq!(BlockData::Bits(vec![true, false]).len(), 2);
        assert_eq!(BlockData::Words(vec![1, 2, 3]).len(), 3);
        assert!(BlockData::Words(vec![]).is_empty());
    }

    #[test]
    fn test_payload_bytes() {
        let data = BlockData::Words(vec![0x1234, 0xABCD]);
        assert_eq!(data.to_payload_bytes(), vec![0x12, 0x34, 0xAB, 0xCD]);

        let data = BlockData::Bits(vec![true, false, false, true, false, false, false, false, true]);
        assert_eq!(data.to_payload_bytes(), vec![0b0000_1001, 0b0000_0001]);
    }

    #[test]
    fn test_read_function_codes() {
        assert_eq!(read_function_code(RegisterSpace::Coil), 0x01);
        assert_eq!(read_function_code(RegisterSpace::DiscreteInput), 0x02);
        assert_eq!(read_function_code(RegisterSpace::HoldingRegister), 0x03);
        assert_eq!(read_function_code(RegisterSpace::InputRegister), 0x04);
    }
}
