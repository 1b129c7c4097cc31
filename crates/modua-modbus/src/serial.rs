// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Serial RTU transport using tokio-serial.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_modbus::client::{rtu, Context as ModbusContext, Reader, Writer};
use tokio_modbus::prelude::*;
use tokio_modbus::Exception;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use modua_core::error::{ModbusError, ModbusResult};

use crate::tcp::{exception_code, map_transport_error};
use crate::transport::ModbusTransport;

// =============================================================================
// Serial Parameters
// =============================================================================

/// Parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,

    /// Odd parity.
    Odd,

    /// Even parity.
    Even,
}

/// Stop bits setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,

    /// Two stop bits.
    Two,
}

/// Flow control setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,

    /// XON/XOFF software flow control.
    Software,

    /// RTS/CTS hardware flow control.
    Hardware,
}

/// Serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Data bits (5-8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Flow control.
    #[serde(default)]
    pub flow_control: FlowControl,
}

fn default_baud() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

impl SerialParams {
    /// Creates parameters with the common 8-N-1 framing.
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

// =============================================================================
// SerialTransport
// =============================================================================

/// Modbus RTU transport over a local serial port.
pub struct SerialTransport {
    params: SerialParams,
    request_timeout: Duration,
    context: Option<ModbusContext>,
}

impl SerialTransport {
    /// Creates a new disconnected serial transport.
    pub fn new(params: SerialParams, request_timeout: Duration) -> Self {
        Self {
            params,
            request_timeout,
            context: None,
        }
    }

    fn open_stream(&self) -> ModbusResult<SerialStream> {
        let data_bits = match self.params.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let parity = match self.params.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let stop_bits = match self.params.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        };
        let flow_control = match self.params.flow_control {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        };

        tokio_serial::new(&self.params.port, self.params.baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .open_native_async()
            .map_err(|e| {
                ModbusError::connection_failed_with(
                    format!("failed to open serial port {}", self.params.port),
                    e,
                )
            })
    }

    fn context_for(&mut self, unit: u8) -> ModbusResult<&mut ModbusContext> {
        let ctx = self.context.as_mut().ok_or(ModbusError::NotConnected)?;
        ctx.set_slave(Slave(unit));
        Ok(ctx)
    }

    fn finish<T>(
        &mut self,
        function: u8,
        outcome: Result<Result<T, Exception>, tokio_modbus::Error>,
    ) -> ModbusResult<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(exception)) => Err(ModbusError::exception(function, exception_code(exception))),
            Err(e) => {
                let error = map_transport_error(e);
                if matches!(error, ModbusError::ConnectionFailed { .. }) {
                    self.context = None;
                }
                Err(error)
            }
        }
    }
}

#[async_trait]
impl ModbusTransport for SerialTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.context.is_some() {
            return Ok(());
        }

        let stream = self.open_stream()?;
        self.context = Some(rtu::attach_slave(stream, Slave(1)));

        tracing::info!(
            port = %self.params.port,
            baud = self.params.baud,
            "Opened Modbus RTU serial port"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::warn!(error = %e, "Error closing serial port");
            }
        }
        tracing::debug!(port = %self.params.port, "Closed Modbus RTU serial port");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn display_name(&self) -> String {
        format!("Modbus RTU {} @ {}", self.params.port, self.params.baud)
    }

    async fn read_coils(&mut self, unit: u8, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.read_coils(address, count))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x01, outcome)
    }

    async fn read_discrete_inputs(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.read_discrete_inputs(address, count))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x02, outcome)
    }

    async fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.read_holding_registers(address, count))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x03, outcome)
    }

    async fn read_input_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.read_input_registers(address, count))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x04, outcome)
    }

    async fn write_single_coil(&mut self, unit: u8, address: u16, value: bool) -> ModbusResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.write_single_coil(address, value))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x05, outcome)
    }

    async fn write_single_register(
        &mut self,
        unit: u8,
        address: u16,
        value: u16,
    ) -> ModbusResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.write_single_register(address, value))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x06, outcome)
    }

    async fn write_multiple_coils(
        &mut self,
        unit: u8,
        address: u16,
        values: &[bool],
    ) -> ModbusResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.write_multiple_coils(address, values))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x0F, outcome)
    }

    async fn write_multiple_registers(
        &mut self,
        unit: u8,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_for(unit)?;
        let outcome = timeout(request_timeout, ctx.write_multiple_registers(address, values))
            .await
            .map_err(|_| ModbusError::timeout(request_timeout))?;
        self.finish(0x10, outcome)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.params.port)
            .field("baud", &self.params.baud)
            .field("connected", &self.context.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
