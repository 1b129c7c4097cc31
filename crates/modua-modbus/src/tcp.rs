// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TCP transports using tokio-modbus.
//!
//! Two framings share this module: plain Modbus TCP (MBAP header) and RTU
//! frames tunneled over a TCP socket, as produced by most serial-to-ethernet
//! converters. The framing only changes which codec is attached to the
//! stream; everything else is identical.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::{rtu, tcp, Context as ModbusContext, Reader, Writer};
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, Exception};

use modua_core::error::{ModbusError, ModbusResult};

use crate::transport::ModbusTransport;

// =============================================================================
// Framing
// =============================================================================

/// Frame format carried over the TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TcpFraming {
    /// Standard Modbus TCP with MBAP header.
    #[default]
    Tcp,

    /// RTU frames (CRC16) tunneled through the socket.
    Rtu,
}

// =============================================================================
// TcpTransport
// =============================================================================

/// Modbus-over-TCP transport.
///
/// # Example
///
/// ```rust,ignore
/// use modua_modbus::tcp::{TcpFraming, TcpTransport};
/// use modua_modbus::transport::ModbusTransport;
/// use std::time::Duration;
///
/// let mut transport = TcpTransport::new(
///     "192.168.1.100",
///     502,
///     TcpFraming::Tcp,
///     Duration::from_secs(3),
///     Duration::from_millis(1000),
/// );
/// transport.connect().await?;
/// let regs = transport.read_holding_registers(1, 0, 10).await?;
/// ```
pub struct TcpTransport {
    host: String,
    port: u16,
    framing: TcpFraming,
    connect_timeout: Duration,
    request_timeout: Duration,
    context: Option<ModbusContext>,
}

impl TcpTransport {
    /// Creates a new disconnected TCP transport.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        framing: TcpFraming,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            framing,
            connect_timeout,
            request_timeout,
            context: None,
        }
    }

    /// Resolves `host:port` to a socket address.
    ///
    /// Takes owned values so the lookup future does not borrow the
    /// transport; the connect future has to stay `Send`.
    async fn resolve_address(host: String, port: u16) -> ModbusResult<SocketAddr> {
        let addr_str = format!("{host}:{port}");
        if let Ok(addr) = addr_str.parse::<SocketAddr>() {
            return Ok(addr);
        }

        let mut addrs = tokio::net::lookup_host(&addr_str).await.map_err(|e| {
            ModbusError::connection_failed_with(format!("DNS lookup failed for {host}"), e)
        })?;
        addrs
            .next()
            .ok_or_else(|| ModbusError::connection_failed(format!("no address for {host}")))
    }

    fn context_for(&mut self, unit: u8) -> ModbusResult<&mut ModbusContext> {
        let ctx = self.context.as_mut().ok_or(ModbusError::NotConnected)?;
        ctx.set_slave(Slave(unit));
        Ok(ctx)
    }

    /// Unwraps the double result tokio-modbus returns, dropping the
    /// context on transport-level failures so the next cycle reconnects.
    fn finish<T>(
        &mut self,
        function: u8,
        outcome: Result<Result<T, Exception>, TokioModbusError>,
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
impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        if self.context.is_some() {
            return Ok(());
        }

        let socket_addr = Self::resolve_address(self.host.clone(), self.port).await?;
        let stream = timeout(self.connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| {
                ModbusError::connection_failed(format!(
                    "connect to {} timed out after {:?}",
                    socket_addr, self.connect_timeout
                ))
            })?
            .map_err(|e| {
                ModbusError::connection_failed_with(format!("connect to {} failed", socket_addr), e)
            })?;
        stream.set_nodelay(true).ok();

        let ctx = match self.framing {
            TcpFraming::Tcp => tcp::attach_slave(stream, Slave(1)),
            TcpFraming::Rtu => rtu::attach_slave(stream, Slave(1)),
        };
        self.context = Some(ctx);

        tracing::info!(
            host = %self.host,
            port = self.port,
            framing = ?self.framing,
            "Connected to Modbus TCP endpoint"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::warn!(error = %e, "Error disconnecting Modbus TCP endpoint");
            }
        }
        tracing::debug!(host = %self.host, port = self.port, "Disconnected Modbus TCP endpoint");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn display_name(&self) -> String {
        match self.framing {
            TcpFraming::Tcp => format!("Modbus TCP {}:{}", self.host, self.port),
            TcpFraming::Rtu => format!("Modbus RTU-over-TCP {}:{}", self.host, self.port),
        }
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

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("framing", &self.framing)
            .field("connected", &self.context.is_some())
            .finish()
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Maps a tokio-modbus transport error to [`ModbusError`].
pub(crate) fn map_transport_error(error: TokioModbusError) -> ModbusError {
    match error {
        TokioModbusError::Transport(io_error) => {
            use std::io::ErrorKind;
            match io_error.kind() {
                ErrorKind::TimedOut => ModbusError::timeout(Duration::from_secs(0)),
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => {
                    ModbusError::connection_failed_with("connection lost", io_error)
                }
                _ => ModbusError::invalid_response(io_error.to_string()),
            }
        }
        TokioModbusError::Protocol(protocol_error) => {
            ModbusError::invalid_response(format!("{:?}", protocol_error))
        }
    }
}

/// Converts an [`Exception`] to its raw u8.
pub(crate) fn exception_code(code: Exception) -> u8 {
    match code {
        Exception::IllegalFunction => 0x01,
        Exception::IllegalDataAddress => 0x02,
        Exception::IllegalDataValue => 0x03,
        Exception::ServerDeviceFailure => 0x04,
        Exception::Acknowledge => 0x05,
        Exception::ServerDeviceBusy => 0x06,
        Exception::MemoryParityError => 0x08,
        Exception::GatewayPathUnavailable => 0x0A,
        Exception::GatewayTargetDevice => 0x0B,
        _ => 0xFF,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(framing: TcpFraming) -> TcpTransport {
        TcpTransport::new(
            "127.0.0.1",
            502,
            framing,
            Duration::from_secs(3),
            Duration::from_millis(1000),
        )
    }

    #[test]
    fn test_display_name() {
        assert_eq!(transport(TcpFraming::Tcp).display_name(), "Modbus TCP 127.0.0.1:502");
        assert_eq!(
            transport(TcpFraming::Rtu).display_name(),
            "Modbus RTU-over-TCP 127.0.0.1:502"
        );
    }

    #[test]
    fn test_starts_disconnected() {
        let t = transport(TcpFraming::Tcp);
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn test_request_without_connection() {
        let mut t = transport(TcpFraming::Tcp);
        let result = t.read_holding_registers(1, 0, 1).await;
        assert!(matches!(result, Err(ModbusError::NotConnected)));
    }

    #[test]
    fn test_exception_code_mapping() {
        assert_eq!(exception_code(Exception::IllegalFunction), 0x01);
        assert_eq!(exception_code(Exception::IllegalDataAddress), 0x02);
        assert_eq!(exception_code(Exception::ServerDeviceBusy), 0x06);
    }

    #[tokio::test]
    async fn test_connect_future_crosses_threads() {
        // tokio::spawn requires the connect future to be Send; connecting
        // to a closed local port fails fast without any network.
        let handle = tokio::spawn(async {
            let mut t = TcpTransport::new(
                "127.0.0.1",
                1,
                TcpFraming::Tcp,
                Duration::from_millis(500),
                Duration::from_millis(500),
            );
            t.connect().await
        });
        let result = handle.await.expect("connect task panicked");
        assert!(matches!(result, Err(ModbusError::ConnectionFailed { .. })));
    }
}
