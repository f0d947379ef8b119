use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::FunctionCode;
use crate::utils::error::BridgeError;

const MBAP_HEADER_LEN: usize = 7;
const MAX_PDU_LEN: usize = 253;

/// One open Modbus/TCP session. Each method returns the raw response bytes:
/// data bytes for reads, the echoed value for single writes and the echoed
/// quantity for multiple writes.
#[async_trait]
pub trait ModbusClientTrait: Send {
    async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError>;

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError>;

    async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError>;

    async fn write_single_coil(&mut self, address: u16, value: u16) -> Result<Vec<u8>, BridgeError>;

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<Vec<u8>, BridgeError>;

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        packed: &[u8],
    ) -> Result<Vec<u8>, BridgeError>;

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> Result<Vec<u8>, BridgeError>;

    async fn close(&mut self);
}

/// Opens sessions against a `host:port` target.
#[async_trait]
pub trait ModbusConnector: Send + Sync {
    async fn connect(&self, host: &str) -> Result<Box<dyn ModbusClientTrait>, BridgeError>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub timeout: Duration,
    pub unit_id: u8,
}

impl TcpConnector {
    pub fn new(timeout: Duration, unit_id: u8) -> Self {
        Self { timeout, unit_id }
    }
}

#[async_trait]
impl ModbusConnector for TcpConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn ModbusClientTrait>, BridgeError> {
        let client = TcpModbusClient::connect(host, self.timeout, self.unit_id).await?;
        Ok(Box::new(client))
    }
}

pub struct TcpModbusClient {
    stream: Option<TcpStream>,
    host: String,
    timeout: Duration,
    unit_id: u8,
    transaction_id: u16,
}

impl TcpModbusClient {
    pub async fn connect(host: &str, timeout_dur: Duration, unit_id: u8) -> Result<Self, BridgeError> {
        if host.trim().is_empty() {
            return Err(BridgeError::Network(format!(
                "Invalid address for modbus host: {:?}",
                host
            )));
        }

        info!("🔌 Connecting to Modbus TCP host: {}", host);
        let stream = timeout(timeout_dur, TcpStream::connect(host))
            .await?
            .map_err(|e| BridgeError::Network(format!("connect to {} failed: {}", host, e)))?;
        stream.set_nodelay(true)?;

        info!("✅ Modbus TCP session open to {} (unit {})", host, unit_id);
        Ok(Self {
            stream: Some(stream),
            host: host.to_string(),
            timeout: timeout_dur,
            unit_id,
            transaction_id: 0,
        })
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn frame(&self, transaction_id: u16, pdu: &[u8]) -> BytesMut {
        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(0); // protocol id
        frame.put_u16((pdu.len() + 1) as u16);
        frame.put_u8(self.unit_id);
        frame.put_slice(pdu);
        frame
    }

    /// Sends `pdu` and returns the response PDU with the function code stripped.
    async fn transact(&mut self, function: FunctionCode, pdu: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let transaction_id = self.next_transaction_id();
        let request = self.frame(transaction_id, pdu);
        debug!("📤 [{}] Sending frame: {}", self.host, hex::encode(&request));

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::Network("session is closed".to_string()))?;
        let response = timeout(self.timeout, Self::round_trip(stream, &request)).await??;
        debug!("📥 [{}] Received frame: {}", self.host, hex::encode(&response));

        let received_tid = u16::from_be_bytes([response[0], response[1]]);
        if received_tid != transaction_id {
            return Err(BridgeError::InvalidResponse(format!(
                "transaction id mismatch: sent {}, received {}",
                transaction_id, received_tid
            )));
        }

        let response_pdu = &response[MBAP_HEADER_LEN..];
        let code = response_pdu[0];
        if code == function.as_u8() | 0x80 {
            let exception = response_pdu.get(1).copied().unwrap_or(0);
            warn!("⚠️  [{}] Device rejected function {} with exception {}", self.host, code & 0x7F, exception);
            return Err(BridgeError::ModbusException {
                function: function.as_u8(),
                code: exception,
            });
        }
        if code != function.as_u8() {
            return Err(BridgeError::InvalidResponse(format!(
                "unexpected function code 0x{:02x} in response to 0x{:02x}",
                code,
                function.as_u8()
            )));
        }

        Ok(response_pdu[1..].to_vec())
    }

    async fn round_trip(stream: &mut TcpStream, request: &[u8]) -> Result<Vec<u8>, BridgeError> {
        stream.write_all(request).await?;
        stream.flush().await?;

        let mut header = [0u8; MBAP_HEADER_LEN];
        stream.read_exact(&mut header).await?;

        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        if protocol_id != 0 {
            return Err(BridgeError::InvalidResponse(format!(
                "invalid protocol id {}",
                protocol_id
            )));
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if length < 2 || length - 1 > MAX_PDU_LEN {
            return Err(BridgeError::InvalidResponse(format!(
                "invalid MBAP length {}",
                length
            )));
        }

        let mut response = header.to_vec();
        response.resize(MBAP_HEADER_LEN + length - 1, 0);
        stream.read_exact(&mut response[MBAP_HEADER_LEN..]).await?;
        Ok(response)
    }

    async fn read_bits(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        let expected = (quantity as usize + 7) / 8;
        self.read(function, address, quantity, expected).await
    }

    async fn read_words(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        self.read(function, address, quantity, quantity as usize * 2).await
    }

    async fn read(
        &mut self,
        function: FunctionCode,
        address: u16,
        quantity: u16,
        expected: usize,
    ) -> Result<Vec<u8>, BridgeError> {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(function.as_u8());
        pdu.put_u16(address);
        pdu.put_u16(quantity);

        let body = self.transact(function, &pdu).await?;
        let byte_count = *body
            .first()
            .ok_or_else(|| BridgeError::InvalidResponse("missing byte count".to_string()))?
            as usize;
        let data = &body[1..];
        if byte_count != data.len() || byte_count != expected {
            return Err(BridgeError::InvalidResponse(format!(
                "byte count {} does not match payload {} (expected {})",
                byte_count,
                data.len(),
                expected
            )));
        }
        Ok(data.to_vec())
    }

    /// Writes carry a four-byte echo: the address, then a value or quantity.
    async fn write(
        &mut self,
        function: FunctionCode,
        address: u16,
        pdu: &[u8],
    ) -> Result<Vec<u8>, BridgeError> {
        let body = self.transact(function, pdu).await?;
        if body.len() != 4 {
            return Err(BridgeError::InvalidResponse(format!(
                "write response length {} (expected 4)",
                body.len()
            )));
        }
        let echoed = u16::from_be_bytes([body[0], body[1]]);
        if echoed != address {
            return Err(BridgeError::InvalidResponse(format!(
                "response address {} does not match request address {}",
                echoed, address
            )));
        }
        Ok(body[2..].to_vec())
    }
}

#[async_trait]
impl ModbusClientTrait for TcpModbusClient {
    async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError> {
        self.read_bits(FunctionCode::ReadCoils, address, quantity).await
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        self.read_bits(FunctionCode::ReadDiscreteInputs, address, quantity).await
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        self.read_words(FunctionCode::ReadHoldingRegisters, address, quantity).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        self.read_words(FunctionCode::ReadInputRegisters, address, quantity).await
    }

    async fn write_single_coil(&mut self, address: u16, value: u16) -> Result<Vec<u8>, BridgeError> {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(FunctionCode::WriteSingleCoil.as_u8());
        pdu.put_u16(address);
        pdu.put_u16(value);
        self.write(FunctionCode::WriteSingleCoil, address, &pdu).await
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<Vec<u8>, BridgeError> {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(FunctionCode::WriteSingleRegister.as_u8());
        pdu.put_u16(address);
        pdu.put_u16(value);
        self.write(FunctionCode::WriteSingleRegister, address, &pdu).await
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        packed: &[u8],
    ) -> Result<Vec<u8>, BridgeError> {
        let mut pdu = BytesMut::with_capacity(6 + packed.len());
        pdu.put_u8(FunctionCode::WriteMultipleCoils.as_u8());
        pdu.put_u16(address);
        pdu.put_u16(quantity);
        pdu.put_u8(packed.len() as u8);
        pdu.put_slice(packed);
        self.write(FunctionCode::WriteMultipleCoils, address, &pdu).await
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> Result<Vec<u8>, BridgeError> {
        let mut pdu = BytesMut::with_capacity(6 + values.len());
        pdu.put_u8(FunctionCode::WriteMultipleRegisters.as_u8());
        pdu.put_u16(address);
        pdu.put_u16(quantity);
        pdu.put_u8(values.len() as u8);
        pdu.put_slice(values);
        self.write(FunctionCode::WriteMultipleRegisters, address, &pdu).await
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Modbus session to {} closed with error: {}", self.host, e);
            }
            info!("🔌 Modbus TCP session to {} closed", self.host);
        }
    }
}
