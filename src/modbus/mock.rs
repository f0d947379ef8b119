//! Recording connector and scripted client used by the engine tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::client::{ModbusClientTrait, ModbusConnector};
use crate::utils::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ReadCoils(u16, u16),
    ReadDiscreteInputs(u16, u16),
    ReadHoldingRegisters(u16, u16),
    ReadInputRegisters(u16, u16),
    WriteSingleCoil(u16, u16),
    WriteSingleRegister(u16, u16),
    WriteMultipleCoils(u16, u16, Vec<u8>),
    WriteMultipleRegisters(u16, u16, Vec<u8>),
}

#[derive(Default)]
struct Shared {
    opens: Vec<String>,
    closes: usize,
    failing_connects: usize,
    responses: VecDeque<Result<Vec<u8>, BridgeError>>,
    calls: Vec<Call>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn opens(&self) -> Vec<String> {
        self.shared.lock().unwrap().opens.clone()
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.lock().unwrap().calls.clone()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.shared.lock().unwrap().failing_connects = count;
    }

    /// Queues the raw result of the next request made on any session.
    pub fn respond(&self, result: Result<Vec<u8>, BridgeError>) {
        self.shared.lock().unwrap().responses.push_back(result);
    }
}

#[async_trait]
impl ModbusConnector for MockConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn ModbusClientTrait>, BridgeError> {
        let mut shared = self.shared.lock().unwrap();
        shared.opens.push(host.to_string());
        if shared.failing_connects > 0 {
            shared.failing_connects -= 1;
            return Err(BridgeError::Network(format!("connection refused: {}", host)));
        }
        Ok(Box::new(MockClient {
            shared: self.shared.clone(),
        }))
    }
}

struct MockClient {
    shared: Arc<Mutex<Shared>>,
}

impl MockClient {
    fn record(&self, call: Call) -> Result<Vec<u8>, BridgeError> {
        let mut shared = self.shared.lock().unwrap();
        shared.calls.push(call);
        shared.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl ModbusClientTrait for MockClient {
    async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::ReadCoils(address, quantity))
    }

    async fn read_discrete_inputs(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::ReadDiscreteInputs(address, quantity))
    }

    async fn read_holding_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::ReadHoldingRegisters(address, quantity))
    }

    async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::ReadInputRegisters(address, quantity))
    }

    async fn write_single_coil(&mut self, address: u16, value: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::WriteSingleCoil(address, value))
    }

    async fn write_single_register(&mut self, address: u16, value: u16) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::WriteSingleRegister(address, value))
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        packed: &[u8],
    ) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::WriteMultipleCoils(address, quantity, packed.to_vec()))
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        values: &[u8],
    ) -> Result<Vec<u8>, BridgeError> {
        self.record(Call::WriteMultipleRegisters(address, quantity, values.to_vec()))
    }

    async fn close(&mut self) {
        self.shared.lock().unwrap().closes += 1;
    }
}
