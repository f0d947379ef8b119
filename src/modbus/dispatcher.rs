use log::{debug, error, info};

use super::client::ModbusConnector;
use super::codec::{self, CoilBitOrder};
use super::protocol::{FunctionCode, ResponseShape, COIL_OFF, COIL_ON};
use super::session::ConnectionManager;
use crate::command::model::{Command, CommandData, ResponseData};
use crate::utils::error::BridgeError;

/// Runs validated commands against the device behind the connection manager.
pub struct Dispatcher<C: ModbusConnector> {
    connections: ConnectionManager<C>,
    coil_bit_order: CoilBitOrder,
}

impl<C: ModbusConnector> Dispatcher<C> {
    pub fn new(connections: ConnectionManager<C>, coil_bit_order: CoilBitOrder) -> Self {
        Self {
            connections,
            coil_bit_order,
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    pub async fn shutdown(&mut self) {
        self.connections.close().await;
    }

    pub async fn dispatch(&mut self, command: &Command) -> Result<ResponseData, BridgeError> {
        let result = self.execute(command).await;

        if let Err(e) = &result {
            error!("❌ {} against {} failed: {}", command.function.entry().name, command.host, e);
            if e.is_network_fault() {
                self.connections.invalidate().await;
            }
        }

        result
    }

    async fn execute(&mut self, command: &Command) -> Result<ResponseData, BridgeError> {
        let function = command.function;
        let address = command.start_address;
        let quantity = command.quantity();
        debug!(
            "dispatch - function code = {}, start address = {}, address count = {}",
            function.as_u8(),
            address,
            quantity
        );

        let client = self.connections.ensure_target(&command.host).await?;
        info!("📡 Invoking {} on {}", function.entry().name, command.host);

        let raw = match (function, &command.data) {
            (FunctionCode::ReadDiscreteInputs, _) => client.read_discrete_inputs(address, quantity).await?,
            (FunctionCode::ReadCoils, _) => client.read_coils(address, quantity).await?,
            (FunctionCode::ReadInputRegisters, _) => client.read_input_registers(address, quantity).await?,
            (FunctionCode::ReadHoldingRegisters, _) => {
                client.read_holding_registers(address, quantity).await?
            }
            (FunctionCode::WriteSingleCoil, Some(CommandData::Boolean(on))) => {
                let value = if *on { COIL_ON } else { COIL_OFF };
                client.write_single_coil(address, value).await?
            }
            (FunctionCode::WriteSingleRegister, Some(CommandData::Integer(value))) => {
                client.write_single_register(address, *value).await?
            }
            (FunctionCode::WriteMultipleCoils, Some(CommandData::BooleanSequence(bits))) => {
                let packed = self.coil_bit_order.pack(bits);
                let ack = client.write_multiple_coils(address, quantity, &packed).await?;
                check_quantity_ack(&ack, quantity)?;
                return Ok(ResponseData::Booleans(bits.clone()));
            }
            (FunctionCode::WriteMultipleRegisters, Some(CommandData::IntegerSequence(values))) => {
                let ack = client
                    .write_multiple_registers(address, quantity, &codec::pack_registers(values))
                    .await?;
                check_quantity_ack(&ack, quantity)?;
                return Ok(ResponseData::Registers(values.clone()));
            }
            (function, data) => {
                return Err(BridgeError::Validation(format!(
                    "Data {:?} is not valid for {}",
                    data,
                    function.entry().name
                )))
            }
        };

        debug!("dispatch - raw results = {}", hex::encode(&raw));
        decode(function, &raw, quantity)
    }
}

fn decode(function: FunctionCode, raw: &[u8], quantity: u16) -> Result<ResponseData, BridgeError> {
    match function.entry().response {
        ResponseShape::Booleans => Ok(ResponseData::Booleans(codec::unpack_bytes_to_booleans(
            raw, quantity,
        ))),
        ResponseShape::Registers => Ok(ResponseData::Registers(codec::unpack_bytes_to_registers(
            raw, quantity,
        )?)),
    }
}

fn check_quantity_ack(ack: &[u8], quantity: u16) -> Result<(), BridgeError> {
    let written = codec::unpack_bytes_to_registers(ack, 1)?[0];
    if written != quantity {
        return Err(BridgeError::InvalidResponse(format!(
            "device acknowledged {} writes, expected {}",
            written, quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::{Call, MockConnector};
    use crate::modbus::session::SessionState;

    fn dispatcher(connector: &MockConnector) -> Dispatcher<MockConnector> {
        Dispatcher::new(ConnectionManager::new(connector.clone()), CoilBitOrder::MsbFirst)
    }

    fn command(host: &str, function: FunctionCode, count: Option<u16>, data: Option<CommandData>) -> Command {
        Command {
            host: host.to_string(),
            function,
            start_address: 10,
            address_count: count,
            data,
        }
    }

    #[tokio::test]
    async fn read_coils_unpacks_lsb_first() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0xFF]));
        let mut dispatcher = dispatcher(&connector);

        let data = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadCoils, Some(8), None))
            .await
            .unwrap();
        assert_eq!(data, ResponseData::Booleans(vec![true; 8]));
        assert_eq!(connector.calls(), vec![Call::ReadCoils(10, 8)]);
    }

    #[tokio::test]
    async fn discrete_inputs_drop_trailing_bits() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x05, 0xFF]));
        let mut dispatcher = dispatcher(&connector);

        let data = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadDiscreteInputs, Some(9), None))
            .await
            .unwrap();
        assert_eq!(
            data,
            ResponseData::Booleans(vec![true, false, true, false, false, false, false, false, true])
        );
    }

    #[tokio::test]
    async fn holding_registers_decode_big_endian() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x00, 0x2A, 0x01, 0x00]));
        let mut dispatcher = dispatcher(&connector);

        let data = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadHoldingRegisters, Some(2), None))
            .await
            .unwrap();
        assert_eq!(data, ResponseData::Registers(vec![42, 256]));
    }

    #[tokio::test]
    async fn short_register_response_is_an_error() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x00]));
        let mut dispatcher = dispatcher(&connector);

        let err = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadInputRegisters, Some(1), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn single_coil_write_encodes_on_and_off() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0xFF, 0x00]));
        connector.respond(Ok(vec![0x00, 0x00]));
        let mut dispatcher = dispatcher(&connector);

        let on = dispatcher
            .dispatch(&command("plc:502", FunctionCode::WriteSingleCoil, None, Some(CommandData::Boolean(true))))
            .await
            .unwrap();
        let off = dispatcher
            .dispatch(&command("plc:502", FunctionCode::WriteSingleCoil, None, Some(CommandData::Boolean(false))))
            .await
            .unwrap();

        assert_eq!(on, ResponseData::Booleans(vec![true]));
        assert_eq!(off, ResponseData::Booleans(vec![false]));
        assert_eq!(
            connector.calls(),
            vec![Call::WriteSingleCoil(10, 0xFF00), Call::WriteSingleCoil(10, 0x0000)]
        );
    }

    #[tokio::test]
    async fn single_register_write_echoes_value() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x12, 0x34]));
        let mut dispatcher = dispatcher(&connector);

        let data = dispatcher
            .dispatch(&command("plc:502", FunctionCode::WriteSingleRegister, None, Some(CommandData::Integer(0x1234))))
            .await
            .unwrap();
        assert_eq!(data, ResponseData::Registers(vec![0x1234]));
    }

    #[tokio::test]
    async fn multiple_coils_are_packed_before_sending() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x00, 0x0A]));
        let mut dispatcher = dispatcher(&connector);
        let bits = vec![true, false, true, false, true, false, true, false, true, true];

        let data = dispatcher
            .dispatch(&command(
                "plc:502",
                FunctionCode::WriteMultipleCoils,
                Some(10),
                Some(CommandData::BooleanSequence(bits.clone())),
            ))
            .await
            .unwrap();
        assert_eq!(data, ResponseData::Booleans(bits));
        assert_eq!(
            connector.calls(),
            vec![Call::WriteMultipleCoils(10, 10, vec![0xAA, 0xC0])]
        );
    }

    #[tokio::test]
    async fn lsb_first_order_changes_coil_packing() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x00, 0x03]));
        let mut dispatcher =
            Dispatcher::new(ConnectionManager::new(connector.clone()), CoilBitOrder::LsbFirst);

        dispatcher
            .dispatch(&command(
                "plc:502",
                FunctionCode::WriteMultipleCoils,
                Some(3),
                Some(CommandData::BooleanSequence(vec![true, true, false])),
            ))
            .await
            .unwrap();
        assert_eq!(connector.calls(), vec![Call::WriteMultipleCoils(10, 3, vec![0x03])]);
    }

    #[tokio::test]
    async fn multiple_registers_verify_acknowledged_quantity() {
        let connector = MockConnector::default();
        connector.respond(Ok(vec![0x00, 0x02]));
        connector.respond(Ok(vec![0x00, 0x01]));
        let mut dispatcher = dispatcher(&connector);
        let write = command(
            "plc:502",
            FunctionCode::WriteMultipleRegisters,
            Some(2),
            Some(CommandData::IntegerSequence(vec![7, 0x0102])),
        );

        let data = dispatcher.dispatch(&write).await.unwrap();
        assert_eq!(data, ResponseData::Registers(vec![7, 0x0102]));
        assert_eq!(
            connector.calls()[0],
            Call::WriteMultipleRegisters(10, 2, vec![0x00, 0x07, 0x01, 0x02])
        );

        let err = dispatcher.dispatch(&write).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn network_error_drops_session() {
        let connector = MockConnector::default();
        connector.respond(Err(BridgeError::Network("connection reset".into())));
        let mut dispatcher = dispatcher(&connector);
        let read = command("plc:502", FunctionCode::ReadCoils, Some(1), None);

        assert!(dispatcher.dispatch(&read).await.is_err());
        assert_eq!(dispatcher.connections().state(), SessionState::Absent);

        connector.respond(Ok(vec![0x01]));
        dispatcher.dispatch(&read).await.unwrap();
        assert_eq!(connector.opens(), vec!["plc:502", "plc:502"]);
    }

    #[tokio::test]
    async fn device_exception_keeps_session_open() {
        let connector = MockConnector::default();
        connector.respond(Err(BridgeError::ModbusException { function: 3, code: 2 }));
        let mut dispatcher = dispatcher(&connector);

        let err = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadHoldingRegisters, Some(1), None))
            .await
            .unwrap_err();
        assert_eq!(err.exception_code(), Some(2));
        assert_eq!(dispatcher.connections().state(), SessionState::Open);
        assert_eq!(connector.opens().len(), 1);
    }

    #[tokio::test]
    async fn failed_open_aborts_dispatch() {
        let connector = MockConnector::default();
        connector.fail_next_connects(1);
        let mut dispatcher = dispatcher(&connector);

        let err = dispatcher
            .dispatch(&command("plc:502", FunctionCode::ReadCoils, Some(1), None))
            .await
            .unwrap_err();
        assert!(err.is_network_fault());
        assert!(connector.calls().is_empty());
    }
}
