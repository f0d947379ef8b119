pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod protocol;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ModbusClientTrait, ModbusConnector, TcpConnector, TcpModbusClient};
pub use codec::{
    pack_booleans_to_bytes, unpack_bytes_to_booleans, unpack_bytes_to_registers, CoilBitOrder,
};
pub use dispatcher::Dispatcher;
pub use protocol::{FunctionCode, CATALOG};
pub use session::{ConnectionManager, SessionState};
