//! Function-code catalog shared by the validator and the dispatcher.

use serde::{Deserialize, Serialize};

/// Coil value a device expects for "on" in a Write Single Coil request.
pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

/// How the response `Data` of a function code is decoded and shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Booleans,
    Registers,
}

/// What the `Data` field of a write command must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    None,
    Boolean,
    BooleanSequence,
    Integer,
    IntegerSequence,
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub code: FunctionCode,
    pub name: &'static str,
    pub requires_address_count: bool,
    pub data: DataShape,
    pub response: ResponseShape,
    /// Inclusive upper bound on the quantity a single request may carry.
    pub max_quantity: u16,
}

impl CatalogEntry {
    pub fn is_write(&self) -> bool {
        self.data != DataShape::None
    }
}

pub const CATALOG: [CatalogEntry; 8] = [
    CatalogEntry {
        code: FunctionCode::ReadDiscreteInputs,
        name: "Read Discrete Inputs",
        requires_address_count: true,
        data: DataShape::None,
        response: ResponseShape::Booleans,
        max_quantity: 2000,
    },
    CatalogEntry {
        code: FunctionCode::ReadCoils,
        name: "Read Coils",
        requires_address_count: true,
        data: DataShape::None,
        response: ResponseShape::Booleans,
        max_quantity: 2000,
    },
    CatalogEntry {
        code: FunctionCode::WriteSingleCoil,
        name: "Write Single Coil",
        requires_address_count: false,
        data: DataShape::Boolean,
        response: ResponseShape::Booleans,
        max_quantity: 1,
    },
    CatalogEntry {
        code: FunctionCode::WriteMultipleCoils,
        name: "Write Multiple Coils",
        requires_address_count: true,
        data: DataShape::BooleanSequence,
        response: ResponseShape::Booleans,
        max_quantity: 1968,
    },
    CatalogEntry {
        code: FunctionCode::ReadInputRegisters,
        name: "Read Input Registers",
        requires_address_count: true,
        data: DataShape::None,
        response: ResponseShape::Registers,
        max_quantity: 125,
    },
    CatalogEntry {
        code: FunctionCode::ReadHoldingRegisters,
        name: "Read Holding Registers",
        requires_address_count: true,
        data: DataShape::None,
        response: ResponseShape::Registers,
        max_quantity: 125,
    },
    CatalogEntry {
        code: FunctionCode::WriteSingleRegister,
        name: "Write Single Register",
        requires_address_count: false,
        data: DataShape::Integer,
        response: ResponseShape::Registers,
        max_quantity: 1,
    },
    CatalogEntry {
        code: FunctionCode::WriteMultipleRegisters,
        name: "Write Multiple Registers",
        requires_address_count: true,
        data: DataShape::IntegerSequence,
        response: ResponseShape::Registers,
        max_quantity: 123,
    },
];

impl FunctionCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        CATALOG.iter().map(|e| e.code).find(|c| *c as u8 == value)
    }

    pub fn entry(self) -> &'static CatalogEntry {
        // Every variant has exactly one catalog row.
        CATALOG
            .iter()
            .find(|e| e.code == self)
            .unwrap_or(&CATALOG[0])
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Modbus exception codes a device may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ExceptionCode {
    pub fn describe(code: u8) -> &'static str {
        match code {
            0x01 => "illegal function",
            0x02 => "illegal data address",
            0x03 => "illegal data value",
            0x04 => "server device failure",
            0x05 => "acknowledge",
            0x06 => "server device busy",
            0x08 => "memory parity error",
            0x0A => "gateway path unavailable",
            0x0B => "gateway target device failed to respond",
            _ => "unknown exception",
        }
    }
}
