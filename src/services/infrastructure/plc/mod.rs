//! PLC线路基础设施
//!
//! Modbus链路抽象与其TCP/Mock实现。

pub mod mock_link;
pub mod modbus_link;


pub use mock_link::{MockBank, MockFailureKind, MockLink, MockLinkFactory, SharedMockBank};
pub use modbus_link::{LinkFactory, ModbusLink, TcpLinkFactory, TcpModbusLink};
