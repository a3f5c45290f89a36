//! 基础设施层服务模块
//!
//! 处理外部依赖（Modbus线路）的具体实现。

pub mod plc;

pub use plc::{LinkFactory, ModbusLink, TcpLinkFactory};
