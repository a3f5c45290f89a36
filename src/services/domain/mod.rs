//! 领域层服务模块
//!
//! 设备访问引擎的核心业务逻辑：断路器、单PLC连接池与操作执行、
//! 机群连接管理。

pub mod circuit_breaker;
pub mod connection_manager;
pub mod plc_connection;

pub use circuit_breaker::CircuitBreaker;
pub use connection_manager::ConnectionManager;
pub use plc_connection::PlcConnection;
