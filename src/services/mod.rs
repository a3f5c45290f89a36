//! 服务层模块
//!
//! 按分层组织：
//! - Application Layer: 标签服务与流程执行，协调业务流程
//! - Domain Layer: 断路器、连接池与连接管理的核心逻辑
//! - Infrastructure Layer: Modbus线路等外部依赖的实现

/// 应用层服务模块
pub mod application;

/// 领域层服务模块
pub mod domain;

/// 基础设施层服务模块
pub mod infrastructure;

pub use application::{ProcedureExecutor, ProcedureLoader, TagService};
pub use domain::{CircuitBreaker, ConnectionManager, PlcConnection};
pub use infrastructure::{LinkFactory, ModbusLink, TcpLinkFactory};
