//! 工业标签网关核心库
//!
//! 在一组 Modbus/TCP 现场设备（PLC）之上提供统一的命名标签接口：
//! 单标签/批量读写与脚本化流程执行。每台设备的寻址约定、
//! 编解码与可靠性策略（连接池、重试退避、断路器）都隐藏在
//! 标签服务与连接管理器之后。
//!
//! 分层结构沿用 models / utils / config / services 的组织方式，
//! services 内部再分为 application / domain / infrastructure 三层。

/// 核心数据模型模块
pub mod models;

/// 工具模块（错误类型、寄存器编解码）
pub mod utils;

/// 配置管理模块（运行设置与设备目录）
pub mod config;

/// 日志初始化模块
pub mod logging;

/// 服务层模块
pub mod services;

pub use config::{DeviceCatalog, Settings};
pub use services::{
    ConnectionManager, ProcedureExecutor, ProcedureLoader, TagService,
};
pub use utils::{AppError, AppResult};
