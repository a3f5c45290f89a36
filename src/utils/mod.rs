//! 工具模块
//!
//! 与具体业务流程无关的基础支撑：统一错误类型与寄存器编解码。

/// 统一错误处理模块
pub mod error;

/// 寄存器编解码模块
pub mod codec;


pub use error::{AppError, AppResult};
