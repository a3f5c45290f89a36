//! 应用层服务模块
//!
//! 面向调用方的高层接口：标签服务与流程加载/执行。

pub mod procedure_executor;
pub mod procedure_loader;
pub mod tag_service;

pub use procedure_executor::ProcedureExecutor;
pub use procedure_loader::ProcedureLoader;
pub use tag_service::TagService;
