//! 核心数据模型模块
//!
//! PLC描述符、寄存器表、Modbus操作、标签结果与流程定义等
//! 闭合记录类型，输入侧记录在加载时拒绝未知字段。

pub mod operation;
pub mod plc_config;
pub mod procedure;
pub mod register_map;
pub mod tag;

pub use operation::{
    BreakerState, ConnectionMetrics, ConnectionState, HealthStatus, MetricsSnapshot,
    ModbusOperation, OperationKind, OperationPayload, OperationResult, PlcHealthEntry, PlcStatus,
    DEFAULT_OPERATION_RETRIES, RESPONSE_WINDOW_LEN,
};
pub use plc_config::{AddressingScheme, PlcConfig};
pub use procedure::{
    CompareOp, Condition, ExecutionResult, ExecutionStatus, ProcedureDefinition, ProcedureStep,
    StepAction, StepResult,
};
pub use register_map::{RegisterConfig, RegisterDataType, RegisterType, TagType};
pub use tag::{
    BulkReadResponse, BulkStatus, BulkWriteResponse, TagOpStatus, TagReadResult, TagValue,
    TagWriteResult,
};
