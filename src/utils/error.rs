use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 网关统一错误类型
/// 覆盖标签网关各层可能出现的错误，提供统一的错误处理机制
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// 配置错误（PLC或寄存器不在目录中、配置项非法）
    #[error("配置错误: {message}")]
    ConfigurationError {
        message: String,
        plc_id: Option<String>,
        address: Option<u16>,
    },

    /// 验证错误（写入数据违反寄存器策略）
    #[error("验证错误: {message}")]
    ValidationError {
        message: String,
        plc_id: Option<String>,
        address: Option<u16>,
    },

    /// 地址解析错误（标签名无法解析为寄存器地址）
    #[error("地址解析错误: {message}")]
    AddressResolutionError {
        message: String,
        plc_id: Option<String>,
        tag_name: Option<String>,
    },

    /// 编码/解码错误（寄存器数据与应用值转换失败）
    #[error("编码错误: {message}")]
    EncodingError {
        message: String,
        plc_id: Option<String>,
        address: Option<u16>,
    },

    /// 连接错误（连接池耗尽、TCP连接失败、断路器打开）
    #[error("连接错误: {message}")]
    ConnectionError {
        message: String,
        plc_id: Option<String>,
    },

    /// Modbus协议错误（设备返回异常码）
    #[error("协议错误: {message} (PDU地址 {address}, 原始地址 {original_address})")]
    ProtocolError {
        message: String,
        address: u16,
        original_address: u16,
    },

    /// 超时错误
    #[error("操作超时: {operation} - {message}")]
    TimeoutError { operation: String, message: String },

    /// 外部取消
    #[error("操作已取消: {message}")]
    Cancelled { message: String },

    /// 输入/输出错误
    #[error("IO错误: {message} (Kind: {kind})")]
    IoError { message: String, kind: String },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    SerializationError { message: String },

    /// 未知错误
    #[error("未知错误: {message}")]
    UnknownError { message: String },
}

impl AppError {
    /// 创建配置错误
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            plc_id: None,
            address: None,
        }
    }

    /// 创建带上下文的配置错误
    pub fn configuration_error_at(
        message: impl Into<String>,
        plc_id: impl Into<String>,
        address: Option<u16>,
    ) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            plc_id: Some(plc_id.into()),
            address,
        }
    }

    /// 创建验证错误
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            plc_id: None,
            address: None,
        }
    }

    /// 创建带上下文的验证错误
    pub fn validation_error_at(
        message: impl Into<String>,
        plc_id: impl Into<String>,
        address: Option<u16>,
    ) -> Self {
        Self::ValidationError {
            message: message.into(),
            plc_id: Some(plc_id.into()),
            address,
        }
    }

    /// 创建地址解析错误
    pub fn address_resolution_error(
        message: impl Into<String>,
        plc_id: impl Into<String>,
        tag_name: impl Into<String>,
    ) -> Self {
        Self::AddressResolutionError {
            message: message.into(),
            plc_id: Some(plc_id.into()),
            tag_name: Some(tag_name.into()),
        }
    }

    /// 创建编码错误
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
            plc_id: None,
            address: None,
        }
    }

    /// 创建带上下文的编码错误
    pub fn encoding_error_at(
        message: impl Into<String>,
        plc_id: impl Into<String>,
        address: Option<u16>,
    ) -> Self {
        Self::EncodingError {
            message: message.into(),
            plc_id: Some(plc_id.into()),
            address,
        }
    }

    /// 创建连接错误
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            plc_id: None,
        }
    }

    /// 创建带PLC上下文的连接错误
    pub fn connection_error_for(message: impl Into<String>, plc_id: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            plc_id: Some(plc_id.into()),
        }
    }

    /// 创建协议错误（同时携带PDU地址与原始数据模型地址）
    pub fn protocol_error(message: impl Into<String>, address: u16, original_address: u16) -> Self {
        Self::ProtocolError {
            message: message.into(),
            address,
            original_address,
        }
    }

    /// 创建超时错误
    pub fn timeout_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TimeoutError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// 创建取消错误
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// 创建未知错误
    pub fn unknown_error(message: impl Into<String>) -> Self {
        Self::UnknownError {
            message: message.into(),
        }
    }

    /// 为协议错误补充原始数据模型地址
    pub fn with_original_address(self, original: u16) -> Self {
        match self {
            Self::ProtocolError {
                message, address, ..
            } => Self::ProtocolError {
                message,
                address,
                original_address: original,
            },
            other => other,
        }
    }

    /// 错误是否属于瞬态故障（允许按操作预算重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ProtocolError { .. } | Self::TimeoutError { .. } | Self::ConnectionError { .. }
        )
    }

    /// 面向调用方结果对象的错误类型名
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConfigurationError { .. } => "ConfigurationError",
            Self::ValidationError { .. } => "ValidationError",
            Self::AddressResolutionError { .. } => "AddressResolutionError",
            Self::EncodingError { .. } => "EncodingError",
            Self::ConnectionError { .. } => "ConnectionError",
            Self::ProtocolError { .. } => "ProtocolError",
            Self::TimeoutError { .. } => "TimeoutError",
            Self::Cancelled { .. } => "CancelledError",
            Self::IoError { .. } => "IoError",
            Self::SerializationError { .. } => "SerializationError",
            Self::UnknownError { .. } => "UnknownError",
        }
    }

    /// 以统一消息格式包装操作执行失败，保留原错误类别
    ///
    /// 消息格式固定为 `Failed to execute <kind> on PLC <id>: <cause>`
    pub fn wrap_operation(self, operation_kind: &str, plc_id: &str) -> Self {
        let wrapped = format!(
            "Failed to execute {} on PLC {}: {}",
            operation_kind, plc_id, self
        );
        match self {
            Self::ConfigurationError {
                plc_id: p, address, ..
            } => Self::ConfigurationError {
                message: wrapped,
                plc_id: p.or_else(|| Some(plc_id.to_string())),
                address,
            },
            Self::ValidationError {
                plc_id: p, address, ..
            } => Self::ValidationError {
                message: wrapped,
                plc_id: p.or_else(|| Some(plc_id.to_string())),
                address,
            },
            Self::AddressResolutionError {
                plc_id: p,
                tag_name,
                ..
            } => Self::AddressResolutionError {
                message: wrapped,
                plc_id: p.or_else(|| Some(plc_id.to_string())),
                tag_name,
            },
            Self::EncodingError {
                plc_id: p, address, ..
            } => Self::EncodingError {
                message: wrapped,
                plc_id: p.or_else(|| Some(plc_id.to_string())),
                address,
            },
            Self::ConnectionError { .. } => Self::ConnectionError {
                message: wrapped,
                plc_id: Some(plc_id.to_string()),
            },
            Self::ProtocolError {
                address,
                original_address,
                ..
            } => Self::ProtocolError {
                message: wrapped,
                address,
                original_address,
            },
            Self::TimeoutError { operation, .. } => Self::TimeoutError {
                operation,
                message: wrapped,
            },
            Self::Cancelled { .. } => Self::Cancelled { message: wrapped },
            Self::IoError { kind, .. } => Self::IoError {
                message: wrapped,
                kind,
            },
            Self::SerializationError { .. } => Self::SerializationError { message: wrapped },
            Self::UnknownError { .. } => Self::UnknownError { message: wrapped },
        }
    }
}

/// 标准 I/O 错误到 AppError 的转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError {
            message: err.to_string(),
            kind: format!("{:?}", err.kind()),
        }
    }
}

/// serde_json 错误到 AppError 的转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError {
            message: err.to_string(),
        }
    }
}

/// serde_yaml 错误到 AppError 的转换（寄存器表与流程文件均为YAML）
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::configuration_error(format!("YAML解析失败: {}", err))
    }
}

/// config 库错误到 AppError 的转换
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::configuration_error(format!("加载设置失败: {}", err))
    }
}

/// 网关结果类型别名
pub type AppResult<T> = Result<T, AppError>;
