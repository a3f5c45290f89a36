use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// 解码后的标签值
///
/// 读线圈/离散输入得到布尔值，寄存器读按 decode_as 得到整数或浮点数。
/// 序列化为裸的JSON标量，与调用方约定的传输形态一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl TagValue {
    /// 将任意标签值归一化为 f64，用于范围校验与条件比较
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::UInt(v) => *v as f64,
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    /// 无损转换为无符号整数（浮点数要求非负整数值）
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Bool(b) => Some(u64::from(*b)),
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Float(v) => {
                if v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64 {
                    Some(*v as u64)
                } else {
                    None
                }
            }
        }
    }

    /// 无损转换为有符号整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Int(v) => Some(*v),
            Self::Float(v) => {
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    Some(*v as i64)
                } else {
                    None
                }
            }
        }
    }

    /// 从调用方传入的JSON数据构造标签值
    ///
    /// 接受布尔、数值与数值字符串；其他形态视为不可转换。
    pub fn from_json(value: &serde_json::Value) -> Option<TagValue> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Some(Self::UInt(u))
                } else if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(u) = trimmed.parse::<u64>() {
                    Some(Self::UInt(u))
                } else if let Ok(i) = trimmed.parse::<i64>() {
                    Some(Self::Int(i))
                } else {
                    trimmed.parse::<f64>().ok().map(Self::Float)
                }
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

/// 单标签操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOpStatus {
    Success,
    Error,
}

/// 批量操作整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl BulkStatus {
    /// 由成功/失败计数推导整体状态
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if successful == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }
}

/// 单标签读取结果
///
/// 失败对调用方不是异常：始终返回结果对象，status 标记 error 并携带错误详情。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReadResult {
    pub tag_name: String,
    pub status: TagOpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TagValue>,
    /// 原始寄存器字（仅读成功时存在；位级读取以0/1表示）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registers: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TagReadResult {
    pub fn success(
        tag_name: impl Into<String>,
        data: TagValue,
        registers: Vec<u16>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tag_name: tag_name.into(),
            status: TagOpStatus::Success,
            data: Some(data),
            registers: Some(registers),
            error_type: None,
            error_message: None,
            timestamp,
        }
    }

    pub fn failure(tag_name: impl Into<String>, error: &AppError, timestamp: DateTime<Utc>) -> Self {
        Self {
            tag_name: tag_name.into(),
            status: TagOpStatus::Error,
            data: None,
            registers: None,
            error_type: Some(error.error_type().to_string()),
            error_message: Some(error.to_string()),
            timestamp,
        }
    }
}

/// 单标签写入结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWriteResult {
    pub tag_name: String,
    pub status: TagOpStatus,
    /// 调用方提交的原始数据，成功与失败时都回显
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TagWriteResult {
    pub fn success(
        tag_name: impl Into<String>,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tag_name: tag_name.into(),
            status: TagOpStatus::Success,
            data: Some(data),
            error_type: None,
            error_message: None,
            timestamp,
        }
    }

    pub fn failure(
        tag_name: impl Into<String>,
        data: Option<serde_json::Value>,
        error: &AppError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tag_name: tag_name.into(),
            status: TagOpStatus::Error,
            data,
            error_type: Some(error.error_type().to_string()),
            error_message: Some(error.to_string()),
            timestamp,
        }
    }
}

/// 批量读取响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkReadResponse {
    pub plc_id: String,
    pub total_requested: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub results: Vec<TagReadResult>,
    pub overall_status: BulkStatus,
    pub timestamp: DateTime<Utc>,
}

/// 批量写入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkWriteResponse {
    pub plc_id: String,
    pub total_requested: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub results: Vec<TagWriteResult>,
    pub overall_status: BulkStatus,
    pub timestamp: DateTime<Utc>,
}
