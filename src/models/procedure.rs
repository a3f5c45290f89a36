use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tag::{TagOpStatus, TagValue};
use crate::utils::error::{AppError, AppResult};

/// 条件比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    /// 是否为排序比较（非数值两侧不允许）
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge)
    }
}

/// 解析后的条件表达式：`标签名 运算符 字面量`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub tag: String,
    pub op: CompareOp,
    pub value: String,
}

impl Condition {
    /// 解析 `NAME OP VALUE` 形式的条件字符串
    ///
    /// 标签名限字母数字与下划线；双字符运算符优先匹配，避免把 `<=` 误认为 `<`。
    pub fn parse(expr: &str) -> AppResult<Condition> {
        const OPERATORS: [(&str, CompareOp); 6] = [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];

        for (symbol, op) in OPERATORS {
            if let Some(pos) = expr.find(symbol) {
                let tag = expr[..pos].trim();
                let value = expr[pos + symbol.len()..].trim();
                if tag.is_empty() || value.is_empty() {
                    break;
                }
                if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                return Ok(Condition {
                    tag: tag.to_string(),
                    op,
                    value: value.to_string(),
                });
            }
        }

        Err(AppError::validation_error(format!(
            "无效的条件格式: '{}'，应为 标签名 运算符 值（如 'TEMP_01 > 50'）",
            expr
        )))
    }

    /// 以读取到的标签值评估条件
    ///
    /// 两侧均可转数值时按数值比较；否则回退到字符串相等性比较，
    /// 排序运算符遇到非数值字面量则判为验证错误。
    pub fn evaluate(&self, value: &TagValue) -> AppResult<bool> {
        if let Ok(literal) = self.value.parse::<f64>() {
            let actual = value.as_f64();
            return Ok(match self.op {
                CompareOp::Eq => actual == literal,
                CompareOp::Ne => actual != literal,
                CompareOp::Lt => actual < literal,
                CompareOp::Gt => actual > literal,
                CompareOp::Le => actual <= literal,
                CompareOp::Ge => actual >= literal,
            });
        }

        match self.op {
            CompareOp::Eq => Ok(value.to_string() == self.value),
            CompareOp::Ne => Ok(value.to_string() != self.value),
            other => Err(AppError::validation_error(format!(
                "非数值比较不支持运算符 '{}'",
                other.as_str()
            ))),
        }
    }
}

fn default_loop_delay() -> f64 {
    1.0
}

/// 流程步骤的类别与类别专属字段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// 读取标签，成功时可将值绑定到局部变量
    Read {
        plc_id: String,
        register: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store_as: Option<String>,
    },
    /// 写入标签
    Write {
        plc_id: String,
        register: String,
        value: serde_json::Value,
    },
    /// 读取条件中的标签并求值，按结果跳转到同流程内的指定步骤
    Condition {
        plc_id: String,
        condition: String,
        if_true: String,
        if_false: String,
    },
    /// 挂起指定秒数
    Wait { seconds: f64 },
    /// 轮询：反复读取并求值，首次为真即成功；超过上限判为步骤失败
    Loop {
        plc_id: String,
        condition: String,
        max_iterations: u32,
        #[serde(default = "default_loop_delay")]
        delay_seconds: f64,
    },
}

impl StepAction {
    /// 步骤类别名（与配置文件中的 type 字段一致）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Condition { .. } => "condition",
            Self::Wait { .. } => "wait",
            Self::Loop { .. } => "loop",
        }
    }
}

/// 单个流程步骤（名称在流程内唯一）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureStep {
    pub name: String,
    #[serde(flatten)]
    pub action: StepAction,
}

/// 校验后的完整流程定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDefinition {
    /// 流程名，来自配置文件中的键，加载器填充
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<ProcedureStep>,
}

/// 流程执行状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// 单步骤执行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub step_type: String,
    pub status: TagOpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

impl StepResult {
    pub fn success(step: &ProcedureStep, data: serde_json::Value, elapsed_ms: u64) -> Self {
        Self {
            step_name: step.name.clone(),
            step_type: step.action.kind().to_string(),
            status: TagOpStatus::Success,
            data: Some(data),
            error_message: None,
            execution_time_ms: elapsed_ms,
        }
    }

    pub fn failure(step: &ProcedureStep, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            step_name: step.name.clone(),
            step_type: step.action.kind().to_string(),
            status: TagOpStatus::Error,
            data: None,
            error_message: Some(message.into()),
            execution_time_ms: elapsed_ms,
        }
    }
}

/// 流程执行的最终汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub procedure_name: String,
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub execution_time_ms: u64,
    pub step_results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
