use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 寄存器寻址方案
///
/// `absolute`：Modicon风格数据模型地址（保持寄存器从40001开始），
/// 按区间减去区基址换算为PDU地址；
/// `relative`：所有寄存器从1开始，换算固定为减1。
/// 仅接受这两种拼写，其余拼写在加载时即报错。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingScheme {
    Absolute,
    Relative,
}

impl Default for AddressingScheme {
    fn default() -> Self {
        Self::Absolute
    }
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_s() -> f64 {
    3.0
}

fn default_retries() -> u32 {
    3
}

fn default_pool_size() -> usize {
    5
}

fn default_health_check_interval_s() -> u64 {
    30
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_timeout_s() -> u64 {
    60
}

/// 单个PLC的描述符，加载后不可变
///
/// 由设备目录持有；每个PLC的连接池只引用它，不做拷贝。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlcConfig {
    /// 稳定ID，来自配置文件中的键，反序列化后由目录填充
    #[serde(default)]
    pub plc_id: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Modbus从站ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    /// 连接建立的重试次数
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub addressing_scheme: AddressingScheme,
    /// 连接池会话数
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_health_check_interval_s")]
    pub health_check_interval_s: u64,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_breaker_timeout_s")]
    pub circuit_breaker_timeout_s: u64,
}

impl PlcConfig {
    /// 单次请求超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s.max(0.0))
    }

    /// 断路器复位窗口
    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_s)
    }

    /// 目标设备的 host:port 形式
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 描述符自身的合法性检查（在初始化连接池前执行）
    pub fn validate(&self) -> crate::utils::error::AppResult<()> {
        use crate::utils::error::AppError;
        if self.plc_id.is_empty() {
            return Err(AppError::configuration_error("PLC ID 不能为空"));
        }
        if self.host.is_empty() {
            return Err(AppError::configuration_error_at(
                "host 不能为空",
                &self.plc_id,
                None,
            ));
        }
        if self.pool_size == 0 {
            return Err(AppError::configuration_error_at(
                "pool_size 必须大于0",
                &self.plc_id,
                None,
            ));
        }
        if self.timeout_s <= 0.0 {
            return Err(AppError::configuration_error_at(
                "timeout_s 必须为正数",
                &self.plc_id,
                None,
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::configuration_error_at(
                "circuit_breaker_threshold 必须大于0",
                &self.plc_id,
                None,
            ));
        }
        Ok(())
    }
}
