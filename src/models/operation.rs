use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// 响应时间滚动窗口长度
pub const RESPONSE_WINDOW_LEN: usize = 100;

/// 操作默认重试预算
pub const DEFAULT_OPERATION_RETRIES: u32 = 3;

/// Modbus操作种类（与标准功能码对应的八种PDU操作）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ReadHolding,
    ReadInput,
    ReadCoil,
    ReadDiscrete,
    WriteRegister,
    WriteRegisters,
    WriteCoil,
    WriteCoils,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadHolding => "read_holding",
            Self::ReadInput => "read_input",
            Self::ReadCoil => "read_coil",
            Self::ReadDiscrete => "read_discrete",
            Self::WriteRegister => "write_register",
            Self::WriteRegisters => "write_registers",
            Self::WriteCoil => "write_coil",
            Self::WriteCoils => "write_coils",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::WriteRegister | Self::WriteRegisters | Self::WriteCoil | Self::WriteCoils
        )
    }
}

/// 写操作的载荷：寄存器字或线圈位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationPayload {
    Words(Vec<u16>),
    Bits(Vec<bool>),
}

/// 一次Modbus操作请求（短生命周期值对象）
///
/// 同时保存数据模型地址（来自配置，1基）与PDU协议地址（0基，上线），
/// 便于诊断信息完整回溯。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusOperation {
    pub operation_type: OperationKind,
    /// PDU协议地址（0基，用于线路）
    pub address: u16,
    /// 数据模型地址（1基，来自配置/调用方）
    pub original_address: u16,
    /// 读取的寄存器/位数量
    pub count: u16,
    /// 写操作载荷
    pub values: Option<OperationPayload>,
    /// 从站ID覆盖；None时使用PLC描述符的unit_id
    pub unit_id: Option<u8>,
    pub max_retries: u32,
}

impl ModbusOperation {
    /// 构造读操作
    pub fn read(kind: OperationKind, address: u16, original_address: u16, count: u16) -> Self {
        Self {
            operation_type: kind,
            address,
            original_address,
            count,
            values: None,
            unit_id: None,
            max_retries: DEFAULT_OPERATION_RETRIES,
        }
    }

    /// 构造写操作
    pub fn write(
        kind: OperationKind,
        address: u16,
        original_address: u16,
        payload: OperationPayload,
    ) -> Self {
        Self {
            operation_type: kind,
            address,
            original_address,
            count: 0,
            values: Some(payload),
            unit_id: None,
            max_retries: DEFAULT_OPERATION_RETRIES,
        }
    }
}

/// 操作执行结果：寄存器字、离散位或写入确认
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Registers(Vec<u16>),
    Bits(Vec<bool>),
    Written,
}

/// PLC连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    CircuitOpen,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

/// 断路器状态（无显式半开态；复位窗口过后由下一次探测隐式恢复）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// 单PLC的连接性能与可靠性指标
#[derive(Debug, Clone, Default)]
pub struct ConnectionMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 运行平均响应时间（秒）
    pub avg_response_time: f64,
    /// 最近响应时间滚动窗口（秒），上限 RESPONSE_WINDOW_LEN
    pub response_times: VecDeque<f64>,
    pub last_successful_connection: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub connection_uptime_start: Option<DateTime<Utc>>,
}

impl ConnectionMetrics {
    /// 追加一次响应时间并更新运行平均值
    pub fn record_response_time(&mut self, seconds: f64) {
        if self.response_times.len() == RESPONSE_WINDOW_LEN {
            self.response_times.pop_front();
        }
        self.response_times.push_back(seconds);
        let sum: f64 = self.response_times.iter().sum();
        self.avg_response_time = sum / self.response_times.len() as f64;
    }

    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        } else {
            0.0
        }
    }

    /// 自首次成功连接以来的在线秒数
    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.connection_uptime_start
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
    }
}

/// 指标快照（可序列化，用于状态查询）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub uptime_seconds: Option<f64>,
    pub last_successful_connection: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// 单PLC状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcStatus {
    pub plc_id: String,
    pub state: ConnectionState,
    pub circuit_breaker_state: BreakerState,
    pub host: String,
    pub port: u16,
    pub metrics: MetricsSnapshot,
}

/// 健康汇总中单个PLC的条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcHealthEntry {
    pub state: ConnectionState,
    pub circuit_breaker: BreakerState,
}

/// 机群健康汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// healthy | degraded | unhealthy
    pub status: String,
    pub total_plcs: usize,
    pub connected_plcs: usize,
    pub disconnected_plcs: usize,
    pub timestamp: DateTime<Utc>,
    pub plc_status: HashMap<String, PlcHealthEntry>,
}
