use serde::{Deserialize, Serialize};

/// Modbus寄存器类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    /// 4x 保持寄存器（可读写，16位）
    HoldingRegister,
    /// 3x 输入寄存器（只读，16位）
    InputRegister,
    /// 1x 离散输入（只读，1位）
    DiscreteInput,
    /// 0x 线圈（可读写，1位）
    Coil,
}

impl Default for RegisterType {
    fn default() -> Self {
        Self::HoldingRegister
    }
}

impl RegisterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HoldingRegister => "holding_register",
            Self::InputRegister => "input_register",
            Self::DiscreteInput => "discrete_input",
            Self::Coil => "coil",
        }
    }

    /// 是否为位级寄存器（线圈/离散输入）
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }
}

/// 寄存器数值类型（存储/编码/解码共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterDataType {
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Uint64,
    Int64,
    Float64,
}

impl Default for RegisterDataType {
    fn default() -> Self {
        Self::Uint16
    }
}

impl RegisterDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Uint64 => "uint64",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
        }
    }

    /// 是否为整数类型（写入时要求整数值）
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }
}

/// 标签类别：模拟量或数字量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagType {
    Analog,
    Digital,
}

impl Default for TagType {
    fn default() -> Self {
        Self::Analog
    }
}

/// 单个寄存器的描述符，以 (plc_id, 地址) 为键，加载后不可变
///
/// 逻辑名在单个PLC内唯一；多字寄存器占用的地址跨度不得与其他寄存器重叠，
/// 该不变量由设备目录在加载时校验。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterConfig {
    /// 逻辑标签名
    pub name: String,
    #[serde(default)]
    pub register_type: RegisterType,
    /// 设备侧存储类型，决定寄存器数量
    #[serde(default)]
    pub stored_as: RegisterDataType,
    #[serde(default)]
    pub encode_as: RegisterDataType,
    #[serde(default)]
    pub decode_as: RegisterDataType,
    #[serde(default)]
    pub tag_type: TagType,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    /// 工程单位（如 °C、bar）
    #[serde(default)]
    pub units: Option<String>,
}
