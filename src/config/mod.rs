//! 配置管理模块
//!
//! `Settings` 负责网关自身的运行设置（配置目录、日志级别），
//! 支持设置文件与 `GATEWAY_*` 环境变量分层覆盖；
//! `DeviceCatalog` 负责PLC描述符与寄存器表的加载与查询。

pub mod catalog;

use serde::{Deserialize, Serialize};

use crate::utils::error::AppResult;

pub use catalog::DeviceCatalog;

fn default_plc_config_dir() -> String {
    "config/plc_configs".to_string()
}

fn default_register_map_dir() -> String {
    "config/register_maps".to_string()
}

fn default_procedure_dir() -> String {
    "config/procedures".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 网关运行设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// PLC描述符YAML目录
    #[serde(default = "default_plc_config_dir")]
    pub plc_config_dir: String,
    /// 寄存器表YAML目录
    #[serde(default = "default_register_map_dir")]
    pub register_map_dir: String,
    /// 流程定义YAML目录
    #[serde(default = "default_procedure_dir")]
    pub procedure_dir: String,
    /// 日志级别（trace/debug/info/warn/error）
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plc_config_dir: default_plc_config_dir(),
            register_map_dir: default_register_map_dir(),
            procedure_dir: default_procedure_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// 从默认位置加载设置
    ///
    /// 优先级：环境变量（GATEWAY_ 前缀） > config/gateway.* > 默认值。
    /// 设置文件缺失不是错误。
    pub fn load() -> AppResult<Settings> {
        Self::load_from("config/gateway")
    }

    /// 从指定基础路径加载设置（不含扩展名，格式由 config 库探测）
    pub fn load_from(base_path: &str) -> AppResult<Settings> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(base_path).required(false))
            .add_source(config::Environment::with_prefix("GATEWAY"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}
