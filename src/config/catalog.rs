//! 设备目录
//!
//! PLC描述符与寄存器表的只读存储。启动时从YAML目录加载，
//! 之后不再变化，可跨任务共享而无需加锁。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use log::{debug, info, warn};

use crate::config::Settings;
use crate::models::plc_config::PlcConfig;
use crate::models::register_map::RegisterConfig;
use crate::utils::codec::register_count;
use crate::utils::error::{AppError, AppResult};

/// 地址解析错误中最多列出的候选标签数
const MAX_SUGGESTED_TAGS: usize = 10;

/// 设备目录：`plc_id → 描述符` 与 `(plc_id, 地址) → 寄存器描述符`
#[derive(Debug, Default)]
pub struct DeviceCatalog {
    plc_configs: HashMap<String, PlcConfig>,
    register_maps: HashMap<String, BTreeMap<u16, RegisterConfig>>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按设置加载完整目录并校验
    pub fn load(settings: &Settings) -> AppResult<DeviceCatalog> {
        let mut catalog = DeviceCatalog::new();
        catalog.load_plc_dir(&settings.plc_config_dir)?;
        catalog.load_register_dir(&settings.register_map_dir)?;
        catalog.validate()?;
        info!(
            "设备目录加载完成: {} 台PLC, {} 张寄存器表",
            catalog.plc_configs.len(),
            catalog.register_maps.len()
        );
        Ok(catalog)
    }

    /// 加载目录下所有PLC描述符文件
    pub fn load_plc_dir(&mut self, dir: impl AsRef<Path>) -> AppResult<()> {
        for path in yaml_files(dir.as_ref())? {
            self.load_plc_file(&path)?;
        }
        Ok(())
    }

    /// 加载单个PLC描述符文件（`plcs:` 段，键为PLC ID）
    pub fn load_plc_file(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&content)?;

        let plcs = doc
            .get("plcs")
            .and_then(|v| v.as_mapping())
            .ok_or_else(|| {
                AppError::configuration_error(format!(
                    "{} 缺少 'plcs' 段",
                    path.as_ref().display()
                ))
            })?;

        for (key, value) in plcs {
            let plc_id = key
                .as_str()
                .ok_or_else(|| AppError::configuration_error("PLC ID 必须为字符串"))?
                .to_string();
            let mut config: PlcConfig = serde_yaml::from_value(value.clone()).map_err(|e| {
                AppError::configuration_error_at(
                    format!("PLC描述符非法: {}", e),
                    &plc_id,
                    None,
                )
            })?;
            config.plc_id = plc_id.clone();
            config.validate()?;
            debug!("加载PLC描述符: {} ({})", plc_id, config.endpoint());
            self.plc_configs.insert(plc_id, config);
        }
        Ok(())
    }

    /// 加载目录下所有寄存器表文件
    pub fn load_register_dir(&mut self, dir: impl AsRef<Path>) -> AppResult<()> {
        for path in yaml_files(dir.as_ref())? {
            self.load_register_file(&path)?;
        }
        Ok(())
    }

    /// 加载单个寄存器表文件（`registers:` 段，按PLC分组，键为1基地址）
    pub fn load_register_file(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&content)?;

        let groups = doc
            .get("registers")
            .and_then(|v| v.as_mapping())
            .ok_or_else(|| {
                AppError::configuration_error(format!(
                    "{} 缺少 'registers' 段",
                    path.as_ref().display()
                ))
            })?;

        for (plc_key, registers) in groups {
            let plc_id = plc_key
                .as_str()
                .ok_or_else(|| AppError::configuration_error("寄存器表的PLC键必须为字符串"))?
                .to_string();
            let entries = registers.as_mapping().ok_or_else(|| {
                AppError::configuration_error_at("寄存器表必须为映射", &plc_id, None)
            })?;

            let map = self.register_maps.entry(plc_id.clone()).or_default();
            for (addr_key, register) in entries {
                let address = yaml_address(addr_key).ok_or_else(|| {
                    AppError::configuration_error_at(
                        format!("寄存器地址非法: {:?}", addr_key),
                        &plc_id,
                        None,
                    )
                })?;
                let config: RegisterConfig =
                    serde_yaml::from_value(register.clone()).map_err(|e| {
                        AppError::configuration_error_at(
                            format!("寄存器描述符非法: {}", e),
                            &plc_id,
                            Some(address),
                        )
                    })?;
                map.insert(address, config);
            }
        }
        Ok(())
    }

    /// 手工登记一台PLC（测试与程序化构建目录使用）
    pub fn insert_plc(&mut self, config: PlcConfig) {
        self.plc_configs.insert(config.plc_id.clone(), config);
    }

    /// 手工登记一个寄存器
    pub fn insert_register(&mut self, plc_id: &str, address: u16, config: RegisterConfig) {
        self.register_maps
            .entry(plc_id.to_string())
            .or_default()
            .insert(address, config);
    }

    /// 目录级不变量校验
    ///
    /// 寄存器按 stored_as 推导的地址跨度不得重叠；标签名在单PLC内唯一；
    /// 指向未知PLC的寄存器表仅告警（允许分文件渐进配置）。
    pub fn validate(&self) -> AppResult<()> {
        for (plc_id, registers) in &self.register_maps {
            if !self.plc_configs.contains_key(plc_id) {
                warn!("寄存器表引用了未配置的PLC: {}", plc_id);
            }

            let mut names: HashSet<&str> = HashSet::new();
            let mut prev_span: Option<(u16, u16, &str)> = None;

            for (address, register) in registers {
                if !names.insert(register.name.as_str()) {
                    return Err(AppError::configuration_error_at(
                        format!("标签名重复: '{}'", register.name),
                        plc_id,
                        Some(*address),
                    ));
                }

                let span = register_count(register.stored_as);
                if let Some((prev_addr, prev_len, prev_name)) = prev_span {
                    let prev_end = u32::from(prev_addr) + u32::from(prev_len);
                    if u32::from(*address) < prev_end {
                        return Err(AppError::configuration_error_at(
                            format!(
                                "寄存器 '{}' (地址 {}) 与 '{}' (地址 {}, 占 {} 字) 重叠",
                                register.name, address, prev_name, prev_addr, prev_len
                            ),
                            plc_id,
                            Some(*address),
                        ));
                    }
                }
                prev_span = Some((*address, span, register.name.as_str()));
            }
        }
        Ok(())
    }

    /// 按ID查找PLC描述符
    pub fn get_plc(&self, plc_id: &str) -> AppResult<&PlcConfig> {
        self.plc_configs.get(plc_id).ok_or_else(|| {
            AppError::configuration_error_at("没有对应的PLC配置", plc_id, None)
        })
    }

    /// 按 (plc_id, 地址) 查找寄存器描述符
    pub fn get_register(&self, plc_id: &str, address: u16) -> AppResult<&RegisterConfig> {
        self.register_maps
            .get(plc_id)
            .and_then(|m| m.get(&address))
            .ok_or_else(|| {
                AppError::configuration_error_at("没有对应的寄存器配置", plc_id, Some(address))
            })
    }

    /// 逻辑标签名反查寄存器地址
    ///
    /// 未命中时在错误消息里附上排序后的候选标签（最多10个）。
    pub fn address_of_tag(&self, plc_id: &str, tag_name: &str) -> AppResult<u16> {
        if !self.plc_configs.contains_key(plc_id) {
            return Err(AppError::configuration_error_at(
                "没有对应的PLC配置",
                plc_id,
                None,
            ));
        }

        let registers = self.register_maps.get(plc_id).ok_or_else(|| {
            AppError::configuration_error_at("PLC没有寄存器表", plc_id, None)
        })?;

        for (address, register) in registers {
            if register.name == tag_name {
                return Ok(*address);
            }
        }

        let mut available: Vec<&str> = registers.values().map(|r| r.name.as_str()).collect();
        available.sort_unstable();
        let message = if available.is_empty() {
            format!("PLC {} 未配置任何标签", plc_id)
        } else {
            let shown: Vec<&str> = available.iter().take(MAX_SUGGESTED_TAGS).copied().collect();
            let mut msg = format!(
                "标签 '{}' 不存在。可用标签: {}",
                tag_name,
                shown.join(", ")
            );
            if available.len() > MAX_SUGGESTED_TAGS {
                msg.push_str(&format!("（另有 {} 个）", available.len() - MAX_SUGGESTED_TAGS));
            }
            msg
        };
        Err(AppError::address_resolution_error(message, plc_id, tag_name))
    }

    /// 指定PLC的全部标签名
    pub fn tag_names(&self, plc_id: &str) -> Vec<String> {
        self.register_maps
            .get(plc_id)
            .map(|m| m.values().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 是否存在指定PLC
    pub fn has_plc(&self, plc_id: &str) -> bool {
        self.plc_configs.contains_key(plc_id)
    }

    /// 全部PLC描述符（克隆，供机群初始化使用）
    pub fn plc_configs(&self) -> Vec<PlcConfig> {
        self.plc_configs.values().cloned().collect()
    }
}

/// 枚举目录下的YAML文件（排序保证加载顺序稳定；目录缺失返回空）
fn yaml_files(dir: &Path) -> AppResult<Vec<std::path::PathBuf>> {
    if !dir.exists() {
        warn!("配置目录不存在: {}", dir.display());
        return Ok(Vec::new());
    }
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// YAML键转寄存器地址，整数与数字字符串均接受
fn yaml_address(key: &serde_yaml::Value) -> Option<u16> {
    if let Some(n) = key.as_u64() {
        return u16::try_from(n).ok();
    }
    key.as_str().and_then(|s| s.trim().parse::<u16>().ok())
}
