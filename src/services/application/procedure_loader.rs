//! 流程加载器
//!
//! 从YAML文件加载流程定义并做加载期校验，执行器因此可以假定
//! 步骤的良构性：步骤名唯一、跳转目标存在、标签引用有效、
//! 写步骤的目标可写、等待与轮询参数合法、条件文法正确。

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::config::DeviceCatalog;
use crate::models::procedure::{Condition, ProcedureDefinition, ProcedureStep, StepAction};
use crate::utils::error::{AppError, AppResult};

/// 流程加载器
pub struct ProcedureLoader {
    catalog: Arc<DeviceCatalog>,
    procedures: HashMap<String, ProcedureDefinition>,
}

impl ProcedureLoader {
    pub fn new(catalog: Arc<DeviceCatalog>) -> Self {
        Self {
            catalog,
            procedures: HashMap::new(),
        }
    }

    /// 加载目录下的所有流程文件，返回加载的流程数量
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> AppResult<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            log::warn!("流程目录不存在: {}", dir.display());
            return Ok(0);
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

        let mut loaded = 0;
        for path in files {
            loaded += self.load_file(&path)?.len();
        }
        info!("共加载 {} 个流程", loaded);
        Ok(loaded)
    }

    /// 加载单个流程文件（`procedures:` 段，键为流程名）
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> AppResult<Vec<String>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&content)?;

        let procedures = doc
            .get("procedures")
            .and_then(|v| v.as_mapping())
            .ok_or_else(|| {
                AppError::configuration_error(format!(
                    "{} 缺少 'procedures' 段",
                    path.display()
                ))
            })?;

        let mut loaded = Vec::new();
        for (key, value) in procedures {
            let name = key
                .as_str()
                .ok_or_else(|| AppError::configuration_error("流程名必须为字符串"))?
                .to_string();
            let mut definition: ProcedureDefinition = serde_yaml::from_value(value.clone())
                .map_err(|e| {
                    AppError::configuration_error(format!("流程 '{}' 定义非法: {}", name, e))
                })?;
            definition.name = name.clone();

            self.validate_procedure(&definition)?;
            debug!(
                "加载流程: {} ({} 个步骤)",
                name,
                definition.steps.len()
            );
            self.procedures.insert(name.clone(), definition);
            loaded.push(name);
        }

        info!("从 {} 加载了 {} 个流程", path.display(), loaded.len());
        Ok(loaded)
    }

    /// 按名取流程定义
    pub fn get(&self, name: &str) -> Option<&ProcedureDefinition> {
        self.procedures.get(name)
    }

    /// 全部已加载的流程名
    pub fn list(&self) -> Vec<String> {
        self.procedures.keys().cloned().collect()
    }

    /// 校验一个流程定义
    pub fn validate_procedure(&self, definition: &ProcedureDefinition) -> AppResult<()> {
        let name = &definition.name;
        if definition.steps.is_empty() {
            return Err(AppError::validation_error(format!(
                "流程 '{}' 至少需要一个步骤",
                name
            )));
        }

        // 第一遍：步骤名唯一 + 按类别校验字段
        let mut step_names: HashSet<&str> = HashSet::new();
        for step in &definition.steps {
            if step.name.is_empty() {
                return Err(AppError::validation_error(format!(
                    "流程 '{}' 存在未命名步骤",
                    name
                )));
            }
            if !step_names.insert(step.name.as_str()) {
                return Err(AppError::validation_error(format!(
                    "流程 '{}' 中步骤名 '{}' 重复",
                    name, step.name
                )));
            }
            self.validate_step(name, step)?;
        }

        // 第二遍：条件跳转目标必须指向已存在的步骤
        for step in &definition.steps {
            if let StepAction::Condition {
                if_true, if_false, ..
            } = &step.action
            {
                for target in [if_true, if_false] {
                    if !step_names.contains(target.as_str()) {
                        return Err(AppError::validation_error(format!(
                            "流程 '{}' 步骤 '{}' 引用了不存在的步骤: {}",
                            name, step.name, target
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_step(&self, procedure_name: &str, step: &ProcedureStep) -> AppResult<()> {
        match &step.action {
            StepAction::Read {
                plc_id, register, ..
            } => {
                self.validate_register_access(procedure_name, &step.name, plc_id, register)?;
            }
            StepAction::Write {
                plc_id, register, ..
            } => {
                self.validate_register_access(procedure_name, &step.name, plc_id, register)?;
                self.validate_register_writable(procedure_name, &step.name, plc_id, register)?;
            }
            StepAction::Condition {
                plc_id, condition, ..
            } => {
                self.validate_condition(procedure_name, &step.name, plc_id, condition)?;
            }
            StepAction::Wait { seconds } => {
                if !seconds.is_finite() || *seconds <= 0.0 {
                    return Err(AppError::validation_error(format!(
                        "流程 '{}' 步骤 '{}' 的 seconds 必须为正数",
                        procedure_name, step.name
                    )));
                }
            }
            StepAction::Loop {
                plc_id,
                condition,
                max_iterations,
                delay_seconds,
            } => {
                if *max_iterations == 0 {
                    return Err(AppError::validation_error(format!(
                        "流程 '{}' 步骤 '{}' 的 max_iterations 必须不小于1",
                        procedure_name, step.name
                    )));
                }
                if !delay_seconds.is_finite() || *delay_seconds < 0.0 {
                    return Err(AppError::validation_error(format!(
                        "流程 '{}' 步骤 '{}' 的 delay_seconds 非法",
                        procedure_name, step.name
                    )));
                }
                self.validate_condition(procedure_name, &step.name, plc_id, condition)?;
            }
        }
        Ok(())
    }

    /// 标签必须存在于指定PLC上
    fn validate_register_access(
        &self,
        procedure_name: &str,
        step_name: &str,
        plc_id: &str,
        register_name: &str,
    ) -> AppResult<()> {
        self.catalog
            .address_of_tag(plc_id, register_name)
            .map_err(|e| {
                AppError::validation_error(format!(
                    "流程 '{}' 步骤 '{}' 引用无效: {}",
                    procedure_name, step_name, e
                ))
            })?;
        Ok(())
    }

    /// 写步骤的目标必须可写
    fn validate_register_writable(
        &self,
        procedure_name: &str,
        step_name: &str,
        plc_id: &str,
        register_name: &str,
    ) -> AppResult<()> {
        let address = self
            .catalog
            .address_of_tag(plc_id, register_name)
            .map_err(|e| {
                AppError::validation_error(format!(
                    "流程 '{}' 步骤 '{}' 引用无效: {}",
                    procedure_name, step_name, e
                ))
            })?;
        let register = self.catalog.get_register(plc_id, address)?;
        if register.readonly {
            return Err(AppError::validation_error(format!(
                "流程 '{}' 写步骤 '{}' 不能写入只读寄存器 '{}'",
                procedure_name, step_name, register_name
            )));
        }
        Ok(())
    }

    /// 条件文法与引用校验
    ///
    /// 排序运算符要求数值字面量；条件中的标签必须存在于指定PLC。
    fn validate_condition(
        &self,
        procedure_name: &str,
        step_name: &str,
        plc_id: &str,
        condition: &str,
    ) -> AppResult<()> {
        let parsed = Condition::parse(condition).map_err(|e| {
            AppError::validation_error(format!(
                "流程 '{}' 步骤 '{}' 条件非法: {}",
                procedure_name, step_name, e
            ))
        })?;

        self.validate_register_access(procedure_name, step_name, plc_id, &parsed.tag)?;

        if parsed.op.is_ordering() && parsed.value.parse::<f64>().is_err() {
            return Err(AppError::validation_error(format!(
                "流程 '{}' 步骤 '{}' 使用排序运算符 '{}' 但值 '{}' 不是数值",
                procedure_name,
                step_name,
                parsed.op.as_str(),
                parsed.value
            )));
        }

        debug!(
            "条件校验通过: {}.{} {} {}",
            plc_id,
            parsed.tag,
            parsed.op.as_str(),
            parsed.value
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plc_config::{AddressingScheme, PlcConfig};
    use crate::models::register_map::{RegisterConfig, RegisterDataType, RegisterType, TagType};
    use std::io::Write;

    fn test_catalog() -> Arc<DeviceCatalog> {
        let mut catalog = DeviceCatalog::new();
        catalog.insert_plc(PlcConfig {
            plc_id: "P1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            timeout_s: 1.0,
            retries: 1,
            description: String::new(),
            addressing_scheme: AddressingScheme::Absolute,
            pool_size: 1,
            health_check_interval_s: 3600,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_s: 60,
        });
        catalog.insert_register(
            "P1",
            40101,
            RegisterConfig {
                name: "TEMP".to_string(),
                register_type: RegisterType::HoldingRegister,
                stored_as: RegisterDataType::Float32,
                encode_as: RegisterDataType::Float32,
                decode_as: RegisterDataType::Float32,
                tag_type: TagType::Analog,
                readonly: false,
                min_value: None,
                max_value: None,
                description: None,
                units: None,
            },
        );
        catalog.insert_register(
            "P1",
            1,
            RegisterConfig {
                name: "COOLER".to_string(),
                register_type: RegisterType::Coil,
                stored_as: RegisterDataType::Uint16,
                encode_as: RegisterDataType::Uint16,
                decode_as: RegisterDataType::Uint16,
                tag_type: TagType::Digital,
                readonly: false,
                min_value: None,
                max_value: None,
                description: None,
                units: None,
            },
        );
        catalog.insert_register(
            "P1",
            40104,
            RegisterConfig {
                name: "TEMP_ACT".to_string(),
                register_type: RegisterType::HoldingRegister,
                stored_as: RegisterDataType::Float32,
                encode_as: RegisterDataType::Float32,
                decode_as: RegisterDataType::Float32,
                tag_type: TagType::Analog,
                readonly: true,
                min_value: None,
                max_value: None,
                description: None,
                units: None,
            },
        );
        Arc::new(catalog)
    }

    const VALID_PROCEDURE: &str = concat!(
        "procedures:\n",
        "  cooldown:\n",
        "    description: 根据温度开关冷却器\n",
        "    steps:\n",
        "      - name: r1\n",
        "        type: read\n",
        "        plc_id: P1\n",
        "        register: TEMP\n",
        "        store_as: t\n",
        "      - name: c1\n",
        "        type: condition\n",
        "        plc_id: P1\n",
        "        condition: \"TEMP > 50\"\n",
        "        if_true: w_hi\n",
        "        if_false: w_lo\n",
        "      - name: w_hi\n",
        "        type: write\n",
        "        plc_id: P1\n",
        "        register: COOLER\n",
        "        value: 1\n",
        "      - name: w_lo\n",
        "        type: write\n",
        "        plc_id: P1\n",
        "        register: COOLER\n",
        "        value: 0\n",
    );

    fn write_file(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procedures.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_valid_procedure() {
        let (_dir, path) = write_file(VALID_PROCEDURE);
        let mut loader = ProcedureLoader::new(test_catalog());
        let loaded = loader.load_file(&path).unwrap();
        assert_eq!(loaded, vec!["cooldown".to_string()]);

        let procedure = loader.get("cooldown").unwrap();
        assert_eq!(procedure.name, "cooldown");
        assert_eq!(procedure.steps.len(), 4);
        assert_eq!(procedure.steps[0].action.kind(), "read");
        assert_eq!(loader.list().len(), 1);
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: s1\n",
            "        type: read\n",
            "        plc_id: P1\n",
            "        register: TEMP\n",
            "      - name: s1\n",
            "        type: read\n",
            "        plc_id: P1\n",
            "        register: TEMP\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        let err = loader.load_file(&path).unwrap_err();
        assert!(err.to_string().contains("重复"));
    }

    #[test]
    fn test_unknown_jump_target_rejected() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: c1\n",
            "        type: condition\n",
            "        plc_id: P1\n",
            "        condition: \"TEMP > 50\"\n",
            "        if_true: missing\n",
            "        if_false: c1\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        let err = loader.load_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_jump_to_self_is_legal() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: c1\n",
            "        type: condition\n",
            "        plc_id: P1\n",
            "        condition: \"TEMP > 50\"\n",
            "        if_true: c1\n",
            "        if_false: c1\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        assert!(loader.load_file(&path).is_ok());
    }

    #[test]
    fn test_unknown_register_rejected() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: s1\n",
            "        type: read\n",
            "        plc_id: P1\n",
            "        register: NOPE\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        let err = loader.load_file(&path).unwrap_err();
        assert_eq!(err.error_type(), "ValidationError");
    }

    #[test]
    fn test_write_to_readonly_rejected() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: w1\n",
            "        type: write\n",
            "        plc_id: P1\n",
            "        register: TEMP_ACT\n",
            "        value: 1\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        let err = loader.load_file(&path).unwrap_err();
        assert!(err.to_string().contains("只读"));
    }

    #[test]
    fn test_wait_requires_positive_seconds() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: w1\n",
            "        type: wait\n",
            "        seconds: 0\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        assert!(loader.load_file(&path).is_err());
    }

    #[test]
    fn test_loop_requires_min_iterations() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: l1\n",
            "        type: loop\n",
            "        plc_id: P1\n",
            "        condition: \"TEMP > 50\"\n",
            "        max_iterations: 0\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        assert!(loader.load_file(&path).is_err());
    }

    #[test]
    fn test_ordering_operator_needs_numeric_literal() {
        let yaml = concat!(
            "procedures:\n",
            "  p:\n",
            "    steps:\n",
            "      - name: c1\n",
            "        type: condition\n",
            "        plc_id: P1\n",
            "        condition: \"TEMP > hot\"\n",
            "        if_true: c1\n",
            "        if_false: c1\n",
        );
        let (_dir, path) = write_file(yaml);
        let mut loader = ProcedureLoader::new(test_catalog());
        let err = loader.load_file(&path).unwrap_err();
        assert!(err.to_string().contains("不是数值"));
    }

    #[test]
    fn test_condition_grammar() {
        assert!(Condition::parse("TEMP > 50").is_ok());
        assert!(Condition::parse("MODE == auto").is_ok());
        assert!(Condition::parse("X<=1.5").is_ok());
        assert!(Condition::parse("no operator here").is_err());
        assert!(Condition::parse("> 50").is_err());
        assert!(Condition::parse("TEMP >").is_err());

        let parsed = Condition::parse("SPEED_SP >= 100").unwrap();
        assert_eq!(parsed.tag, "SPEED_SP");
        assert_eq!(parsed.op.as_str(), ">=");
        assert_eq!(parsed.value, "100");
    }
}
