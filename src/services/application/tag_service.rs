//! 标签服务
//!
//! 面向调用方的高层接口：按逻辑标签名读写寄存器。
//! 负责名称解析、地址换算、寄存器数量推导、编解码、写前校验
//! 与并发批量扇出；连接处理、重试与可靠性全部由连接管理器承担。
//!
//! 失败对这一层的调用方不是异常：单标签操作总是返回带
//! status/error_type/error_message 的结果对象。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, warn};

use crate::config::DeviceCatalog;
use crate::models::operation::{
    ModbusOperation, OperationKind, OperationPayload, OperationResult,
};
use crate::models::plc_config::AddressingScheme;
use crate::models::register_map::{RegisterConfig, RegisterType, TagType};
use crate::models::tag::{
    BulkReadResponse, BulkStatus, BulkWriteResponse, TagOpStatus, TagReadResult, TagValue,
    TagWriteResult,
};
use crate::services::domain::ConnectionManager;
use crate::utils::codec::{decode_registers, encode_value, register_count};
use crate::utils::error::{AppError, AppResult};

/// 标签服务
pub struct TagService {
    catalog: Arc<DeviceCatalog>,
    manager: Arc<ConnectionManager>,
}

impl TagService {
    pub fn new(catalog: Arc<DeviceCatalog>, manager: Arc<ConnectionManager>) -> Self {
        Self { catalog, manager }
    }

    /// 读取单个标签
    pub async fn read_tag(&self, plc_id: &str, tag_name: &str) -> TagReadResult {
        let timestamp = Utc::now();
        let start = Instant::now();

        match self.read_tag_inner(plc_id, tag_name).await {
            Ok((value, registers)) => {
                debug!(
                    "标签读取完成: {}.{} = {} ({}ms)",
                    plc_id,
                    tag_name,
                    value,
                    start.elapsed().as_millis()
                );
                TagReadResult::success(tag_name, value, registers, timestamp)
            }
            Err(e) => {
                warn!(
                    "标签读取失败: {}.{} - {}: {} ({}ms)",
                    plc_id,
                    tag_name,
                    e.error_type(),
                    e,
                    start.elapsed().as_millis()
                );
                TagReadResult::failure(tag_name, &e, timestamp)
            }
        }
    }

    /// 写入单个标签
    pub async fn write_tag(
        &self,
        plc_id: &str,
        tag_name: &str,
        data: &serde_json::Value,
    ) -> TagWriteResult {
        let timestamp = Utc::now();
        let start = Instant::now();

        match self.write_tag_inner(plc_id, tag_name, data).await {
            Ok(()) => {
                debug!(
                    "标签写入完成: {}.{} = {} ({}ms)",
                    plc_id,
                    tag_name,
                    data,
                    start.elapsed().as_millis()
                );
                TagWriteResult::success(tag_name, data.clone(), timestamp)
            }
            Err(e) => {
                warn!(
                    "标签写入失败: {}.{} - {}: {} ({}ms)",
                    plc_id,
                    tag_name,
                    e.error_type(),
                    e,
                    start.elapsed().as_millis()
                );
                TagWriteResult::failure(tag_name, Some(data.clone()), &e, timestamp)
            }
        }
    }

    /// 并发读取同一PLC上的多个标签
    ///
    /// 单个标签失败不会使整批失败；汇总计数满足
    /// successful + failed = total_requested。
    pub async fn read_many(&self, plc_id: &str, tag_names: &[String]) -> BulkReadResponse {
        let timestamp = Utc::now();
        let start = Instant::now();

        if plc_id.is_empty() || tag_names.is_empty() {
            let error = if plc_id.is_empty() {
                AppError::validation_error("PLC ID 不能为空")
            } else {
                AppError::validation_error("标签列表不能为空")
            };
            error!("批量读取入参非法: plc_id='{}' - {}", plc_id, error);
            let results: Vec<TagReadResult> = tag_names
                .iter()
                .map(|t| TagReadResult::failure(t, &error, timestamp))
                .collect();
            return BulkReadResponse {
                plc_id: plc_id.to_string(),
                total_requested: tag_names.len(),
                successful_count: 0,
                failed_count: tag_names.len(),
                results,
                overall_status: BulkStatus::Failed,
                timestamp,
            };
        }

        // 并发扇出；同一PLC上的线路访问由操作执行器的串行锁排队
        let results = join_all(tag_names.iter().map(|t| self.read_tag(plc_id, t))).await;

        let successful_count = results
            .iter()
            .filter(|r| r.status == TagOpStatus::Success)
            .count();
        let failed_count = results.len() - successful_count;

        if failed_count > 0 {
            debug!(
                "批量读取 {} 完成: 成功 {}, 失败 {} ({}ms)",
                plc_id,
                successful_count,
                failed_count,
                start.elapsed().as_millis()
            );
        }

        BulkReadResponse {
            plc_id: plc_id.to_string(),
            total_requested: results.len(),
            successful_count,
            failed_count,
            results,
            overall_status: BulkStatus::from_counts(successful_count, failed_count),
            timestamp,
        }
    }

    /// 并发写入同一PLC上的多个标签
    pub async fn write_many(
        &self,
        plc_id: &str,
        tag_data: &HashMap<String, serde_json::Value>,
    ) -> BulkWriteResponse {
        let timestamp = Utc::now();
        let start = Instant::now();

        if plc_id.is_empty() || tag_data.is_empty() {
            let error = if plc_id.is_empty() {
                AppError::validation_error("PLC ID 不能为空")
            } else {
                AppError::validation_error("写入数据不能为空")
            };
            error!("批量写入入参非法: plc_id='{}' - {}", plc_id, error);
            let results: Vec<TagWriteResult> = tag_data
                .iter()
                .map(|(t, v)| TagWriteResult::failure(t, Some(v.clone()), &error, timestamp))
                .collect();
            return BulkWriteResponse {
                plc_id: plc_id.to_string(),
                total_requested: tag_data.len(),
                successful_count: 0,
                failed_count: tag_data.len(),
                results,
                overall_status: BulkStatus::Failed,
                timestamp,
            };
        }

        let results = join_all(
            tag_data
                .iter()
                .map(|(tag, value)| self.write_tag(plc_id, tag, value)),
        )
        .await;

        let successful_count = results
            .iter()
            .filter(|r| r.status == TagOpStatus::Success)
            .count();
        let failed_count = results.len() - successful_count;

        if failed_count > 0 {
            debug!(
                "批量写入 {} 完成: 成功 {}, 失败 {} ({}ms)",
                plc_id,
                successful_count,
                failed_count,
                start.elapsed().as_millis()
            );
        }

        BulkWriteResponse {
            plc_id: plc_id.to_string(),
            total_requested: results.len(),
            successful_count,
            failed_count,
            results,
            overall_status: BulkStatus::from_counts(successful_count, failed_count),
            timestamp,
        }
    }

    // ---- 内部流水线 ----

    async fn read_tag_inner(
        &self,
        plc_id: &str,
        tag_name: &str,
    ) -> AppResult<(TagValue, Vec<u16>)> {
        if plc_id.is_empty() {
            return Err(AppError::validation_error("PLC ID 不能为空"));
        }
        if tag_name.is_empty() {
            return Err(AppError::validation_error("标签名不能为空"));
        }

        let original_address = self.catalog.address_of_tag(plc_id, tag_name)?;
        let plc = self.catalog.get_plc(plc_id)?;
        let register = self.catalog.get_register(plc_id, original_address)?;

        let wire_address = translate_address(plc.addressing_scheme, original_address, plc_id);
        let count = register_count(register.stored_as);
        let kind = read_kind(register.register_type);

        let operation = ModbusOperation::read(kind, wire_address, original_address, count);
        let result = self.manager.execute_operation(plc_id, &operation).await?;

        match result {
            OperationResult::Registers(words) => {
                let value = decode_registers(&words, register.decode_as).map_err(|e| {
                    AppError::encoding_error_at(e.to_string(), plc_id, Some(original_address))
                })?;
                Ok((value, words))
            }
            OperationResult::Bits(bits) => {
                // 位级读取：首位即标签值，寄存器字段以0/1回显
                let value = TagValue::Bool(bits.first().copied().unwrap_or(false));
                let words = bits.iter().map(|b| u16::from(*b)).collect();
                Ok((value, words))
            }
            OperationResult::Written => Err(AppError::unknown_error("读操作返回了写确认")),
        }
    }

    async fn write_tag_inner(
        &self,
        plc_id: &str,
        tag_name: &str,
        data: &serde_json::Value,
    ) -> AppResult<()> {
        if plc_id.is_empty() {
            return Err(AppError::validation_error("PLC ID 不能为空"));
        }
        if tag_name.is_empty() {
            return Err(AppError::validation_error("标签名不能为空"));
        }

        let original_address = self.catalog.address_of_tag(plc_id, tag_name)?;
        let plc = self.catalog.get_plc(plc_id)?;
        let register = self.catalog.get_register(plc_id, original_address)?;

        // 写前校验必须先于编码与任何线路访问
        let value = validate_write(plc_id, original_address, register, data)?;

        let wire_address = translate_address(plc.addressing_scheme, original_address, plc_id);
        let (kind, payload) = if register.register_type == RegisterType::Coil {
            (
                OperationKind::WriteCoil,
                OperationPayload::Bits(vec![value.as_f64() != 0.0]),
            )
        } else {
            // 非线圈写一律使用 write_registers，单字整数也不例外
            let words = encode_value(&value, register.encode_as).map_err(|e| {
                AppError::encoding_error_at(e.to_string(), plc_id, Some(original_address))
            })?;
            (OperationKind::WriteRegisters, OperationPayload::Words(words))
        };

        let operation = ModbusOperation::write(kind, wire_address, original_address, payload);
        self.manager.execute_operation(plc_id, &operation).await?;
        Ok(())
    }
}

/// 数据模型地址换算为0基PDU地址
///
/// `relative`：减1；`absolute`：按Modicon区间减区基址
/// （40001/30001/10001/1），区间之外的地址按原值使用并告警。
pub fn translate_address(scheme: AddressingScheme, address: u16, plc_id: &str) -> u16 {
    match scheme {
        AddressingScheme::Relative => address.saturating_sub(1),
        AddressingScheme::Absolute => match address {
            40001..=49999 => address - 40001,
            30001..=39999 => address - 30001,
            10001..=19999 => address - 10001,
            1..=9999 => address - 1,
            _ => {
                warn!(
                    "地址 {} 不在标准区间内，按原值使用 (PLC {})",
                    address, plc_id
                );
                address
            }
        },
    }
}

/// 按寄存器类别选择读操作
fn read_kind(register_type: RegisterType) -> OperationKind {
    match register_type {
        RegisterType::HoldingRegister => OperationKind::ReadHolding,
        RegisterType::InputRegister => OperationKind::ReadInput,
        RegisterType::DiscreteInput => OperationKind::ReadDiscrete,
        RegisterType::Coil => OperationKind::ReadCoil,
    }
}

/// 写前校验：只读保护、数值强制转换、范围、数字量域、整数约束
///
/// 通过校验的写满足：寄存器可写；值在 [min,max]（若配置）；
/// stored_as 为整数类型时值为整数；数字量标签的值 ∈ {0,1}。
fn validate_write(
    plc_id: &str,
    address: u16,
    register: &RegisterConfig,
    data: &serde_json::Value,
) -> AppResult<TagValue> {
    if register.readonly {
        return Err(AppError::validation_error_at(
            format!("不能写入只读寄存器 '{}'", register.name),
            plc_id,
            Some(address),
        ));
    }

    if data.is_null() {
        return Err(AppError::validation_error_at(
            "数据不能为空",
            plc_id,
            Some(address),
        ));
    }

    let value = TagValue::from_json(data).ok_or_else(|| {
        AppError::validation_error_at(
            format!("无法将数据 '{}' 转换为数值", data),
            plc_id,
            Some(address),
        )
    })?;
    let numeric = value.as_f64();

    if let Some(min) = register.min_value {
        if numeric < min {
            return Err(AppError::validation_error_at(
                format!("值 {} 低于下限 {}", numeric, min),
                plc_id,
                Some(address),
            ));
        }
    }
    if let Some(max) = register.max_value {
        if numeric > max {
            return Err(AppError::validation_error_at(
                format!("值 {} 高于上限 {}", numeric, max),
                plc_id,
                Some(address),
            ));
        }
    }

    if register.tag_type == TagType::Digital && numeric != 0.0 && numeric != 1.0 {
        return Err(AppError::validation_error_at(
            format!("数字量标签只接受 0 或 1，收到 {}", numeric),
            plc_id,
            Some(address),
        ));
    }

    if (register.tag_type == TagType::Digital || register.stored_as.is_integer())
        && numeric.fract() != 0.0
    {
        return Err(AppError::validation_error_at(
            format!(
                "整数类型 {} 需要整数值，收到 {}",
                register.stored_as.as_str(),
                numeric
            ),
            plc_id,
            Some(address),
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plc_config::PlcConfig;
    use crate::models::register_map::RegisterDataType;
    use crate::services::infrastructure::plc::mock_link::{MockBank, MockLinkFactory, SharedMockBank};
    use serde_json::json;

    fn register(
        name: &str,
        register_type: RegisterType,
        stored_as: RegisterDataType,
        tag_type: TagType,
        readonly: bool,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> RegisterConfig {
        RegisterConfig {
            name: name.to_string(),
            register_type,
            stored_as,
            encode_as: stored_as,
            decode_as: stored_as,
            tag_type,
            readonly,
            min_value,
            max_value,
            description: None,
            units: None,
        }
    }

    fn plc(id: &str, scheme: AddressingScheme) -> PlcConfig {
        PlcConfig {
            plc_id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            timeout_s: 1.0,
            retries: 1,
            description: String::new(),
            addressing_scheme: scheme,
            pool_size: 2,
            health_check_interval_s: 3600,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_s: 60,
        }
    }

    async fn build_service() -> (TagService, SharedMockBank) {
        let mut catalog = DeviceCatalog::new();
        catalog.insert_plc(plc("P1", AddressingScheme::Absolute));
        catalog.insert_register(
            "P1",
            40101,
            register(
                "TEMP",
                RegisterType::HoldingRegister,
                RegisterDataType::Float32,
                TagType::Analog,
                false,
                None,
                None,
            ),
        );
        catalog.insert_register(
            "P1",
            40103,
            register(
                "SPEED_SP",
                RegisterType::HoldingRegister,
                RegisterDataType::Uint16,
                TagType::Analog,
                false,
                Some(0.0),
                Some(1500.0),
            ),
        );
        catalog.insert_register(
            "P1",
            40104,
            register(
                "TEMP_ACT",
                RegisterType::HoldingRegister,
                RegisterDataType::Float32,
                TagType::Analog,
                true,
                None,
                None,
            ),
        );
        catalog.insert_register(
            "P1",
            30001,
            register(
                "PRESSURE",
                RegisterType::InputRegister,
                RegisterDataType::Int16,
                TagType::Analog,
                true,
                None,
                None,
            ),
        );
        catalog.insert_register(
            "P1",
            1,
            register(
                "COOLER",
                RegisterType::Coil,
                RegisterDataType::Uint16,
                TagType::Digital,
                false,
                None,
                None,
            ),
        );
        catalog.insert_register(
            "P1",
            10005,
            register(
                "ALARM",
                RegisterType::DiscreteInput,
                RegisterDataType::Uint16,
                TagType::Digital,
                true,
                None,
                None,
            ),
        );
        catalog.validate().unwrap();

        let bank = MockBank::new_shared();
        let factory = MockLinkFactory::new().with_bank("P1", bank.clone());
        let manager = ConnectionManager::with_factory(Box::new(factory));
        let failures = manager.initialize(catalog.plc_configs()).await;
        assert!(failures.is_empty());

        (
            TagService::new(Arc::new(catalog), Arc::new(manager)),
            bank,
        )
    }

    /// 绝对寻址的区间边界
    #[test]
    fn test_translate_address_zone_edges() {
        let cases = [
            (1u16, 0u16),
            (9999, 9998),
            (10001, 0),
            (19999, 9998),
            (30001, 0),
            (39999, 9998),
            (40001, 0),
            (49999, 9998),
        ];
        for (original, expected) in cases {
            assert_eq!(
                translate_address(AddressingScheme::Absolute, original, "P1"),
                expected,
                "地址 {} 换算错误",
                original
            );
        }
        // 区间之外按原值通过
        assert_eq!(translate_address(AddressingScheme::Absolute, 50001, "P1"), 50001);
        assert_eq!(translate_address(AddressingScheme::Absolute, 0, "P1"), 0);
        // 相对寻址固定减1
        assert_eq!(translate_address(AddressingScheme::Relative, 1, "P1"), 0);
        assert_eq!(translate_address(AddressingScheme::Relative, 101, "P1"), 100);
    }

    /// 换算后加回区基址还原原地址（不变量）
    #[test]
    fn test_translate_address_roundtrip() {
        for original in [1u16, 5000, 10001, 15000, 30001, 35000, 40001, 40101, 49999] {
            let translated = translate_address(AddressingScheme::Absolute, original, "P1");
            let base = match original {
                40001..=49999 => 40001,
                30001..=39999 => 30001,
                10001..=19999 => 10001,
                _ => 1,
            };
            assert_eq!(translated + base, original);
        }
    }

    /// float32 标签读取：大端双字解码
    #[tokio::test]
    async fn test_read_float_tag() {
        let (service, bank) = build_service().await;
        bank.lock().unwrap().preset_holding(100, &[0x4248, 0xF5C3]);

        let result = service.read_tag("P1", "TEMP").await;
        assert_eq!(result.status, TagOpStatus::Success);
        assert_eq!(result.registers, Some(vec![16968, 62915]));
        let data = result.data.unwrap().as_f64();
        assert!((data - 50.24).abs() < 1e-3, "期望 ≈50.24，实际 {}", data);
    }

    /// 输入寄存器按 int16 解码负值
    #[tokio::test]
    async fn test_read_input_register_int16() {
        let (service, bank) = build_service().await;
        bank.lock().unwrap().preset_input(0, &[0xFFF6]);

        let result = service.read_tag("P1", "PRESSURE").await;
        assert_eq!(result.status, TagOpStatus::Success);
        assert_eq!(result.data, Some(TagValue::Int(-10)));
    }

    /// 离散输入读取得到布尔值
    #[tokio::test]
    async fn test_read_discrete_tag() {
        let (service, bank) = build_service().await;
        bank.lock().unwrap().preset_discrete(4, true);

        let result = service.read_tag("P1", "ALARM").await;
        assert_eq!(result.status, TagOpStatus::Success);
        assert_eq!(result.data, Some(TagValue::Bool(true)));
        assert_eq!(result.registers, Some(vec![1]));
    }

    /// 未知标签 → 地址解析错误并附候选列表
    #[tokio::test]
    async fn test_read_unknown_tag() {
        let (service, bank) = build_service().await;

        let result = service.read_tag("P1", "NOPE").await;
        assert_eq!(result.status, TagOpStatus::Error);
        assert_eq!(result.error_type.as_deref(), Some("AddressResolutionError"));
        assert!(result.error_message.unwrap().contains("TEMP"));
        // 解析失败不触碰线路
        assert_eq!(bank.lock().unwrap().operation_count, 0);
    }

    /// 超出上限的写入被拒绝，且没有线路调用
    #[tokio::test]
    async fn test_write_range_reject() {
        let (service, bank) = build_service().await;

        let result = service.write_tag("P1", "SPEED_SP", &json!(1800)).await;
        assert_eq!(result.status, TagOpStatus::Error);
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
        assert_eq!(bank.lock().unwrap().operation_count, 0);
        assert!(bank.lock().unwrap().write_log().is_empty());
    }

    /// 只读寄存器写入被拒绝，且没有线路调用
    #[tokio::test]
    async fn test_write_readonly_reject() {
        let (service, bank) = build_service().await;

        let result = service.write_tag("P1", "TEMP_ACT", &json!(25.0)).await;
        assert_eq!(result.status, TagOpStatus::Error);
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
        assert_eq!(bank.lock().unwrap().operation_count, 0);
    }

    /// 数字量标签只接受0或1
    #[tokio::test]
    async fn test_write_digital_domain() {
        let (service, bank) = build_service().await;

        let result = service.write_tag("P1", "COOLER", &json!(2)).await;
        assert_eq!(result.status, TagOpStatus::Error);
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));

        let result = service.write_tag("P1", "COOLER", &json!(1)).await;
        assert_eq!(result.status, TagOpStatus::Success);
        assert!(bank.lock().unwrap().coil_at(0));
        assert_eq!(bank.lock().unwrap().write_log()[0].operation, "write_coil");
    }

    /// 整数类型拒绝小数输入
    #[tokio::test]
    async fn test_write_integer_rejects_fraction() {
        let (service, _bank) = build_service().await;

        let result = service.write_tag("P1", "SPEED_SP", &json!(10.5)).await;
        assert_eq!(result.status, TagOpStatus::Error);
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
    }

    /// 非数值数据拒绝；数值字符串接受
    #[tokio::test]
    async fn test_write_coercion() {
        let (service, bank) = build_service().await;

        let result = service.write_tag("P1", "SPEED_SP", &json!("abc")).await;
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));

        let result = service.write_tag("P1", "SPEED_SP", &json!("1200")).await;
        assert_eq!(result.status, TagOpStatus::Success);
        assert_eq!(bank.lock().unwrap().holding_at(102), 1200);

        let result = service.write_tag("P1", "SPEED_SP", &serde_json::Value::Null).await;
        assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
    }

    /// 非线圈写一律走 write_registers（单字整数也是）
    #[tokio::test]
    async fn test_writes_use_write_registers() {
        let (service, bank) = build_service().await;

        service.write_tag("P1", "SPEED_SP", &json!(750)).await;
        service.write_tag("P1", "TEMP", &json!(50.24)).await;

        let guard = bank.lock().unwrap();
        let log = guard.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].operation, "write_registers");
        assert_eq!(log[0].address, 102);
        assert_eq!(log[0].words, vec![750]);
        assert_eq!(log[1].operation, "write_registers");
        assert_eq!(log[1].address, 100);
        assert_eq!(log[1].words, vec![0x4248, 0xF5C3]);
    }

    /// 批量读取的部分成功与计数守恒
    #[tokio::test]
    async fn test_bulk_read_partial() {
        let (service, bank) = build_service().await;
        bank.lock().unwrap().preset_holding(100, &[0x4248, 0xF5C3]);
        bank.lock().unwrap().preset_holding(102, &[900]);

        let names = vec![
            "TEMP".to_string(),
            "NOPE".to_string(),
            "SPEED_SP".to_string(),
        ];
        let response = service.read_many("P1", &names).await;

        assert_eq!(response.total_requested, 3);
        assert_eq!(response.successful_count, 2);
        assert_eq!(response.failed_count, 1);
        assert_eq!(response.overall_status, BulkStatus::PartialSuccess);
        assert_eq!(
            response.successful_count + response.failed_count,
            response.total_requested
        );

        assert_eq!(response.results[0].status, TagOpStatus::Success);
        assert_eq!(response.results[1].status, TagOpStatus::Error);
        assert_eq!(
            response.results[1].error_type.as_deref(),
            Some("AddressResolutionError")
        );
        assert_eq!(response.results[2].status, TagOpStatus::Success);
        assert_eq!(response.results[2].data, Some(TagValue::UInt(900)));
    }

    /// 全部成功与全部失败的整体状态
    #[tokio::test]
    async fn test_bulk_read_overall_status() {
        let (service, bank) = build_service().await;
        bank.lock().unwrap().preset_holding(102, &[1]);

        let ok = service.read_many("P1", &["SPEED_SP".to_string()]).await;
        assert_eq!(ok.overall_status, BulkStatus::Success);

        let bad = service.read_many("P1", &["X".to_string(), "Y".to_string()]).await;
        assert_eq!(bad.overall_status, BulkStatus::Failed);
        assert_eq!(bad.successful_count, 0);
    }

    /// 空标签列表 → 整批失败
    #[tokio::test]
    async fn test_bulk_read_empty_input() {
        let (service, _bank) = build_service().await;
        let response = service.read_many("P1", &[]).await;
        assert_eq!(response.overall_status, BulkStatus::Failed);
        assert_eq!(response.total_requested, 0);
        assert!(response.results.is_empty());
    }

    /// 批量写入的部分成功
    #[tokio::test]
    async fn test_bulk_write_partial() {
        let (service, bank) = build_service().await;

        let mut data = HashMap::new();
        data.insert("SPEED_SP".to_string(), json!(100));
        data.insert("TEMP_ACT".to_string(), json!(1.0)); // 只读 → 失败

        let response = service.write_many("P1", &data).await;
        assert_eq!(response.total_requested, 2);
        assert_eq!(response.successful_count, 1);
        assert_eq!(response.failed_count, 1);
        assert_eq!(response.overall_status, BulkStatus::PartialSuccess);
        assert_eq!(bank.lock().unwrap().holding_at(102), 100);
    }

    /// 空写入映射 → 整批失败
    #[tokio::test]
    async fn test_bulk_write_empty_input() {
        let (service, _bank) = build_service().await;
        let response = service.write_many("P1", &HashMap::new()).await;
        assert_eq!(response.overall_status, BulkStatus::Failed);
        assert_eq!(response.total_requested, 0);
    }
}
