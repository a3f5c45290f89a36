// 网关端到端集成测试
//
// 通过Mock链路驱动完整路径：标签服务 → 连接管理器 → 操作执行器
// → 连接池 → 线路。覆盖读解码、写校验、批量部分成功、断路器
// 触发与恢复、条件流程等端到端场景。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tag_gateway::config::DeviceCatalog;
use tag_gateway::models::operation::BreakerState;
use tag_gateway::models::plc_config::{AddressingScheme, PlcConfig};
use tag_gateway::models::procedure::{ProcedureDefinition, ProcedureStep, StepAction};
use tag_gateway::models::register_map::{
    RegisterConfig, RegisterDataType, RegisterType, TagType,
};
use tag_gateway::models::tag::{BulkStatus, TagOpStatus, TagValue};
use tag_gateway::models::ExecutionStatus;
use tag_gateway::services::infrastructure::plc::mock_link::{
    MockBank, MockFailureKind, MockLinkFactory, SharedMockBank,
};
use tag_gateway::services::{ConnectionManager, ProcedureExecutor, TagService};

fn plc(id: &str, threshold: u32, reset_s: u64) -> PlcConfig {
    PlcConfig {
        plc_id: id.to_string(),
        host: "127.0.0.1".to_string(),
        port: 502,
        unit_id: 1,
        timeout_s: 1.0,
        retries: 1,
        description: String::new(),
        addressing_scheme: AddressingScheme::Absolute,
        pool_size: 2,
        health_check_interval_s: 3600,
        circuit_breaker_threshold: threshold,
        circuit_breaker_timeout_s: reset_s,
    }
}

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

fn build_catalog() -> DeviceCatalog {
    let mut catalog = DeviceCatalog::new();
    catalog.insert_plc(plc("P1", 5, 60));
    catalog.insert_plc(plc("P2", 3, 1));

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
        "P2",
        40001,
        register(
            "LEVEL",
            RegisterType::HoldingRegister,
            RegisterDataType::Uint16,
            TagType::Analog,
            false,
            None,
            None,
        ),
    );
    catalog.validate().unwrap();
    catalog
}

struct Gateway {
    service: Arc<TagService>,
    manager: Arc<ConnectionManager>,
    bank_p1: SharedMockBank,
    bank_p2: SharedMockBank,
}

async fn build_gateway() -> Gateway {
    let catalog = build_catalog();
    let bank_p1 = MockBank::new_shared();
    let bank_p2 = MockBank::new_shared();

    let factory = MockLinkFactory::new()
        .with_bank("P1", bank_p1.clone())
        .with_bank("P2", bank_p2.clone());
    let manager = Arc::new(ConnectionManager::with_factory(Box::new(factory)));
    let failures = manager.initialize(catalog.plc_configs()).await;
    assert!(failures.is_empty());

    let service = Arc::new(TagService::new(Arc::new(catalog), Arc::clone(&manager)));
    Gateway {
        service,
        manager,
        bank_p1,
        bank_p2,
    }
}

/// 场景1：float32 标签读取，大端双字解码 ≈ 50.24
#[tokio::test]
async fn scenario_float_read() {
    let gateway = build_gateway().await;
    gateway
        .bank_p1
        .lock()
        .unwrap()
        .preset_holding(100, &[0x4248, 0xF5C3]);

    let result = gateway.service.read_tag("P1", "TEMP").await;
    assert_eq!(result.status, TagOpStatus::Success);
    assert_eq!(result.registers, Some(vec![16968, 62915]));
    let value = result.data.unwrap().as_f64();
    assert!((value - 50.24).abs() < 1e-3, "期望 ≈50.24, 实际 {}", value);

    // 传输形态：status 序列化为 "success"，data 为裸数值
    let json = serde_json::to_value(
        gateway.service.read_tag("P1", "TEMP").await,
    )
    .unwrap();
    assert_eq!(json["status"], json!("success"));
    assert_eq!(json["tag_name"], json!("TEMP"));
    assert!(json["data"].is_number());
}

/// 场景2：超出上限的写入被验证拒绝，不触碰线路
#[tokio::test]
async fn scenario_validation_reject() {
    let gateway = build_gateway().await;

    let result = gateway.service.write_tag("P1", "SPEED_SP", &json!(1800)).await;
    assert_eq!(result.status, TagOpStatus::Error);
    assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
    assert_eq!(gateway.bank_p1.lock().unwrap().operation_count, 0);
}

/// 场景3：只读寄存器写入被拒绝，不触碰线路
#[tokio::test]
async fn scenario_readonly_reject() {
    let gateway = build_gateway().await;

    let result = gateway.service.write_tag("P1", "TEMP_ACT", &json!(20.0)).await;
    assert_eq!(result.status, TagOpStatus::Error);
    assert_eq!(result.error_type.as_deref(), Some("ValidationError"));
    assert_eq!(gateway.bank_p1.lock().unwrap().operation_count, 0);
}

/// 场景4：批量读取部分成功
#[tokio::test]
async fn scenario_bulk_partial() {
    let gateway = build_gateway().await;
    {
        let mut bank = gateway.bank_p1.lock().unwrap();
        bank.preset_holding(100, &[0x4248, 0xF5C3]);
        bank.preset_holding(102, &[1200]);
    }

    let names = vec![
        "TEMP".to_string(),
        "NOPE".to_string(),
        "SPEED_SP".to_string(),
    ];
    let response = gateway.service.read_many("P1", &names).await;

    assert_eq!(response.total_requested, 3);
    assert_eq!(response.successful_count, 2);
    assert_eq!(response.failed_count, 1);
    assert_eq!(response.overall_status, BulkStatus::PartialSuccess);

    assert_eq!(response.results[0].status, TagOpStatus::Success);
    assert_eq!(
        response.results[1].error_type.as_deref(),
        Some("AddressResolutionError")
    );
    assert_eq!(response.results[2].data, Some(TagValue::UInt(1200)));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["overall_status"], json!("partial_success"));
}

/// 场景5：断路器触发与恢复（阈值3，复位1秒）
#[tokio::test]
async fn scenario_breaker_trip_and_recovery() {
    let gateway = build_gateway().await;
    {
        let mut bank = gateway.bank_p2.lock().unwrap();
        bank.preset_holding(0, &[77]);
        // 注入足够多的IO故障：三次执行（含各自的重试预算）全部失败
        bank.fail_operations(100, MockFailureKind::Io);
    }

    for _ in 0..3 {
        let result = gateway.service.read_tag("P2", "LEVEL").await;
        assert_eq!(result.status, TagOpStatus::Error);
    }

    let status = gateway.manager.connection_status("P2").await.unwrap();
    assert_eq!(status.circuit_breaker_state, BreakerState::Open);

    // 复位窗口内快速失败：没有新的线路操作
    let ops_before = gateway.bank_p2.lock().unwrap().operation_count;
    let result = gateway.service.read_tag("P2", "LEVEL").await;
    assert_eq!(result.status, TagOpStatus::Error);
    assert_eq!(result.error_type.as_deref(), Some("ConnectionError"));
    assert_eq!(gateway.bank_p2.lock().unwrap().operation_count, ops_before);

    // 复位窗口过后允许探测；故障已清除，读取成功并恢复闭合
    {
        let mut bank = gateway.bank_p2.lock().unwrap();
        bank.fail_operations(0, MockFailureKind::Io);
    }
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let result = gateway.service.read_tag("P2", "LEVEL").await;
    assert_eq!(result.status, TagOpStatus::Success, "{:?}", result.error_message);
    assert_eq!(result.data, Some(TagValue::UInt(77)));

    let status = gateway.manager.connection_status("P2").await.unwrap();
    assert_eq!(status.circuit_breaker_state, BreakerState::Closed);
}

/// 场景6：条件分支流程（TEMP=55 → 启动冷却器）
#[tokio::test]
async fn scenario_conditional_procedure() {
    let gateway = build_gateway().await;
    gateway
        .bank_p1
        .lock()
        .unwrap()
        .preset_holding(100, &[0x425C, 0x0000]);
    // 0x425C0000 = 55.0f32

    let executor = ProcedureExecutor::new(Arc::clone(&gateway.service));
    let procedure = ProcedureDefinition {
        name: "cooldown".to_string(),
        description: String::new(),
        steps: vec![
            ProcedureStep {
                name: "r1".to_string(),
                action: StepAction::Read {
                    plc_id: "P1".to_string(),
                    register: "TEMP".to_string(),
                    store_as: Some("t".to_string()),
                },
            },
            ProcedureStep {
                name: "c1".to_string(),
                action: StepAction::Condition {
                    plc_id: "P1".to_string(),
                    condition: "TEMP > 50".to_string(),
                    if_true: "w_hi".to_string(),
                    if_false: "w_lo".to_string(),
                },
            },
            ProcedureStep {
                name: "w_hi".to_string(),
                action: StepAction::Write {
                    plc_id: "P1".to_string(),
                    register: "COOLER".to_string(),
                    value: json!(1),
                },
            },
            ProcedureStep {
                name: "w_lo".to_string(),
                action: StepAction::Write {
                    plc_id: "P1".to_string(),
                    register: "COOLER".to_string(),
                    value: json!(0),
                },
            },
        ],
    };

    let result = executor.execute_procedure(&procedure).await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.total_steps, 3);
    assert_eq!(result.successful_steps, 3);
    assert_eq!(result.failed_steps, 0);

    assert_eq!(result.step_results[0].step_name, "r1");
    let temp = result.step_results[0].data.as_ref().unwrap().as_f64().unwrap();
    assert!((temp - 55.0).abs() < 1e-6);
    assert_eq!(result.step_results[1].step_name, "c1");
    assert_eq!(result.step_results[1].data, Some(json!(true)));
    assert_eq!(result.step_results[2].step_name, "w_hi");
    assert_eq!(result.step_results[2].data, Some(json!(1)));

    assert!(gateway.bank_p1.lock().unwrap().coil_at(0));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], json!("completed"));
}

/// 机群健康汇总随连接状态变化
#[tokio::test]
async fn health_rollup_transitions() {
    let gateway = build_gateway().await;

    let health = gateway.manager.health_status().await;
    assert_eq!(health.status, "unhealthy");
    assert_eq!(health.total_plcs, 2);

    gateway.bank_p1.lock().unwrap().preset_holding(102, &[10]);
    gateway.service.read_tag("P1", "SPEED_SP").await;

    let health = gateway.manager.health_status().await;
    assert_eq!(health.status, "degraded");
    assert_eq!(health.connected_plcs, 1);

    gateway.bank_p2.lock().unwrap().preset_holding(0, &[1]);
    gateway.service.read_tag("P2", "LEVEL").await;

    let health = gateway.manager.health_status().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.disconnected_plcs, 0);

    gateway.manager.shutdown().await;
}

/// 批量写入经同一PLC并发执行，计数守恒
#[tokio::test]
async fn bulk_write_conservation() {
    let gateway = build_gateway().await;

    let mut data = HashMap::new();
    data.insert("SPEED_SP".to_string(), json!(500));
    data.insert("TEMP".to_string(), json!(42.5));
    data.insert("TEMP_ACT".to_string(), json!(1.0)); // 只读 → 失败

    let response = gateway.service.write_many("P1", &data).await;
    assert_eq!(response.total_requested, 3);
    assert_eq!(
        response.successful_count + response.failed_count,
        response.total_requested
    );
    assert_eq!(response.successful_count, 2);
    assert_eq!(response.overall_status, BulkStatus::PartialSuccess);

    let bank = gateway.bank_p1.lock().unwrap();
    assert_eq!(bank.holding_at(102), 500);
}

/// 未知PLC路由错误带统一消息格式
#[tokio::test]
async fn unknown_plc_error_shape() {
    let gateway = build_gateway().await;

    let result = gateway.service.read_tag("P9", "TEMP").await;
    assert_eq!(result.status, TagOpStatus::Error);
    assert_eq!(result.error_type.as_deref(), Some("ConfigurationError"));
}
