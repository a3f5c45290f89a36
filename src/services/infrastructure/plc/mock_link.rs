//! Mock Modbus链路
//!
//! 内存寄存器组实现的 `ModbusLink`，供单元测试与集成测试在没有
//! 真实设备的情况下驱动完整的池/重试/断路器/标签路径。
//! 支持预置读值、写入日志、脚本化故障注入与网络延迟模拟。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::plc_config::PlcConfig;
use crate::utils::error::{AppError, AppResult};

use super::modbus_link::{LinkFactory, ModbusLink};

/// 注入故障的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailureKind {
    /// IO层故障（映射为连接错误）
    Io,
    /// 设备返回Modbus异常（映射为协议错误）
    Protocol,
}

/// 一次写操作的记录
#[derive(Debug, Clone)]
pub struct MockWrite {
    pub operation: String,
    pub address: u16,
    pub words: Vec<u16>,
    pub timestamp: DateTime<Utc>,
}

/// 共享的模拟寄存器组
///
/// 同一PLC的所有池会话共享一个寄存器组，与真实设备一致。
#[derive(Debug, Default)]
pub struct MockBank {
    holding: HashMap<u16, u16>,
    input: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discretes: HashMap<u16, bool>,
    write_log: Vec<MockWrite>,
    fail_connects_remaining: u32,
    fail_ops_remaining: u32,
    fail_kind: MockFailureKind,
    error_rate: f64,
    delay: Option<Duration>,
    pub connect_attempts: u64,
    pub operation_count: u64,
}

impl Default for MockFailureKind {
    fn default() -> Self {
        Self::Io
    }
}

pub type SharedMockBank = Arc<Mutex<MockBank>>;

impl MockBank {
    pub fn new_shared() -> SharedMockBank {
        Arc::new(Mutex::new(MockBank::default()))
    }

    /// 预置保持寄存器的值（从起始地址连续写入）
    pub fn preset_holding(&mut self, address: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.holding.insert(address + i as u16, *word);
        }
    }

    pub fn preset_input(&mut self, address: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.input.insert(address + i as u16, *word);
        }
    }

    pub fn preset_coil(&mut self, address: u16, value: bool) {
        self.coils.insert(address, value);
    }

    pub fn preset_discrete(&mut self, address: u16, value: bool) {
        self.discretes.insert(address, value);
    }

    pub fn holding_at(&self, address: u16) -> u16 {
        self.holding.get(&address).copied().unwrap_or(0)
    }

    pub fn coil_at(&self, address: u16) -> bool {
        self.coils.get(&address).copied().unwrap_or(false)
    }

    /// 接下来的 n 次连接尝试失败
    pub fn fail_connects(&mut self, n: u32) {
        self.fail_connects_remaining = n;
    }

    /// 接下来的 n 次线路操作按指定类别失败
    pub fn fail_operations(&mut self, n: u32, kind: MockFailureKind) {
        self.fail_ops_remaining = n;
        self.fail_kind = kind;
    }

    /// 按概率随机注入故障（0.0~1.0）
    pub fn set_error_simulation(&mut self, rate: f64) {
        self.error_rate = rate.clamp(0.0, 1.0);
    }

    /// 模拟网络延迟
    pub fn set_network_delay(&mut self, delay: Option<Duration>) {
        self.delay = delay;
    }

    pub fn write_log(&self) -> &[MockWrite] {
        &self.write_log
    }

    pub fn clear_write_log(&mut self) {
        self.write_log.clear();
    }

    pub fn was_address_written(&self, address: u16) -> bool {
        self.write_log.iter().any(|w| w.address == address)
    }

    fn next_op_failure(&mut self) -> Option<MockFailureKind> {
        if self.fail_ops_remaining > 0 {
            self.fail_ops_remaining -= 1;
            return Some(self.fail_kind);
        }
        if self.error_rate > 0.0 && rand::random::<f64>() < self.error_rate {
            return Some(self.fail_kind);
        }
        None
    }

    fn record_write(&mut self, operation: &str, address: u16, words: Vec<u16>) {
        self.write_log.push(MockWrite {
            operation: operation.to_string(),
            address,
            words,
            timestamp: Utc::now(),
        });
    }
}

/// 绑定到共享寄存器组的一条Mock会话链路
pub struct MockLink {
    bank: SharedMockBank,
    connected: bool,
    unit_id: u8,
}

impl MockLink {
    pub fn new(bank: SharedMockBank) -> Self {
        Self {
            bank,
            connected: false,
            unit_id: 1,
        }
    }

    /// 取出延迟设置并在锁外挂起，避免跨await持锁
    async fn simulate_delay(&self) {
        let delay = {
            let bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
            bank.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_connected(&self) -> AppResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(AppError::connection_error("连接已断开"))
        }
    }

    fn begin_op(&self, address: u16) -> AppResult<()> {
        self.check_connected()?;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        bank.operation_count += 1;
        match bank.next_op_failure() {
            None => Ok(()),
            Some(MockFailureKind::Io) => Err(AppError::connection_error("模拟IO故障")),
            Some(MockFailureKind::Protocol) => Err(AppError::protocol_error(
                "模拟Modbus异常: IllegalDataAddress",
                address,
                0,
            )),
        }
    }
}

#[async_trait]
impl ModbusLink for MockLink {
    async fn connect(&mut self) -> AppResult<()> {
        if self.connected {
            return Ok(());
        }
        self.simulate_delay().await;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        bank.connect_attempts += 1;
        if bank.fail_connects_remaining > 0 {
            bank.fail_connects_remaining -= 1;
            return Err(AppError::connection_error("模拟连接失败"));
        }
        drop(bank);
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        self.connected = false;
    }

    fn set_unit(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    async fn read_holding(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        Ok((0..count).map(|i| bank.holding_at(address + i)).collect())
    }

    async fn read_input(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        Ok((0..count)
            .map(|i| bank.input.get(&(address + i)).copied().unwrap_or(0))
            .collect())
    }

    async fn read_coils(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        Ok((0..count).map(|i| bank.coil_at(address + i)).collect())
    }

    async fn read_discretes(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        Ok((0..count)
            .map(|i| bank.discretes.get(&(address + i)).copied().unwrap_or(false))
            .collect())
    }

    async fn write_register(&mut self, address: u16, value: u16) -> AppResult<()> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        bank.holding.insert(address, value);
        bank.record_write("write_register", address, vec![value]);
        Ok(())
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> AppResult<()> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        for (i, value) in values.iter().enumerate() {
            bank.holding.insert(address + i as u16, *value);
        }
        bank.record_write("write_registers", address, values.to_vec());
        Ok(())
    }

    async fn write_coil(&mut self, address: u16, value: bool) -> AppResult<()> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        bank.coils.insert(address, value);
        bank.record_write("write_coil", address, vec![u16::from(value)]);
        Ok(())
    }

    async fn write_coils(&mut self, address: u16, values: &[bool]) -> AppResult<()> {
        self.simulate_delay().await;
        self.begin_op(address)?;
        let mut bank = self.bank.lock().unwrap_or_else(|e| e.into_inner());
        for (i, value) in values.iter().enumerate() {
            bank.coils.insert(address + i as u16, *value);
        }
        bank.record_write(
            "write_coils",
            address,
            values.iter().map(|v| u16::from(*v)).collect(),
        );
        Ok(())
    }
}

/// Mock链路工厂
///
/// 按PLC ID绑定寄存器组；未显式绑定的PLC使用默认寄存器组。
#[derive(Default)]
pub struct MockLinkFactory {
    banks: HashMap<String, SharedMockBank>,
    default_bank: Option<SharedMockBank>,
}

impl MockLinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为指定PLC注册寄存器组
    pub fn with_bank(mut self, plc_id: &str, bank: SharedMockBank) -> Self {
        self.banks.insert(plc_id.to_string(), bank);
        self
    }

    pub fn with_default_bank(mut self, bank: SharedMockBank) -> Self {
        self.default_bank = Some(bank);
        self
    }
}

impl LinkFactory for MockLinkFactory {
    fn create(&self, config: &PlcConfig) -> Box<dyn ModbusLink> {
        let bank = self
            .banks
            .get(&config.plc_id)
            .cloned()
            .or_else(|| self.default_bank.clone())
            .unwrap_or_else(MockBank::new_shared);
        Box::new(MockLink::new(bank))
    }
}
