//! 单PLC连接：会话池与操作执行器
//!
//! 每台PLC一个 `PlcConnection`，负责：
//! - 固定大小的会话池（租借/归还/懒连接）
//! - 断路器门控与快速失败
//! - 对单台设备的严格串行执行（底层线路是请求/应答式，无多路复用）
//! - 瞬态故障的指数退避重试
//! - 后台存活探测与指标记录

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::operation::{
    BreakerState, ConnectionMetrics, ConnectionState, MetricsSnapshot, ModbusOperation,
    OperationKind, OperationPayload, OperationResult, PlcStatus,
};
use crate::models::plc_config::PlcConfig;
use crate::services::domain::circuit_breaker::CircuitBreaker;
use crate::services::infrastructure::plc::modbus_link::{LinkFactory, ModbusLink};
use crate::utils::error::{AppError, AppResult};

/// 会话租借等待上限
const SESSION_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// 操作重试退避基数（秒），第 n 次重试前等待 0.1·2^n
const OPERATION_BASE_DELAY_S: f64 = 0.1;
/// 操作重试退避上限（秒）
const MAX_RETRY_DELAY_S: f64 = 5.0;
/// 存活探测读取的保持寄存器PDU地址与数量
const HEALTH_CHECK_REGISTER: u16 = 0;
const HEALTH_CHECK_COUNT: u16 = 1;

/// 池中的一条会话
struct SessionSlot {
    handle_id: Uuid,
    link: Box<dyn ModbusLink>,
}

/// 租借中的会话，Drop时自动归还连接池
///
/// 归还必须覆盖所有退出路径（成功、错误、取消），因此放在Drop里。
struct LeasedSession {
    slot: Option<SessionSlot>,
    tx: mpsc::Sender<SessionSlot>,
}

impl LeasedSession {
    fn link(&mut self) -> &mut dyn ModbusLink {
        // 槽位在Drop归还前必定存在
        self.slot.as_mut().unwrap().link.as_mut()
    }
}

impl Drop for LeasedSession {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // 通道容量等于槽位总数，try_send 不会因满而失败
            let _ = self.tx.try_send(slot);
        }
    }
}

/// 单台PLC的连接池与操作执行器
pub struct PlcConnection {
    config: PlcConfig,
    slot_tx: mpsc::Sender<SessionSlot>,
    slot_rx: Mutex<mpsc::Receiver<SessionSlot>>,
    metrics: Mutex<ConnectionMetrics>,
    breaker: Mutex<CircuitBreaker>,
    state: Mutex<ConnectionState>,
    /// 单PLC操作串行化互斥锁；tokio的Mutex按到达顺序排队（FIFO）
    operation_lock: Mutex<()>,
    shutdown: CancellationToken,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl PlcConnection {
    /// 创建连接池并填充会话；连接本身是懒建立的
    pub fn new(config: PlcConfig, factory: &dyn LinkFactory) -> Arc<Self> {
        let pool_size = config.pool_size.max(1);
        let (slot_tx, slot_rx) = mpsc::channel(pool_size);

        for index in 0..pool_size {
            let slot = SessionSlot {
                handle_id: Uuid::new_v4(),
                link: factory.create(&config),
            };
            debug!(
                "会话加入连接池: {} #{} ({})",
                config.plc_id, index, slot.handle_id
            );
            // 通道刚创建且容量等于槽位数，不会失败
            let _ = slot_tx.try_send(slot);
        }

        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout(),
        );

        Arc::new(Self {
            config,
            slot_tx,
            slot_rx: Mutex::new(slot_rx),
            metrics: Mutex::new(ConnectionMetrics::default()),
            breaker: Mutex::new(breaker),
            state: Mutex::new(ConnectionState::Disconnected),
            operation_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            probe_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PlcConfig {
        &self.config
    }

    /// 启动后台存活探测
    pub async fn initialize(self: Arc<Self>) -> AppResult<()> {
        info!(
            "🔗 初始化连接池: {} ({}, {} 个会话)",
            self.config.plc_id,
            self.config.endpoint(),
            self.config.pool_size
        );
        let handle = Arc::clone(&self).spawn_probe();
        *self.probe_task.lock().await = Some(handle);
        Ok(())
    }

    /// 关闭：取消探测任务并关闭池中所有会话
    pub async fn shutdown(&self) {
        info!("🛑 关闭PLC连接: {}", self.config.plc_id);
        self.shutdown.cancel();

        if let Some(handle) = self.probe_task.lock().await.take() {
            let _ = handle.await;
        }

        let mut rx = self.slot_rx.lock().await;
        while let Ok(mut slot) = rx.try_recv() {
            slot.link.close().await;
        }
        drop(rx);

        *self.state.lock().await = ConnectionState::Disconnected;
        debug!("PLC连接已关闭: {}", self.config.plc_id);
    }

    /// 执行一次Modbus操作
    ///
    /// 串行化 → 租借 → 线路调用 → 瞬态故障重试；
    /// 成功与失败都计入指标并上报断路器。
    pub async fn execute_operation(&self, operation: &ModbusOperation) -> AppResult<OperationResult> {
        let start = Instant::now();
        {
            self.metrics.lock().await.total_requests += 1;
        }

        debug!(
            "执行操作: {} {} (PDU {}, 原始 {})",
            self.config.plc_id,
            operation.operation_type.as_str(),
            operation.address,
            operation.original_address
        );

        let result = {
            let _serial = self.operation_lock.lock().await;
            self.execute_with_retry(operation).await
        };

        match result {
            Ok(value) => {
                self.record_successful_operation(start).await;
                Ok(value)
            }
            Err(e) => {
                self.record_failed_operation(&e).await;
                Err(e)
            }
        }
    }

    /// 点时快照：状态、断路器、计数器与响应时间
    pub async fn status_snapshot(&self) -> PlcStatus {
        let now = Utc::now();
        let metrics_snapshot = {
            let metrics = self.metrics.lock().await;
            MetricsSnapshot {
                total_requests: metrics.total_requests,
                successful_requests: metrics.successful_requests,
                failed_requests: metrics.failed_requests,
                success_rate: metrics.success_rate(),
                avg_response_time: metrics.avg_response_time,
                uptime_seconds: metrics.uptime_seconds(now),
                last_successful_connection: metrics.last_successful_connection,
                last_error: metrics.last_error.clone(),
                last_error_time: metrics.last_error_time,
            }
        };
        let state = *self.state.lock().await;
        let circuit_breaker_state = self.breaker.lock().await.state();

        PlcStatus {
            plc_id: self.config.plc_id.clone(),
            state,
            circuit_breaker_state,
            host: self.config.host.clone(),
            port: self.config.port,
            metrics: metrics_snapshot,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().await.state()
    }

    // ---- 内部实现 ----

    /// 重试循环：瞬态错误按 0.1·2^n 退避，非瞬态错误立即上抛
    async fn execute_with_retry(&self, operation: &ModbusOperation) -> AppResult<OperationResult> {
        let mut last_error: Option<AppError> = None;

        for attempt in 0..=operation.max_retries {
            match self.attempt_operation(operation).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(
                            "操作重试成功: {} {} (第{}次尝试)",
                            self.config.plc_id,
                            operation.operation_type.as_str(),
                            attempt + 1
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_transient() {
                        return Err(e);
                    }
                    if attempt < operation.max_retries {
                        let delay = (OPERATION_BASE_DELAY_S * 2f64.powi(attempt as i32))
                            .min(MAX_RETRY_DELAY_S);
                        warn!(
                            "操作失败，{}s 后重试: {} {} (第{}/{}次): {}",
                            delay,
                            self.config.plc_id,
                            operation.operation_type.as_str(),
                            attempt + 1,
                            operation.max_retries + 1,
                            e
                        );
                        last_error = Some(e);
                        sleep(Duration::from_secs_f64(delay)).await;
                    } else {
                        error!(
                            "操作重试预算耗尽: {} {} (共{}次): {}",
                            self.config.plc_id,
                            operation.operation_type.as_str(),
                            attempt + 1,
                            e
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::unknown_error("重试循环未产生结果")))
    }

    /// 单次尝试：租借会话、设置从站ID并分发线路调用
    async fn attempt_operation(&self, operation: &ModbusOperation) -> AppResult<OperationResult> {
        let mut session = self.acquire_session().await?;
        let link = session.link();
        link.set_unit(operation.unit_id.unwrap_or(self.config.unit_id));
        dispatch(link, operation)
            .await
            .map_err(|e| e.with_original_address(operation.original_address))
    }

    /// 租借一条会话
    ///
    /// 断路器不放行时快速失败；会话未连接则带退避地建立连接。
    /// 返回的租借对象在所有退出路径上都会把会话归还池中。
    async fn acquire_session(&self) -> AppResult<LeasedSession> {
        let allowed = { self.breaker.lock().await.can_attempt() };
        if !allowed {
            warn!("⚠️ 断路器打开，拒绝请求: {}", self.config.plc_id);
            *self.state.lock().await = ConnectionState::CircuitOpen;
            return Err(AppError::connection_error_for(
                format!("断路器打开: {}", self.config.plc_id),
                &self.config.plc_id,
            ));
        }

        let slot = {
            let mut rx = self.slot_rx.lock().await;
            match timeout(SESSION_ACQUIRE_TIMEOUT, rx.recv()).await {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    return Err(AppError::connection_error_for(
                        format!("连接池已关闭: {}", self.config.plc_id),
                        &self.config.plc_id,
                    ))
                }
                Err(_) => {
                    error!(
                        "连接池耗尽: {} (等待 {:?})",
                        self.config.plc_id, SESSION_ACQUIRE_TIMEOUT
                    );
                    return Err(AppError::connection_error_for(
                        format!("{} 没有可用连接", self.config.plc_id),
                        &self.config.plc_id,
                    ));
                }
            }
        };

        let mut leased = LeasedSession {
            slot: Some(slot),
            tx: self.slot_tx.clone(),
        };

        if !leased.link().is_connected() {
            // 失败时租借对象照常Drop，会话回到池中等待下次尝试
            self.connect_with_retry(leased.link()).await?;
        }

        Ok(leased)
    }

    /// 带指数退避的连接建立：第 n 次失败后等待 2^n 秒
    async fn connect_with_retry(&self, link: &mut dyn ModbusLink) -> AppResult<()> {
        *self.state.lock().await = ConnectionState::Connecting;
        let retries = self.config.retries.max(1);

        for attempt in 0..retries {
            debug!(
                "尝试建立连接: {} (第{}/{}次)",
                self.config.plc_id,
                attempt + 1,
                retries
            );
            match link.connect().await {
                Ok(()) if link.is_connected() => {
                    self.record_successful_connection().await;
                    return Ok(());
                }
                Ok(()) => {}
                Err(e) => {
                    warn!(
                        "连接尝试失败: {} (第{}次): {}",
                        self.config.plc_id,
                        attempt + 1,
                        e
                    );
                }
            }
            if attempt + 1 < retries {
                sleep(Duration::from_secs_f64(2f64.powi(attempt as i32))).await;
            }
        }

        self.record_failed_connection().await;
        Err(AppError::connection_error_for(
            format!("连接 {} 失败，已重试 {} 次", self.config.plc_id, retries),
            &self.config.plc_id,
        ))
    }

    async fn record_successful_connection(&self) {
        *self.state.lock().await = ConnectionState::Connected;
        {
            let mut metrics = self.metrics.lock().await;
            let now = Utc::now();
            metrics.last_successful_connection = Some(now);
            if metrics.connection_uptime_start.is_none() {
                metrics.connection_uptime_start = Some(now);
            }
        }
        self.breaker.lock().await.record_success();
        debug!("✅ 连接建立成功: {}", self.config.plc_id);
    }

    async fn record_failed_connection(&self) {
        *self.state.lock().await = ConnectionState::Error;
        self.breaker.lock().await.record_failure();
        error!("❌ 连接建立失败: {}", self.config.plc_id);
    }

    async fn record_successful_operation(&self, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        {
            let mut metrics = self.metrics.lock().await;
            metrics.record_response_time(elapsed);
            metrics.successful_requests += 1;
        }
        self.breaker.lock().await.record_success();
        debug!(
            "操作完成: {} ({:.3}s)",
            self.config.plc_id, elapsed
        );
    }

    async fn record_failed_operation(&self, error: &AppError) {
        {
            let mut metrics = self.metrics.lock().await;
            metrics.failed_requests += 1;
            metrics.last_error = Some(error.to_string());
            metrics.last_error_time = Some(Utc::now());
        }
        self.breaker.lock().await.record_failure();
        error!("操作失败: {} - {}", self.config.plc_id, error);
    }

    /// 启动后台存活探测任务
    ///
    /// 每 health_check_interval_s 秒租借一条会话读取保持寄存器0；
    /// 探测错误全部吞掉，只反映到指标与断路器。
    fn spawn_probe(self: Arc<Self>) -> JoinHandle<()> {
        let token = self.shutdown.clone();
        let interval = Duration::from_secs(self.config.health_check_interval_s.max(1));

        tokio::spawn(async move {
            debug!("健康检查任务启动: {}", self.config.plc_id);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("健康检查任务退出: {}", self.config.plc_id);
                        break;
                    }
                    _ = sleep(interval) => {
                        self.perform_health_check().await;
                    }
                }
            }
        })
    }

    async fn perform_health_check(&self) {
        let start = Instant::now();
        match self.health_probe().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_secs_f64();
                self.metrics.lock().await.record_response_time(elapsed);
                debug!(
                    "健康检查成功: {} ({:.3}s)",
                    self.config.plc_id, elapsed
                );
            }
            Err(e) => {
                {
                    let mut metrics = self.metrics.lock().await;
                    metrics.last_error = Some(e.to_string());
                    metrics.last_error_time = Some(Utc::now());
                }
                self.breaker.lock().await.record_failure();
                debug!("💔 健康检查失败: {} - {}", self.config.plc_id, e);
            }
        }
    }

    async fn health_probe(&self) -> AppResult<()> {
        let mut session = self.acquire_session().await?;
        let link = session.link();
        link.set_unit(self.config.unit_id);
        link.read_holding(HEALTH_CHECK_REGISTER, HEALTH_CHECK_COUNT)
            .await?;
        Ok(())
    }
}

/// 将操作分发到对应的线路调用
///
/// 八种PDU操作全部使用0基地址；写操作载荷由标签服务编码。
async fn dispatch(
    link: &mut dyn ModbusLink,
    operation: &ModbusOperation,
) -> AppResult<OperationResult> {
    match operation.operation_type {
        OperationKind::ReadHolding => Ok(OperationResult::Registers(
            link.read_holding(operation.address, operation.count).await?,
        )),
        OperationKind::ReadInput => Ok(OperationResult::Registers(
            link.read_input(operation.address, operation.count).await?,
        )),
        OperationKind::ReadCoil => Ok(OperationResult::Bits(
            link.read_coils(operation.address, operation.count).await?,
        )),
        OperationKind::ReadDiscrete => Ok(OperationResult::Bits(
            link.read_discretes(operation.address, operation.count)
                .await?,
        )),
        OperationKind::WriteRegister => {
            let words = expect_words(operation)?;
            link.write_register(operation.address, words[0]).await?;
            Ok(OperationResult::Written)
        }
        OperationKind::WriteRegisters => {
            let words = expect_words(operation)?;
            link.write_registers(operation.address, words).await?;
            Ok(OperationResult::Written)
        }
        OperationKind::WriteCoil => {
            let bits = expect_bits(operation)?;
            link.write_coil(operation.address, bits[0]).await?;
            Ok(OperationResult::Written)
        }
        OperationKind::WriteCoils => {
            let bits = expect_bits(operation)?;
            link.write_coils(operation.address, bits).await?;
            Ok(OperationResult::Written)
        }
    }
}

fn expect_words(operation: &ModbusOperation) -> AppResult<&[u16]> {
    match &operation.values {
        Some(OperationPayload::Words(words)) if !words.is_empty() => Ok(words),
        _ => Err(AppError::validation_error(format!(
            "{} 操作缺少寄存器载荷",
            operation.operation_type.as_str()
        ))),
    }
}

fn expect_bits(operation: &ModbusOperation) -> AppResult<&[bool]> {
    match &operation.values {
        Some(OperationPayload::Bits(bits)) if !bits.is_empty() => Ok(bits),
        _ => Err(AppError::validation_error(format!(
            "{} 操作缺少线圈载荷",
            operation.operation_type.as_str()
        ))),
    }
}
