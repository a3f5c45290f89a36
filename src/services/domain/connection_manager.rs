//! 连接管理器
//!
//! 持有全部PLC的连接池，负责机群初始化、操作路由、状态查询、
//! 健康汇总与并发关闭。作为拥有生命周期的对象由运行时创建并
//! 以 `Arc` 传给标签服务，不使用全局单例。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info};
use tokio::sync::RwLock;

use crate::models::operation::{
    ConnectionState, HealthStatus, ModbusOperation, OperationResult, PlcHealthEntry, PlcStatus,
};
use crate::models::plc_config::PlcConfig;
use crate::services::domain::plc_connection::PlcConnection;
use crate::services::infrastructure::plc::modbus_link::{LinkFactory, TcpLinkFactory};
use crate::utils::error::{AppError, AppResult};

/// 全PLC连接管理器
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<PlcConnection>>>,
    factory: Box<dyn LinkFactory>,
}

impl ConnectionManager {
    /// 生产环境构造：TCP链路
    pub fn new() -> Self {
        Self::with_factory(Box::new(TcpLinkFactory))
    }

    /// 指定链路工厂构造（测试注入Mock链路）
    pub fn with_factory(factory: Box<dyn LinkFactory>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// 初始化机群
    ///
    /// 为每个描述符创建连接池并并发启动存活探测；单台PLC的
    /// 初始化失败不会中止其余PLC，失败列表返回给调用方。
    pub async fn initialize(&self, configs: Vec<PlcConfig>) -> Vec<(String, AppError)> {
        info!("初始化连接管理器: {} 台PLC", configs.len());
        let mut failures: Vec<(String, AppError)> = Vec::new();
        let mut created: Vec<Arc<PlcConnection>> = Vec::new();

        for config in configs {
            let plc_id = config.plc_id.clone();
            if let Err(e) = config.validate() {
                error!("PLC初始化失败: {} - {}", plc_id, e);
                failures.push((plc_id, e));
                continue;
            }
            let connection = PlcConnection::new(config, self.factory.as_ref());
            self.connections
                .write()
                .await
                .insert(plc_id, Arc::clone(&connection));
            created.push(connection);
        }

        let results = join_all(created.iter().map(|conn| Arc::clone(conn).initialize())).await;
        for (conn, result) in created.iter().zip(results) {
            match result {
                Ok(()) => debug!("PLC初始化完成: {}", conn.config().plc_id),
                Err(e) => {
                    error!("PLC初始化失败: {} - {}", conn.config().plc_id, e);
                    failures.push((conn.config().plc_id.clone(), e));
                }
            }
        }

        info!(
            "连接管理器初始化完成: 成功 {} 台, 失败 {} 台",
            created.len(),
            failures.len()
        );
        failures
    }

    /// 路由并执行一次Modbus操作
    ///
    /// 任何失败都以统一格式包装：`Failed to execute <kind> on PLC <id>: <cause>`
    pub async fn execute_operation(
        &self,
        plc_id: &str,
        operation: &ModbusOperation,
    ) -> AppResult<OperationResult> {
        let start = Instant::now();
        let kind = operation.operation_type.as_str();

        let result = self.execute_routed(plc_id, operation).await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(value) => {
                debug!(
                    "操作执行完成: {} {} ({}ms)",
                    plc_id, kind, duration_ms
                );
                Ok(value)
            }
            Err(e) => {
                error!(
                    "操作执行失败: {} {} ({}ms): {}",
                    plc_id, kind, duration_ms, e
                );
                Err(e.wrap_operation(kind, plc_id))
            }
        }
    }

    async fn execute_routed(
        &self,
        plc_id: &str,
        operation: &ModbusOperation,
    ) -> AppResult<OperationResult> {
        if plc_id.is_empty() {
            return Err(AppError::validation_error("PLC ID 不能为空"));
        }

        let connection = {
            let connections = self.connections.read().await;
            connections.get(plc_id).cloned()
        };

        let connection = connection.ok_or_else(|| {
            AppError::configuration_error_at(
                format!("没有PLC {} 的连接", plc_id),
                plc_id,
                None,
            )
        })?;

        connection.execute_operation(operation).await
    }

    /// 单台PLC的点时状态快照
    pub async fn connection_status(&self, plc_id: &str) -> AppResult<PlcStatus> {
        let connection = {
            let connections = self.connections.read().await;
            connections.get(plc_id).cloned()
        };
        match connection {
            Some(conn) => Ok(conn.status_snapshot().await),
            None => Err(AppError::configuration_error_at(
                format!("没有PLC {} 的连接", plc_id),
                plc_id,
                None,
            )),
        }
    }

    /// 全部PLC的状态快照
    pub async fn connection_status_all(&self) -> HashMap<String, PlcStatus> {
        let connections: Vec<Arc<PlcConnection>> = {
            self.connections.read().await.values().cloned().collect()
        };
        let snapshots = join_all(connections.iter().map(|c| c.status_snapshot())).await;
        snapshots
            .into_iter()
            .map(|status| (status.plc_id.clone(), status))
            .collect()
    }

    /// 机群健康汇总：全部连接→healthy，部分→degraded，全断→unhealthy
    pub async fn health_status(&self) -> HealthStatus {
        let connections: Vec<Arc<PlcConnection>> = {
            self.connections.read().await.values().cloned().collect()
        };

        let mut plc_status = HashMap::new();
        let mut connected = 0usize;
        for conn in &connections {
            let state = conn.state().await;
            if state == ConnectionState::Connected {
                connected += 1;
            }
            plc_status.insert(
                conn.config().plc_id.clone(),
                PlcHealthEntry {
                    state,
                    circuit_breaker: conn.breaker_state().await,
                },
            );
        }

        let total = connections.len();
        let status = if connected == total {
            "healthy"
        } else if connected > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        HealthStatus {
            status: status.to_string(),
            total_plcs: total,
            connected_plcs: connected,
            disconnected_plcs: total - connected,
            timestamp: Utc::now(),
            plc_status,
        }
    }

    /// 并发关闭全部连接池；单台失败仅记录日志
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<PlcConnection>> = {
            self.connections.read().await.values().cloned().collect()
        };
        info!("关闭连接管理器: {} 台PLC", connections.len());

        join_all(connections.iter().map(|conn| async move {
            conn.shutdown().await;
        }))
        .await;

        self.connections.write().await.clear();
        info!("连接管理器已关闭");
    }

    /// 已登记的PLC ID列表
    pub async fn plc_ids(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
