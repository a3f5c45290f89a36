//! Modbus/TCP 链路封装
//!
//! `ModbusLink` 是连接池与具体线路实现之间的接口缝：
//! 生产环境使用 tokio-modbus 的TCP客户端，测试使用内存Mock链路。
//! 帧结构与功能码由 tokio-modbus 负责，本层只做地址与错误语义的映射。

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::models::plc_config::PlcConfig;
use crate::utils::error::{AppError, AppResult};

/// 单条Modbus会话链路的抽象
///
/// 所有地址均为0基PDU地址。实现不负责重试与断路器，
/// 这些由上层的操作执行器统一处理。
#[async_trait]
pub trait ModbusLink: Send {
    /// 建立连接（幂等；已连接时直接返回）
    async fn connect(&mut self) -> AppResult<()>;

    fn is_connected(&self) -> bool;

    /// 关闭连接并释放底层资源
    async fn close(&mut self);

    /// 设置后续请求使用的从站ID
    fn set_unit(&mut self, unit_id: u8);

    async fn read_holding(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>>;

    async fn read_input(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>>;

    async fn read_coils(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>>;

    async fn read_discretes(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>>;

    async fn write_register(&mut self, address: u16, value: u16) -> AppResult<()>;

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> AppResult<()>;

    async fn write_coil(&mut self, address: u16, value: bool) -> AppResult<()>;

    async fn write_coils(&mut self, address: u16, values: &[bool]) -> AppResult<()>;
}

/// 链路工厂：连接池按PLC描述符创建会话链路
pub trait LinkFactory: Send + Sync {
    fn create(&self, config: &PlcConfig) -> Box<dyn ModbusLink>;
}

/// 基于 tokio-modbus 的TCP链路
pub struct TcpModbusLink {
    endpoint: String,
    unit_id: u8,
    request_timeout: Duration,
    context: Option<Context>,
}

impl TcpModbusLink {
    pub fn new(config: &PlcConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            unit_id: config.unit_id,
            request_timeout: config.timeout(),
            context: None,
        }
    }

    fn context_mut(&mut self) -> AppResult<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| AppError::connection_error("连接已断开"))
    }

    /// 统一处理 tokio-modbus 的双层Result
    ///
    /// 内层异常码→协议错误（可重试，原始地址由上层补充）；
    /// 外层IO错误→连接错误，并丢弃上下文，迫使下次租借重连。
    fn unwrap_response<T, P, E>(
        &mut self,
        kind: &str,
        address: u16,
        response: Result<Result<T, P>, E>,
    ) -> AppResult<T>
    where
        P: std::fmt::Debug,
        E: std::fmt::Display,
    {
        match response {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(exception)) => Err(AppError::protocol_error(
                format!("{}返回Modbus异常: {:?}", kind, exception),
                address,
                0,
            )),
            Err(err) => {
                self.context = None;
                Err(AppError::connection_error(format!(
                    "{}IO错误: {}",
                    kind, err
                )))
            }
        }
    }

    /// 请求超时后连接状态不可信，丢弃上下文
    fn on_timeout(&mut self, kind: &'static str) -> AppError {
        self.context = None;
        AppError::timeout_error(kind, "请求超时")
    }
}

#[async_trait]
impl ModbusLink for TcpModbusLink {
    async fn connect(&mut self) -> AppResult<()> {
        if self.context.is_some() {
            return Ok(());
        }

        let socket_addr = self
            .endpoint
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                AppError::configuration_error(format!(
                    "无效的地址格式: {}, 错误: {}",
                    self.endpoint, e
                ))
            })?;

        let slave = Slave(self.unit_id);
        let context = timeout(self.request_timeout, tcp::connect_slave(socket_addr, slave))
            .await
            .map_err(|_| AppError::timeout_error("connect", "连接超时"))?
            .map_err(|e| AppError::connection_error(format!("Modbus连接失败: {}", e)))?;

        self.context = Some(context);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn close(&mut self) {
        if let Some(context) = self.context.take() {
            // 丢弃上下文即关闭底层TCP连接
            drop(context);
        }
    }

    fn set_unit(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
        if let Some(context) = self.context.as_mut() {
            context.set_slave(Slave(unit_id));
        }
    }

    async fn read_holding(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.read_holding_registers(address, count))
            .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("read_holding")),
        };
        self.unwrap_response("读取保持寄存器", address, response)
    }

    async fn read_input(&mut self, address: u16, count: u16) -> AppResult<Vec<u16>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.read_input_registers(address, count))
            .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("read_input")),
        };
        self.unwrap_response("读取输入寄存器", address, response)
    }

    async fn read_coils(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.read_coils(address, count)).await {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("read_coil")),
        };
        self.unwrap_response("读取线圈", address, response)
    }

    async fn read_discretes(&mut self, address: u16, count: u16) -> AppResult<Vec<bool>> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.read_discrete_inputs(address, count))
            .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("read_discrete")),
        };
        self.unwrap_response("读取离散输入", address, response)
    }

    async fn write_register(&mut self, address: u16, value: u16) -> AppResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.write_single_register(address, value))
            .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("write_register")),
        };
        self.unwrap_response("写入单个寄存器", address, response)
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> AppResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(
            request_timeout,
            ctx.write_multiple_registers(address, values),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("write_registers")),
        };
        self.unwrap_response("写入多个寄存器", address, response)
    }

    async fn write_coil(&mut self, address: u16, value: bool) -> AppResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.write_single_coil(address, value)).await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("write_coil")),
        };
        self.unwrap_response("写入线圈", address, response)
    }

    async fn write_coils(&mut self, address: u16, values: &[bool]) -> AppResult<()> {
        let request_timeout = self.request_timeout;
        let ctx = self.context_mut()?;
        let response = match timeout(request_timeout, ctx.write_multiple_coils(address, values))
            .await
        {
            Ok(r) => r,
            Err(_) => return Err(self.on_timeout("write_coils")),
        };
        self.unwrap_response("写入多个线圈", address, response)
    }
}

/// 生产用TCP链路工厂
#[derive(Debug, Default)]
pub struct TcpLinkFactory;

impl LinkFactory for TcpLinkFactory {
    fn create(&self, config: &PlcConfig) -> Box<dyn ModbusLink> {
        Box::new(TcpModbusLink::new(config))
    }
}
