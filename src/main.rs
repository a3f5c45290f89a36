//! 网关服务运行时入口
//!
//! 启动顺序：日志 → 设置 → 设备目录 → 流程定义 → 机群初始化；
//! 之后等待退出信号并并发关闭所有连接。对外API表面（HTTP等）
//! 由上层进程包装接入，不在本二进制内。

use std::sync::Arc;

use log::{error, info, warn};

use tag_gateway::config::{DeviceCatalog, Settings};
use tag_gateway::logging;
use tag_gateway::services::{ConnectionManager, ProcedureLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logging::init_logging(&settings.log_level);

    info!("启动标签网关服务");

    let catalog = Arc::new(DeviceCatalog::load(&settings)?);

    let mut loader = ProcedureLoader::new(Arc::clone(&catalog));
    match loader.load_dir(&settings.procedure_dir) {
        Ok(count) => info!("流程定义就绪: {} 个", count),
        Err(e) => {
            error!("流程定义加载失败: {}", e);
            return Err(e.into());
        }
    }

    let manager = Arc::new(ConnectionManager::new());
    let failures = manager.initialize(catalog.plc_configs()).await;
    for (plc_id, e) in &failures {
        warn!("PLC {} 初始化失败: {}", plc_id, e);
    }

    info!(
        "网关就绪: {} 台PLC在线管理中 (Ctrl-C 退出)",
        manager.plc_ids().await.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，正在关闭");

    manager.shutdown().await;
    info!("网关已退出");
    Ok(())
}
