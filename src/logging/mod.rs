//! 日志初始化模块
//!
//! 基于 env_logger 的进程级日志配置：级别来自设置文件，
//! `RUST_LOG` 环境变量优先。结构化后端与文件轮转不在网关范围内。

use once_cell::sync::OnceCell;

static LOG_INIT: OnceCell<()> = OnceCell::new();

/// 初始化全局日志（幂等；重复调用被忽略）
pub fn init_logging(level: &str) {
    LOG_INIT.get_or_init(|| {
        let filter = level
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info);

        let mut builder = env_logger::Builder::new();
        builder.filter_level(filter);
        // RUST_LOG 覆盖设置文件中的级别
        builder.parse_default_env();
        builder.format_timestamp_millis();
        let _ = builder.try_init();
    });
}
