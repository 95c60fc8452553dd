//! 可观测性：tracing-subscriber 初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局 subscriber。默认级别为 `default_level`，RUST_LOG 可覆盖
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
