pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::info;

/// 安装Prometheus导出器，在指定地址提供 `/metrics`
///
/// 需在Tokio运行时内调用。
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus导出器失败")?;

    info!("Prometheus指标导出器已启动: {}", addr);
    Ok(())
}
