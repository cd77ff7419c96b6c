use anyhow::Result;
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the configured level. When a log file is configured
/// the returned guard must be held until exit, otherwise buffered lines are lost.
pub fn init_logging(config: &LoggingConfig, service_name: &str) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&format!("{}={}", service_name, config.level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = if config.json_format {
        fmt::layer().json().with_span_events(FmtSpan::CLOSE).boxed()
    } else {
        fmt::layer().with_span_events(FmtSpan::CLOSE).boxed()
    };

    // 配置了日志文件时追加按天滚动的文件输出
    let (file_layer, guard) = match &config.file_path {
        Some(file_path) => {
            let path = Path::new(file_path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_appender = RollingFileAppender::new(
                Rotation::DAILY,
                dir,
                path.file_name().unwrap_or_default(),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
            let layer = if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging initialized with level: {}", config.level);

    Ok(guard)
}
