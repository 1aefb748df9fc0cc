//! Tracing setup: a stdout layer filtered through `RUST_LOG`, and an
//! optional daily-rolling JSON file layer for deployments that keep logs.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const LOG_FILE_PREFIX: &str = "tutor-backend";
const MAX_LOG_FILES: usize = 30;

/// Install the global subscriber. `file_log_dir` enables the file layer;
/// pass `None` to log to stdout only.
pub fn init_tracing(default_level: &str, file_log_dir: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = file_log_dir.map(|dir| {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(dir)
            .expect("Failed to create rolling file appender");
        fmt::layer().with_writer(appender).with_ansi(false).json()
    });

    let result = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();

    // 测试进程里全局 subscriber 往往已被先跑的用例注册，重复初始化直接忽略；
    // 除此之外的失败属于日志配置错误，应在启动阶段终止。
    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            panic!("Failed to initialize tracing: {e}");
        }
    }
}
