use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// - 文件层: JSON格式,按天轮转 (`share-parser.2025-10-05.log`),非阻塞写入
/// - 控制台层: 人类可读格式
/// - 级别由 `RUST_LOG` 控制,默认 `info`
///
/// # 参数
/// - `log_dir`: 日志目录,不存在时自动创建
///
/// # 返回值
/// 文件写入器的 guard,必须由调用者持有到进程退出,drop 后日志不再落盘
///
/// # 示例日志
/// ```json
/// {
///   "timestamp": "2025-10-05T10:30:45.123Z",
///   "level": "INFO",
///   "target": "share_parser::services::dispatcher",
///   "fields": {
///     "event_type": "Parsed",
///     "platform": "bilibili",
///     "resource_id": "BV17x411w7KC"
///   }
/// }
/// ```
pub fn init(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("share-parser")
        .filename_suffix("log")
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    // 输出到 stderr,stdout 留给命令行的解析结果
    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(guard)
}

/// 日志宏辅助模块
pub mod macros {
    /// 记录业务事件
    ///
    /// 字段语法与 `tracing::info!` 相同:
    /// ```no_run
    /// use share_parser::log_event;
    /// let platform = "bilibili";
    /// log_event!("LoginConfirmed", platform = %platform, flow_id = "flow_1");
    /// ```
    #[macro_export]
    macro_rules! log_event {
        ($event_type:expr, $($fields:tt)+) => {
            tracing::info!(event_type = $event_type, $($fields)+)
        };
    }

    /// 记录错误事件
    ///
    /// ```no_run
    /// use share_parser::log_error;
    /// log_error!("LoginPollFailed", flow_id = "flow_1", error = "connection timeout");
    /// ```
    #[macro_export]
    macro_rules! log_error {
        ($event_type:expr, $($fields:tt)+) => {
            tracing::error!(event_type = $event_type, $($fields)+)
        };
    }
}
