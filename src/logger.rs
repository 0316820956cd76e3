// 日志初始化 - 控制台 + 按天轮转的日志文件

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志文件目录，为空时只输出到控制台
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// trace / debug / info / warn / error
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 无法识别的级别按 info 处理
    pub fn max_level(&self) -> Level {
        self.level.trim().parse().unwrap_or(Level::INFO)
    }
}

/// 初始化全局日志
///
/// 返回的 guard 需要在程序退出前一直持有，否则文件日志会丢失尾部内容
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            // 配置日志输出到文件（每天轮转）
            let file_appender = tracing_appender::rolling::daily(dir, "salon-tryon.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                BoxMakeWriter::new(std::io::stdout.and(non_blocking)),
                Some(guard),
            )
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    // 使用本地时区
    let timer = LocalTime::new(time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    )?);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.max_level())
        .with_writer(writer)
        .with_timer(timer)
        .with_ansi(cfg!(debug_assertions))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(dir) = &config.dir {
        tracing::info!("日志文件位置: {:?}", dir);
    }
    Ok(guard)
}
