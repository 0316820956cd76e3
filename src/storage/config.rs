// 存储配置定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 远程存储配置类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatabaseConfig {
    /// SQLite 配置（单机部署）
    #[serde(rename = "sqlite")]
    SQLite {
        /// 数据库文件路径
        db_path: String,
    },
    /// MariaDB 配置
    #[serde(rename = "mariadb")]
    MariaDB {
        /// 主机地址
        host: String,
        /// 端口
        port: u16,
        /// 数据库名
        database: String,
        /// 用户名
        username: String,
        /// 密码
        password: String,
    },
    /// 进程内存储（演示与测试）
    #[serde(rename = "memory")]
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::SQLite {
            db_path: "data/salon-tryon.db".to_string(),
        }
    }
}

/// 计数器更新方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CounterMode {
    /// 整条记录读-改-写，多个标签页并发时后写者整体覆盖
    ReadModifyWrite,
    /// 基于远程版本号的乐观写入，冲突时重新读取并重放修改
    CompareAndSwap { max_attempts: u32 },
}

impl Default for CounterMode {
    fn default() -> Self {
        CounterMode::ReadModifyWrite
    }
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 远程存储
    #[serde(default)]
    pub remote: DatabaseConfig,
    /// 本地镜像目录
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    /// 设计师集合键（本地与远程共用的命名空间）
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub counter_mode: CounterMode,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("data/mirror")
}

fn default_collection() -> String {
    "designers".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            remote: DatabaseConfig::default(),
            local_dir: default_local_dir(),
            collection: default_collection(),
            counter_mode: CounterMode::default(),
        }
    }
}
