// 存储模块 - 远程文档存储 + 本地镜像的双写抽象层

// 子模块
pub mod config;
pub mod gateway;
pub mod local;
pub mod repository;

// 重新导出主要类型
pub use config::{CounterMode, DatabaseConfig, StorageConfig};
pub use gateway::{
    strip_absent, PersistenceGateway, ReadSource, RecordSnapshot, SinkOutcome, WriteReport,
};
pub use local::LocalMirror;
pub use repository::{RemoteStore, VersionedDocument};

// 重新导出具体实现（可选，用于高级用法）
pub use repository::mariadb::MariaDbRepository;
pub use repository::memory::MemoryRepository;
pub use repository::sqlite::SqliteRepository;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// 根据配置创建远程存储
pub async fn connect_remote(
    config: &DatabaseConfig,
    collection: &str,
) -> Result<Arc<dyn RemoteStore>> {
    let store: Arc<dyn RemoteStore> = match config {
        DatabaseConfig::SQLite { db_path } => {
            Arc::new(SqliteRepository::new(db_path, collection).await?)
        }
        DatabaseConfig::MariaDB {
            host,
            port,
            database,
            username,
            password,
        } => Arc::new(
            MariaDbRepository::new(host, *port, database, username, password, collection).await?,
        ),
        DatabaseConfig::Memory => Arc::new(MemoryRepository::new()),
    };

    info!("远程存储已连接: {}", store.store_type());
    Ok(store)
}
