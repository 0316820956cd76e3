// 配置管理 - SalonConfig 的读取与持久化

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::logger::LogConfig;
use crate::services::ServicesConfig;
use crate::storage::StorageConfig;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

/// 配置更新：None 表示保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub storage: Option<StorageConfig>,
    pub services: Option<ServicesConfig>,
    pub logging: Option<LogConfig>,
}

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<SalonConfig>,
}

impl SettingsManager {
    /// 读取配置文件，不存在时写入默认配置
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => match serde_json::from_slice::<SalonConfig>(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    warn!("配置文件无法解析，使用默认配置 {:?}: {}", path, e);
                    SalonConfig::default()
                }
            },
            _ => {
                let default = SalonConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> SalonConfig {
        self.data.read().await.clone()
    }

    pub async fn update(&self, update: ConfigUpdate) -> Result<SalonConfig> {
        let mut config = self.data.write().await;

        if let Some(storage) = update.storage {
            config.storage = storage;
        }
        if let Some(services) = update.services {
            config.services = services;
        }
        if let Some(logging) = update.logging {
            config.logging = logging;
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &SalonConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
