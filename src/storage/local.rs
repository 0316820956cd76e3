// 本地镜像存储 - 始终可用的设计师记录副本
//
// 每个集合一个 JSON 文件（<dir>/<collection>.json），内容为 id -> 记录 的对象。
// 读写都是同步的：数据常驻内存，写入时整体落盘（临时文件 + rename）。

use crate::models::DesignerRecord;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

pub struct LocalMirror {
    collection: String,
    /// None 表示仅保存在内存中
    path: Option<PathBuf>,
    data: RwLock<Map<String, Value>>,
}

impl LocalMirror {
    /// 打开（或创建）集合文件
    pub fn open(dir: impl AsRef<Path>, collection: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", collection));

        let data = match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    // 文件损坏时从空镜像开始，远程仍是权威数据
                    warn!("本地镜像文件无法解析，将重新创建 {:?}: {}", path, e);
                    Map::new()
                }
            },
            Ok(_) => Map::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        info!("本地镜像已打开: {:?} ({} 条记录)", path, data.len());

        Ok(Self {
            collection: collection.to_string(),
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// 不落盘的镜像
    pub fn in_memory(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            path: None,
            data: RwLock::new(Map::new()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// 读取记录；条目损坏视为不存在
    pub fn get(&self, id: &str) -> Option<DesignerRecord> {
        let value = match self.data.read() {
            Ok(data) => data.get(id)?.clone(),
            Err(_) => {
                warn!("本地镜像锁已损坏，无法读取记录 {}", id);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("本地镜像中的记录 {} 无法解析: {}", id, e);
                None
            }
        }
    }

    /// 写入记录并落盘；落盘失败时内存中的数据回滚
    pub fn set(&self, id: &str, record: &DesignerRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow!("本地镜像锁已损坏"))?;
        let previous = data.insert(id.to_string(), value);

        if let Some(path) = &self.path {
            if let Err(e) = Self::persist(path, &data) {
                match previous {
                    Some(old) => data.insert(id.to_string(), old),
                    None => data.remove(id),
                };
                return Err(e);
            }
        }
        Ok(())
    }

    fn persist(path: &Path, data: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
