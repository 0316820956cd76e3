// 进程内远程存储实现 - 用于演示和测试，语义与 SQL 实现一致

use super::{RemoteStore, VersionedDocument};
use crate::models::FieldUpdate;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryRepository {
    documents: RwLock<HashMap<String, VersionedDocument>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前文档数量
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

/// 沿路径写入值，缺失的中间对象会被创建
fn set_path(root: &mut Value, path: &[String], value: Value) -> Result<()> {
    let (last, parents) = path
        .split_last()
        .ok_or_else(|| anyhow!("字段路径不能为空"))?;

    let mut current = root;
    for segment in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| anyhow!("路径 {} 不是对象", segment))?;
        current = object
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = current
        .as_object_mut()
        .ok_or_else(|| anyhow!("路径 {} 的父节点不是对象", last))?;
    object.insert(last.clone(), value);
    Ok(())
}

#[async_trait]
impl RemoteStore for MemoryRepository {
    async fn get_versioned(&self, id: &str) -> Result<Option<VersionedDocument>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn set(&self, id: &str, document: &Value) -> Result<()> {
        let mut documents = self.documents.write().await;
        let revision = documents.get(id).map(|doc| doc.revision + 1).unwrap_or(1);
        documents.insert(
            id.to_string(),
            VersionedDocument {
                document: document.clone(),
                revision,
            },
        );
        Ok(())
    }

    async fn set_if_revision(
        &self,
        id: &str,
        document: &Value,
        expected: Option<i64>,
    ) -> Result<bool> {
        let mut documents = self.documents.write().await;
        let current = documents.get(id).map(|doc| doc.revision);
        if current != expected {
            return Ok(false);
        }
        documents.insert(
            id.to_string(),
            VersionedDocument {
                document: document.clone(),
                revision: current.unwrap_or(0) + 1,
            },
        );
        Ok(true)
    }

    async fn update_fields(&self, id: &str, updates: &[FieldUpdate]) -> Result<bool> {
        let mut documents = self.documents.write().await;
        let Some(existing) = documents.get_mut(id) else {
            return Ok(false);
        };

        let mut document = existing.document.clone();
        for update in updates {
            set_path(&mut document, &update.path, update.value.clone())?;
        }
        existing.document = document;
        existing.revision += 1;
        Ok(true)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_fields_creates_nested_objects() {
        let repo = MemoryRepository::new();
        repo.set("d1", &json!({"stats": {}})).await.unwrap();

        let updated = repo
            .update_fields(
                "d1",
                &[FieldUpdate::new(&["profile", "displayName"], json!("Mika"))],
            )
            .await
            .unwrap();
        assert!(updated);

        let doc = repo.get_versioned("d1").await.unwrap().unwrap();
        assert_eq!(doc.document["profile"]["displayName"], json!("Mika"));
        assert_eq!(doc.revision, 2);
    }

    #[tokio::test]
    async fn test_set_if_revision_matches_sql_semantics() {
        let repo = MemoryRepository::new();
        assert!(repo.set_if_revision("d1", &json!({}), None).await.unwrap());
        assert!(!repo.set_if_revision("d1", &json!({}), None).await.unwrap());
        assert!(repo.set_if_revision("d1", &json!({}), Some(1)).await.unwrap());
        assert!(!repo.set_if_revision("d1", &json!({}), Some(1)).await.unwrap());
    }
}
