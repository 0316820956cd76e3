// SQLite 远程存储实现

use super::{json_path, RemoteStore, VersionedDocument};
use crate::models::FieldUpdate;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

/// SQLite 文档存储
pub struct SqliteRepository {
    pool: SqlitePool,
    collection: String,
}

impl SqliteRepository {
    /// 创建新的 SQLite 数据库连接
    pub async fn new(db_path: &str, collection: &str) -> Result<Self> {
        info!("初始化 SQLite 数据库: {} (集合: {})", db_path, collection);

        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        // 创建连接池
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .idle_timeout(std::time::Duration::from_secs(180))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await?;

        let repo = Self {
            pool,
            collection: collection.to_string(),
        };

        // 初始化表结构
        repo.initialize_tables().await?;

        Ok(repo)
    }

    /// 初始化表结构
    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS designer_documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        info!("SQLite 表初始化完成");
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for SqliteRepository {
    async fn get_versioned(&self, id: &str) -> Result<Option<VersionedDocument>> {
        let row = sqlx::query(
            "SELECT document, revision FROM designer_documents WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let text: String = row.try_get("document")?;
                let revision: i64 = row.try_get("revision")?;
                Ok(Some(VersionedDocument {
                    document: serde_json::from_str(&text)?,
                    revision,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, id: &str, document: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO designer_documents (collection, id, document, revision, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                document = excluded.document,
                revision = designer_documents.revision + 1,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&self.collection)
        .bind(id)
        .bind(document.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_if_revision(
        &self,
        id: &str,
        document: &Value,
        expected: Option<i64>,
    ) -> Result<bool> {
        let result = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO designer_documents (collection, id, document, revision, updated_at)
                    VALUES (?1, ?2, ?3, 1, ?4)
                    ON CONFLICT(collection, id) DO NOTHING
                "#,
                )
                .bind(&self.collection)
                .bind(id)
                .bind(document.to_string())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?
            }
            Some(revision) => {
                sqlx::query(
                    r#"
                    UPDATE designer_documents
                    SET document = ?, revision = revision + 1, updated_at = ?
                    WHERE collection = ? AND id = ? AND revision = ?
                "#,
                )
                .bind(document.to_string())
                .bind(Utc::now())
                .bind(&self.collection)
                .bind(id)
                .bind(revision)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn update_fields(&self, id: &str, updates: &[FieldUpdate]) -> Result<bool> {
        if updates.is_empty() {
            return Ok(self.get_versioned(id).await?.is_some());
        }

        let mut paths = Vec::with_capacity(updates.len());
        for update in updates {
            paths.push(json_path(&update.path)?);
        }
        let pairs = vec!["?, json(?)"; updates.len()].join(", ");
        let sql = format!(
            "UPDATE designer_documents SET document = json_set(document, {}), revision = revision + 1, updated_at = ? WHERE collection = ? AND id = ?",
            pairs
        );

        let mut query = sqlx::query(&sql);
        for (path, update) in paths.iter().zip(updates) {
            query = query.bind(path).bind(update.value.to_string());
        }
        let result = query
            .bind(Utc::now())
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn store_type(&self) -> &str {
        "sqlite"
    }
}
