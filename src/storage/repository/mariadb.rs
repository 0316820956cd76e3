// MariaDB 远程存储实现

use super::{json_path, RemoteStore, VersionedDocument};
use crate::models::FieldUpdate;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tracing::info;

/// MariaDB 文档存储
///
/// 文档列使用 LONGTEXT 而不是 JSON 类型，JSON 类型会重排对象键的顺序
pub struct MariaDbRepository {
    pool: MySqlPool,
    collection: String,
}

impl MariaDbRepository {
    /// 创建新的 MariaDB 数据库连接
    pub async fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        collection: &str,
    ) -> Result<Self> {
        info!(
            "初始化 MariaDB 数据库: {}@{}:{}/{} (集合: {})",
            username, host, port, database, collection
        );

        // 先连接到服务器（不指定数据库），检查并创建数据库
        let server_url = format!(
            "mysql://{}:{}@{}:{}?connect_timeout=30",
            username, password, host, port
        );

        info!("连接到 MariaDB 服务器检查数据库是否存在...");
        let server_pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&server_url)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "连接 MariaDB 服务器失败 ({}:{}): {}\n\n请检查：\n1. MariaDB 服务是否已启动\n2. 网络连接是否正常\n3. 防火墙是否阻止了端口 {}\n4. 主机地址和端口是否正确",
                    host, port, e, port
                )
            })?;

        let db_exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(database)
        .fetch_one(&server_pool)
        .await?;

        if db_exists == 0 {
            info!("数据库 '{}' 不存在，正在创建...", database);
            sqlx::query(&format!(
                "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
                database
            ))
            .execute(&server_pool)
            .await?;
            info!("数据库 '{}' 创建成功", database);
        }

        server_pool.close().await;

        let connection_url = format!(
            "mysql://{}:{}@{}:{}/{}?connect_timeout=30",
            username, password, host, port, database
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .idle_timeout(std::time::Duration::from_secs(180))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&connection_url)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "创建 MariaDB 连接池失败 ({}:{}/{}): {}",
                    host,
                    port,
                    database,
                    e
                )
            })?;

        info!("MariaDB 连接池创建成功");

        let repo = Self {
            pool,
            collection: collection.to_string(),
        };
        repo.initialize_tables().await?;

        Ok(repo)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS designer_documents (
                collection VARCHAR(128) NOT NULL,
                id VARCHAR(191) NOT NULL,
                document LONGTEXT NOT NULL,
                revision BIGINT NOT NULL DEFAULT 1,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id)
            ) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci
        "#,
        )
        .execute(&self.pool)
        .await?;

        info!("MariaDB 表初始化完成");
        Ok(())
    }
}

/// 生成按路径局部更新的语句，每个字段占两个占位符（路径、JSON 文本）
fn json_set_sql(count: usize) -> String {
    // JSON_EXTRACT(?, '$') 把绑定的文本当作 JSON 值插入，而不是字符串
    let pairs = vec!["?, JSON_EXTRACT(?, '$')"; count].join(", ");
    format!(
        "UPDATE designer_documents SET document = JSON_SET(document, {}), revision = revision + 1, updated_at = ? WHERE collection = ? AND id = ?",
        pairs
    )
}

#[async_trait]
impl RemoteStore for MariaDbRepository {
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
            VALUES (?, ?, ?, 1, ?)
            ON DUPLICATE KEY UPDATE
                document = VALUES(document),
                revision = revision + 1,
                updated_at = VALUES(updated_at)
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
                    INSERT IGNORE INTO designer_documents (collection, id, document, revision, updated_at)
                    VALUES (?, ?, ?, 1, ?)
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
        let sql = json_set_sql(updates.len());

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
        "mariadb"
    }
}
