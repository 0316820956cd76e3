// Repository 抽象层 - 定义远程文档存储接口
//
// 远程存储以 JSON 文档保存设计师记录，并维护一个单调递增的版本号，
// 供乐观写入（compare-and-swap）使用

pub mod mariadb;
pub mod memory;
pub mod sqlite;

use crate::models::FieldUpdate;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

/// 带版本号的文档
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub document: Value,
    pub revision: i64,
}

/// 远程存储接口 - 所有远程实现必须实现此 trait
///
/// 文档不存在不是错误（返回 None / false），只有传输或鉴权失败才返回 Err。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 读取文档
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.get_versioned(id).await?.map(|doc| doc.document))
    }

    /// 读取文档及其版本号
    async fn get_versioned(&self, id: &str) -> Result<Option<VersionedDocument>>;

    /// 整体写入（不存在则创建），版本号加一
    async fn set(&self, id: &str, document: &Value) -> Result<()>;

    /// 仅当版本号匹配时写入
    ///
    /// `expected` 为 None 时要求文档尚不存在。返回是否写入成功。
    async fn set_if_revision(&self, id: &str, document: &Value, expected: Option<i64>)
        -> Result<bool>;

    /// 按路径更新字段，文档不存在时返回 false
    async fn update_fields(&self, id: &str, updates: &[FieldUpdate]) -> Result<bool>;

    /// 连通性检查
    async fn health_check(&self) -> Result<()>;

    /// 关闭连接
    async fn close(&self) {}

    /// 获取存储类型标识
    fn store_type(&self) -> &str;
}

/// 将路径段转换为 JSON path：`$."stats"."styleViews"."https://..."`
///
/// 每段都加引号，键中的 '.' 不会被当作分隔符
pub(crate) fn json_path(segments: &[String]) -> Result<String> {
    if segments.is_empty() {
        return Err(anyhow!("字段路径不能为空"));
    }
    let mut path = String::from("$");
    for segment in segments {
        if segment.is_empty() || segment.contains('"') {
            return Err(anyhow!("无效的字段路径段: {:?}", segment));
        }
        path.push_str(".\"");
        path.push_str(segment);
        path.push('"');
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_path_quotes_segments() {
        let path = json_path(&[
            "stats".to_string(),
            "styleViews".to_string(),
            "https://cdn.example.com/a.jpg".to_string(),
        ])
        .unwrap();
        assert_eq!(
            path,
            r#"$."stats"."styleViews"."https://cdn.example.com/a.jpg""#
        );
    }

    #[test]
    fn test_json_path_rejects_bad_segments() {
        assert!(json_path(&[]).is_err());
        assert!(json_path(&["a\"b".to_string()]).is_err());
        assert!(json_path(&["".to_string()]).is_err());
    }
}
