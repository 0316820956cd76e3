// 作品集管理 - 设计师端的作品与资料维护
//
// 所有修改都经过持久化网关；远程写入失败时返回 false，本地镜像已保存。

use crate::error::PersistenceError;
use crate::models::{
    NewPortfolioEntry, PortfolioEntry, PortfolioEntryPatch, ProfilePatch, RecordPatch,
    SettingsPatch,
};
use crate::storage::{PersistenceGateway, WriteReport};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_ENTRY_NAME: usize = 120;

pub struct PortfolioManager {
    gateway: Arc<PersistenceGateway>,
}

fn validate_name(name: &str) -> Result<(), PersistenceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PersistenceError::Validation("作品名称不能为空".to_string()));
    }
    if name.chars().count() > MAX_ENTRY_NAME {
        return Err(PersistenceError::Validation(format!(
            "作品名称超过 {} 个字符",
            MAX_ENTRY_NAME
        )));
    }
    Ok(())
}

impl PortfolioManager {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// 作品列表
    pub async fn list(&self, designer_id: &str) -> Vec<PortfolioEntry> {
        self.gateway.read(designer_id).await.portfolio
    }

    /// 添加作品，返回新条目和远程是否保存成功
    pub async fn add_entry(
        &self,
        designer_id: &str,
        entry: NewPortfolioEntry,
    ) -> Result<(PortfolioEntry, bool), PersistenceError> {
        validate_name(&entry.name)?;
        let url = entry.url.trim();
        let supported = ["https://", "http://", "data:image/"];
        if !supported.iter().any(|prefix| url.starts_with(prefix)) {
            return Err(PersistenceError::Validation(format!(
                "作品图片地址无效: {}",
                entry.url
            )));
        }

        let now = Utc::now();
        let created = PortfolioEntry {
            id: Uuid::new_v4().to_string(),
            name: entry.name.trim().to_string(),
            url: url.to_string(),
            gender: entry.gender,
            category_fields: entry.category_fields,
            created_at: now,
            updated_at: now,
        };

        let mut record = self.gateway.read(designer_id).await;
        record.portfolio.push(created.clone());
        record.touch(now);

        let report = self.gateway.write(designer_id, &record).await;
        info!("设计师 {} 添加作品 {}", designer_id, created.id);
        Ok((created, self.saved(designer_id, "add_entry", &report)))
    }

    /// 修改作品名称、性别与分类（图片不可修改）
    ///
    /// 条目不存在时返回 false
    pub async fn update_entry(
        &self,
        designer_id: &str,
        entry_id: &str,
        patch: PortfolioEntryPatch,
    ) -> Result<bool, PersistenceError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        let mut record = self.gateway.read(designer_id).await;
        let now = Utc::now();
        let Some(entry) = record.portfolio.iter_mut().find(|e| e.id == entry_id) else {
            warn!("设计师 {} 的作品 {} 不存在", designer_id, entry_id);
            return Ok(false);
        };

        if let Some(name) = patch.name {
            entry.name = name.trim().to_string();
        }
        if let Some(gender) = patch.gender {
            entry.gender = gender;
        }
        if let Some(fields) = patch.category_fields {
            entry.category_fields = fields;
        }
        entry.updated_at = now;
        record.touch(now);

        let report = self.gateway.write(designer_id, &record).await;
        Ok(self.saved(designer_id, "update_entry", &report))
    }

    /// 删除作品；条目不存在时返回 false
    pub async fn remove_entry(&self, designer_id: &str, entry_id: &str) -> bool {
        let mut record = self.gateway.read(designer_id).await;
        let before = record.portfolio.len();
        record.portfolio.retain(|e| e.id != entry_id);
        if record.portfolio.len() == before {
            return false;
        }
        record.touch(Utc::now());

        let report = self.gateway.write(designer_id, &record).await;
        self.saved(designer_id, "remove_entry", &report)
    }

    pub async fn set_reservation_url(
        &self,
        designer_id: &str,
        url: &str,
    ) -> Result<bool, PersistenceError> {
        let patch = RecordPatch::ReservationUrl {
            url: url.to_string(),
        };
        self.patch(designer_id, "set_reservation_url", &patch).await
    }

    pub async fn update_profile(
        &self,
        designer_id: &str,
        patch: ProfilePatch,
    ) -> Result<bool, PersistenceError> {
        self.patch(designer_id, "update_profile", &RecordPatch::Profile(patch))
            .await
    }

    pub async fn update_settings(
        &self,
        designer_id: &str,
        patch: SettingsPatch,
    ) -> Result<bool, PersistenceError> {
        self.patch(designer_id, "update_settings", &RecordPatch::Settings(patch))
            .await
    }

    async fn patch(
        &self,
        designer_id: &str,
        operation: &str,
        patch: &RecordPatch,
    ) -> Result<bool, PersistenceError> {
        let report = self.gateway.apply_patch(designer_id, patch).await?;
        Ok(self.saved(designer_id, operation, &report))
    }

    fn saved(&self, designer_id: &str, operation: &str, report: &WriteReport) -> bool {
        if !report.success() {
            warn!(
                "{} 未同步到远程 (设计师 {}): {:?}",
                operation,
                designer_id,
                report.remote.error()
            );
        }
        report.success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use crate::storage::{LocalMirror, RemoteStore};
    use crate::testing::{memory_gateway, FlakyRemote};
    use std::collections::BTreeMap;

    fn new_entry(name: &str) -> NewPortfolioEntry {
        NewPortfolioEntry {
            name: name.to_string(),
            url: format!("https://img/{}.jpg", name),
            gender: Gender::Female,
            category_fields: BTreeMap::from([("length".to_string(), "short".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_add_update_remove_entry() {
        let (gateway, _, _) = memory_gateway();
        let manager = PortfolioManager::new(Arc::new(gateway));

        let (entry, saved) = manager.add_entry("d1", new_entry("bob")).await.unwrap();
        assert!(saved);
        assert_eq!(manager.list("d1").await, vec![entry.clone()]);

        let updated = manager
            .update_entry(
                "d1",
                &entry.id,
                PortfolioEntryPatch {
                    name: Some("French bob".to_string()),
                    gender: Some(Gender::Unisex),
                    category_fields: None,
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let listed = manager.list("d1").await;
        assert_eq!(listed[0].name, "French bob");
        assert_eq!(listed[0].gender, Gender::Unisex);
        assert_eq!(listed[0].url, entry.url);
        assert_eq!(listed[0].category_fields["length"], "short");

        assert!(manager.remove_entry("d1", &entry.id).await);
        assert!(!manager.remove_entry("d1", &entry.id).await);
        assert!(manager.list("d1").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_entries_are_rejected() {
        let (gateway, _, _) = memory_gateway();
        let manager = PortfolioManager::new(Arc::new(gateway));

        let mut blank = new_entry("x");
        blank.name = "  ".to_string();
        assert!(matches!(
            manager.add_entry("d1", blank).await,
            Err(PersistenceError::Validation(_))
        ));

        let mut bad_url = new_entry("x");
        bad_url.url = "file:///etc/passwd".to_string();
        assert!(manager.add_entry("d1", bad_url).await.is_err());

        let missing = manager
            .update_entry("d1", "nope", PortfolioEntryPatch::default())
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_remote_failure_returns_false_but_keeps_local() {
        let flaky = Arc::new(FlakyRemote::new());
        flaky.set_available(false);
        let local = Arc::new(LocalMirror::in_memory("designers"));
        let manager =
            PortfolioManager::new(Arc::new(PersistenceGateway::new(flaky, local.clone())));

        let (entry, saved) = manager.add_entry("d1", new_entry("bob")).await.unwrap();
        assert!(!saved);
        assert_eq!(local.get("d1").unwrap().portfolio[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_profile_and_reservation_patches() {
        let (gateway, remote, _) = memory_gateway();
        let manager = PortfolioManager::new(Arc::new(gateway));
        manager.add_entry("d1", new_entry("bob")).await.unwrap();

        assert!(manager
            .set_reservation_url("d1", "https://book.example/aki")
            .await
            .unwrap());
        assert!(manager
            .update_profile(
                "d1",
                ProfilePatch {
                    salon_name: Some("Studio Aki".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap());
        assert!(manager
            .update_settings(
                "d1",
                SettingsPatch {
                    show_trial_gallery: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap());
        assert!(manager.set_reservation_url("d1", "not a url").await.is_err());

        let doc = remote.get("d1").await.unwrap().unwrap();
        assert_eq!(doc["reservationUrl"], "https://book.example/aki");
        assert_eq!(doc["profile"]["salonName"], "Studio Aki");
        assert_eq!(doc["settings"]["showTrialGallery"], false);
        assert_eq!(doc["portfolio"].as_array().unwrap().len(), 1);
    }
}
