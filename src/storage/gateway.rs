// 持久化网关 - 远程存储与本地镜像的统一读写入口
//
// 读：优先远程，失败时回退本地镜像；都没有数据时返回空记录。
// 写：本地镜像与远程是两个独立的写入目标，结果分别返回，远程失败不回滚本地。

use super::local::LocalMirror;
use super::repository::RemoteStore;
use crate::error::PersistenceError;
use crate::event_bus::{EventBus, SalonEvent};
use crate::models::{DesignerRecord, RecordPatch};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 读取结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Remote,
    Local,
    /// 两边都没有数据，返回的是空记录
    Empty,
}

/// 一次读取的快照
#[derive(Debug, Clone)]
pub struct RecordSnapshot {
    pub record: DesignerRecord,
    /// 远程文档的版本号（远程没有该文档时为 None）
    pub revision: Option<i64>,
    pub source: ReadSource,
    /// 本次读取时远程是否可达
    pub remote_reachable: bool,
}

/// 单个写入目标的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOutcome {
    Written,
    /// 未尝试写入（例如版本冲突时不更新本地镜像）
    Skipped,
    Failed(PersistenceError),
}

impl SinkOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SinkOutcome::Written)
    }

    pub fn error(&self) -> Option<&PersistenceError> {
        match self {
            SinkOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// 写入报告：两个目标分别报告
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    pub local: SinkOutcome,
    pub remote: SinkOutcome,
}

impl WriteReport {
    /// 对调用方的 success：以远程写入为准
    pub fn success(&self) -> bool {
        self.remote.is_written()
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self.remote,
            SinkOutcome::Failed(PersistenceError::Conflict { .. })
        )
    }
}

/// 递归删除值为 null 的字段（远程存储拒绝缺省字段）
///
/// 只删除对象成员；数组元素保持原样，但会继续向下清理
pub fn strip_absent(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_absent(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_absent(item);
            }
        }
        _ => {}
    }
}

/// 序列化为远程文档
fn remote_document(record: &DesignerRecord) -> Result<Value, PersistenceError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
    strip_absent(&mut value);
    Ok(value)
}

pub struct PersistenceGateway {
    remote: Arc<dyn RemoteStore>,
    local: Arc<LocalMirror>,
    events: Option<Arc<EventBus>>,
}

impl PersistenceGateway {
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<LocalMirror>) -> Self {
        info!(
            "持久化网关已创建: 远程={}, 本地集合={}",
            remote.store_type(),
            local.collection()
        );
        Self {
            remote,
            local,
            events: None,
        }
    }

    /// 回退时发布 PersistenceFallback 事件
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn remote_type(&self) -> &str {
        self.remote.store_type()
    }

    /// 读取记录（不会失败）
    pub async fn read(&self, id: &str) -> DesignerRecord {
        self.read_snapshot(id).await.record
    }

    /// 读取记录并带上来源和远程版本号
    pub async fn read_snapshot(&self, id: &str) -> RecordSnapshot {
        match self.remote.get_versioned(id).await {
            Ok(Some(doc)) => match serde_json::from_value::<DesignerRecord>(doc.document) {
                Ok(record) => RecordSnapshot {
                    record,
                    revision: Some(doc.revision),
                    source: ReadSource::Remote,
                    remote_reachable: true,
                },
                Err(e) => {
                    warn!("远程记录 {} 无法解析，改用本地镜像: {}", id, e);
                    self.local_snapshot(id, Some(doc.revision), true)
                }
            },
            // 远程没有数据时仍查看本地：本地可能领先于远程
            Ok(None) => self.local_snapshot(id, None, true),
            Err(e) => {
                warn!("远程读取失败，回退到本地镜像 ({}): {}", id, e);
                self.notify_fallback(id, "read", &e.to_string());
                self.local_snapshot(id, None, false)
            }
        }
    }

    fn local_snapshot(
        &self,
        id: &str,
        revision: Option<i64>,
        remote_reachable: bool,
    ) -> RecordSnapshot {
        match self.local.get(id) {
            Some(record) => RecordSnapshot {
                record,
                revision,
                source: ReadSource::Local,
                remote_reachable,
            },
            None => RecordSnapshot {
                record: DesignerRecord::empty(Utc::now()),
                revision,
                source: ReadSource::Empty,
                remote_reachable,
            },
        }
    }

    fn write_local(&self, id: &str, record: &DesignerRecord) -> SinkOutcome {
        match self.local.set(id, record) {
            Ok(()) => SinkOutcome::Written,
            Err(e) => {
                warn!("本地镜像写入失败 ({}): {}", id, e);
                SinkOutcome::Failed(PersistenceError::local(&e))
            }
        }
    }

    /// 只写本地镜像（乐观写入放弃重试时保留本次修改）
    pub fn mirror_local(&self, id: &str, record: &DesignerRecord) -> SinkOutcome {
        self.write_local(id, record)
    }

    /// 整条记录写入：先写本地镜像，再尝试远程
    pub async fn write(&self, id: &str, record: &DesignerRecord) -> WriteReport {
        let local = self.write_local(id, record);

        let remote = match remote_document(record) {
            Ok(document) => match self.remote.set(id, &document).await {
                Ok(()) => SinkOutcome::Written,
                Err(e) => {
                    warn!("远程写入失败，本地镜像已保留 ({}): {}", id, e);
                    self.notify_fallback(id, "write", &e.to_string());
                    SinkOutcome::Failed(PersistenceError::remote(&e))
                }
            },
            Err(e) => SinkOutcome::Failed(e),
        };

        debug!("写入 {} 完成: local={:?}, remote={:?}", id, local, remote);
        WriteReport { local, remote }
    }

    /// 乐观写入：只有远程版本仍为 `expected` 时才写入
    ///
    /// 冲突时两边都不写，由调用方决定重试或调用 `mirror_local`；
    /// 远程不可达时退化为普通写入（本地镜像照常更新）
    pub async fn write_if_revision(
        &self,
        id: &str,
        record: &DesignerRecord,
        expected: Option<i64>,
    ) -> WriteReport {
        let document = match remote_document(record) {
            Ok(document) => document,
            Err(e) => {
                return WriteReport {
                    local: SinkOutcome::Skipped,
                    remote: SinkOutcome::Failed(e),
                }
            }
        };

        match self.remote.set_if_revision(id, &document, expected).await {
            Ok(true) => WriteReport {
                local: self.write_local(id, record),
                remote: SinkOutcome::Written,
            },
            Ok(false) => {
                debug!("远程版本已变化 ({}), 期望 {:?}", id, expected);
                WriteReport {
                    local: SinkOutcome::Skipped,
                    remote: SinkOutcome::Failed(PersistenceError::Conflict { expected }),
                }
            }
            Err(e) => {
                warn!("远程乐观写入失败，本地镜像已保留 ({}): {}", id, e);
                self.notify_fallback(id, "write", &e.to_string());
                WriteReport {
                    local: self.write_local(id, record),
                    remote: SinkOutcome::Failed(PersistenceError::remote(&e)),
                }
            }
        }
    }

    /// 应用类型化补丁
    ///
    /// 远程已有文档时只更新补丁涉及的字段；否则写入完整记录
    pub async fn apply_patch(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<WriteReport, PersistenceError> {
        patch.validate().map_err(PersistenceError::Validation)?;

        let snapshot = self.read_snapshot(id).await;
        let mut record = snapshot.record;
        patch.apply_to(&mut record);
        record.touch(Utc::now());

        if snapshot.source != ReadSource::Remote {
            return Ok(self.write(id, &record).await);
        }

        let mut updates = patch
            .field_updates(&record)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        for update in updates.iter_mut() {
            strip_absent(&mut update.value);
        }

        let local = self.write_local(id, &record);
        let remote = match self.remote.update_fields(id, &updates).await {
            Ok(true) => SinkOutcome::Written,
            Ok(false) => {
                // 读取之后文档被删除，写入完整记录
                let report = self.write(id, &record).await;
                return Ok(WriteReport {
                    local,
                    remote: report.remote,
                });
            }
            Err(e) => {
                warn!("远程字段更新失败，本地镜像已保留 ({}): {}", id, e);
                self.notify_fallback(id, "update_fields", &e.to_string());
                SinkOutcome::Failed(PersistenceError::remote(&e))
            }
        };

        Ok(WriteReport { local, remote })
    }

    /// 远程连通性
    pub async fn remote_healthy(&self) -> bool {
        match self.remote.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("远程存储健康检查失败: {}", e);
                false
            }
        }
    }

    /// 关闭远程连接
    pub async fn close(&self) {
        self.remote.close().await;
    }

    fn notify_fallback(&self, id: &str, operation: &str, reason: &str) {
        if let Some(events) = &self.events {
            events.publish(SalonEvent::PersistenceFallback {
                designer_id: id.to_string(),
                operation: operation.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProfilePatch, RecordPatch};
    use crate::testing::{memory_gateway, FlakyRemote};
    use serde_json::json;

    #[test]
    fn test_strip_absent_removes_nested_nulls() {
        let mut value = json!({
            "reservationUrl": null,
            "profile": {"displayName": "Aki", "bio": null},
            "portfolio": [{"id": "p1", "extra": null}, null],
            "stats": {"styleViews": {}, "trialResults": []}
        });
        strip_absent(&mut value);

        assert_eq!(
            value,
            json!({
                "profile": {"displayName": "Aki"},
                "portfolio": [{"id": "p1"}, null],
                "stats": {"styleViews": {}, "trialResults": []}
            })
        );
    }

    #[tokio::test]
    async fn test_read_returns_empty_record_when_nothing_stored() {
        let (gateway, _, _) = memory_gateway();
        let snapshot = gateway.read_snapshot("new-designer").await;

        assert_eq!(snapshot.source, ReadSource::Empty);
        assert!(snapshot.remote_reachable);
        assert_eq!(snapshot.record.stats.visits, 0);
        assert!(snapshot.record.portfolio.is_empty());
    }

    #[tokio::test]
    async fn test_write_strips_nulls_for_remote_only() {
        let (gateway, remote, local) = memory_gateway();
        let record = DesignerRecord::empty(Utc::now());

        let report = gateway.write("d1", &record).await;
        assert!(report.success());
        assert!(report.local.is_written());

        let doc = remote.get("d1").await.unwrap().unwrap();
        assert!(doc.get("reservationUrl").is_none());
        assert!(doc.get("profile").is_none());
        assert!(local.get("d1").is_some());
    }

    #[tokio::test]
    async fn test_remote_outage_falls_back_to_local() {
        let flaky = Arc::new(FlakyRemote::new());
        let local = Arc::new(LocalMirror::in_memory("designers"));
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();
        let gateway = PersistenceGateway::new(flaky.clone(), local.clone()).with_events(bus);

        let mut record = DesignerRecord::empty(Utc::now());
        record.stats.visits = 5;
        assert!(gateway.write("d1", &record).await.success());

        flaky.set_available(false);
        let mut newer = record.clone();
        newer.stats.visits = 6;
        let report = gateway.write("d1", &newer).await;

        // 远程失败：success=false，本地镜像不回滚
        assert!(!report.success());
        assert!(report.local.is_written());
        assert!(matches!(
            report.remote.error(),
            Some(PersistenceError::Remote(_))
        ));

        let snapshot = gateway.read_snapshot("d1").await;
        assert_eq!(snapshot.source, ReadSource::Local);
        assert!(!snapshot.remote_reachable);
        assert_eq!(snapshot.record.stats.visits, 6);

        let event = events.try_recv().unwrap();
        assert!(matches!(event, SalonEvent::PersistenceFallback { .. }));

        // 远程恢复后读到的是远程（落后的）数据
        flaky.set_available(true);
        assert_eq!(gateway.read("d1").await.stats.visits, 5);
    }

    #[tokio::test]
    async fn test_write_if_revision_reports_conflict() {
        let (gateway, _, local) = memory_gateway();
        let record = DesignerRecord::empty(Utc::now());

        let first = gateway.write_if_revision("d1", &record, None).await;
        assert!(first.success());

        let stale = gateway.write_if_revision("d1", &record, None).await;
        assert!(stale.is_conflict());
        assert_eq!(stale.local, SinkOutcome::Skipped);
        assert!(local.get("d1").is_some());

        let snapshot = gateway.read_snapshot("d1").await;
        assert_eq!(snapshot.revision, Some(1));
        assert!(gateway
            .write_if_revision("d1", &snapshot.record, snapshot.revision)
            .await
            .success());
    }

    #[tokio::test]
    async fn test_apply_patch_updates_fields_without_touching_stats() {
        let (gateway, remote, _) = memory_gateway();
        let mut record = DesignerRecord::empty(Utc::now());
        record.stats.visits = 11;
        gateway.write("d1", &record).await;

        let patch = RecordPatch::Profile(ProfilePatch {
            display_name: Some("Rin".to_string()),
            ..Default::default()
        });
        let report = gateway.apply_patch("d1", &patch).await.unwrap();
        assert!(report.success());

        let doc = remote.get("d1").await.unwrap().unwrap();
        assert_eq!(doc["profile"]["displayName"], json!("Rin"));
        // 补丁中未设置的字段不会以 null 写入远程
        assert!(doc["profile"].get("bio").is_none());
        assert_eq!(doc["stats"]["visits"], json!(11));
    }

    #[tokio::test]
    async fn test_apply_patch_rejects_invalid_input_before_writing() {
        let (gateway, remote, local) = memory_gateway();
        let patch = RecordPatch::ReservationUrl {
            url: "ftp://example".to_string(),
        };

        let err = gateway.apply_patch("d1", &patch).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
        assert_eq!(remote.len().await, 0);
        assert!(local.get("d1").is_none());
    }
}
