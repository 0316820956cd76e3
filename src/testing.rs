// 测试辅助 - 可编排的外部服务与远程存储替身

use crate::models::FieldUpdate;
use crate::services::{
    BookingLinkOpener, CompositeGenerationService, FacePhoto, ServiceError,
    StyleDescriptionService,
};
use crate::storage::{
    LocalMirror, MemoryRepository, PersistenceGateway, RemoteStore, VersionedDocument,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Barrier, Notify};

/// 只有 PNG 文件头的最小照片
pub(crate) fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D]
}

/// 进程内远程存储 + 内存镜像
pub(crate) fn memory_gateway() -> (PersistenceGateway, Arc<MemoryRepository>, Arc<LocalMirror>) {
    let remote = Arc::new(MemoryRepository::new());
    let local = Arc::new(LocalMirror::in_memory("designers"));
    let gateway = PersistenceGateway::new(remote.clone(), local.clone());
    (gateway, remote, local)
}

/// 第一次调用阻塞，直到 release()
struct Gate {
    receiver: Mutex<Option<oneshot::Receiver<()>>>,
    sender: Mutex<Option<oneshot::Sender<()>>>,
    entered: Notify,
}

impl Gate {
    fn closed() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            receiver: Mutex::new(Some(receiver)),
            sender: Mutex::new(Some(sender)),
            entered: Notify::new(),
        }
    }

    async fn pass(&self) {
        let receiver = self.receiver.lock().unwrap().take();
        if let Some(receiver) = receiver {
            self.entered.notify_one();
            let _ = receiver.await;
        }
    }

    fn release(&self) {
        if let Some(sender) = self.sender.lock().unwrap().take() {
            let _ = sender.send(());
        }
    }
}

pub(crate) struct ScriptedDescriber {
    response: Result<String, ServiceError>,
    calls: AtomicUsize,
    gate: Option<Gate>,
}

impl ScriptedDescriber {
    pub(crate) fn ok(keywords: &str) -> Self {
        Self {
            response: Ok(keywords.to_string()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            response: Err(ServiceError::Transport(message.to_string())),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// 第一次 describe 会阻塞到 release()
    pub(crate) fn gated(keywords: &str) -> Self {
        Self {
            gate: Some(Gate::closed()),
            ..Self::ok(keywords)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_entered(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notified().await;
        }
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.release();
        }
    }
}

#[async_trait]
impl StyleDescriptionService for ScriptedDescriber {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn describe(&self, _style_ref: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.response.clone()
    }
}

pub(crate) struct ScriptedComposer {
    response: Result<String, ServiceError>,
    calls: AtomicUsize,
}

impl ScriptedComposer {
    pub(crate) fn ok(result_url: &str) -> Self {
        Self {
            response: Ok(result_url.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            response: Err(ServiceError::Transport(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompositeGenerationService for ScriptedComposer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn compose(
        &self,
        _face: &FacePhoto,
        _style_ref: &str,
        _keywords: &str,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// 记录 (设计师, 预约链接, 风格) 的跳转
#[derive(Default)]
pub(crate) struct RecordingOpener {
    opened: Mutex<Vec<(String, Option<String>, String)>>,
}

impl RecordingOpener {
    pub(crate) fn opened(&self) -> Vec<(String, Option<String>, String)> {
        self.opened.lock().unwrap().clone()
    }
}

impl BookingLinkOpener for RecordingOpener {
    fn open(&self, designer_id: &str, reservation_url: Option<&str>, style_ref: &str) -> Result<()> {
        self.opened.lock().unwrap().push((
            designer_id.to_string(),
            reservation_url.map(str::to_string),
            style_ref.to_string(),
        ));
        Ok(())
    }
}

/// 可以随时断开的远程存储
pub(crate) struct FlakyRemote {
    inner: MemoryRepository,
    available: AtomicBool,
}

impl FlakyRemote {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryRepository::new(),
            available: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow!("远程存储不可用"))
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn get_versioned(&self, id: &str) -> Result<Option<VersionedDocument>> {
        self.check()?;
        self.inner.get_versioned(id).await
    }

    async fn set(&self, id: &str, document: &Value) -> Result<()> {
        self.check()?;
        self.inner.set(id, document).await
    }

    async fn set_if_revision(
        &self,
        id: &str,
        document: &Value,
        expected: Option<i64>,
    ) -> Result<bool> {
        self.check()?;
        self.inner.set_if_revision(id, document, expected).await
    }

    async fn update_fields(&self, id: &str, updates: &[FieldUpdate]) -> Result<bool> {
        self.check()?;
        self.inner.update_fields(id, updates).await
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }

    fn store_type(&self) -> &str {
        "flaky"
    }
}

/// 前两次读取完成后互相等待，保证两个写者读到同一份记录
pub(crate) struct GatedRemote {
    inner: Arc<MemoryRepository>,
    barrier: Barrier,
    reads: AtomicUsize,
}

impl GatedRemote {
    pub(crate) fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn get_versioned(&self, id: &str) -> Result<Option<VersionedDocument>> {
        let document = self.inner.get_versioned(id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        Ok(document)
    }

    async fn set(&self, id: &str, document: &Value) -> Result<()> {
        self.inner.set(id, document).await
    }

    async fn set_if_revision(
        &self,
        id: &str,
        document: &Value,
        expected: Option<i64>,
    ) -> Result<bool> {
        self.inner.set_if_revision(id, document, expected).await
    }

    async fn update_fields(&self, id: &str, updates: &[FieldUpdate]) -> Result<bool> {
        self.inner.update_fields(id, updates).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &str {
        "gated"
    }
}

/// 可达但每次乐观写入都冲突的远程存储
pub(crate) struct ConflictingRemote {
    attempts: AtomicUsize,
}

impl ConflictingRemote {
    pub(crate) fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for ConflictingRemote {
    async fn get_versioned(&self, _id: &str) -> Result<Option<VersionedDocument>> {
        Ok(None)
    }

    async fn set(&self, _id: &str, _document: &Value) -> Result<()> {
        Ok(())
    }

    async fn set_if_revision(
        &self,
        _id: &str,
        _document: &Value,
        _expected: Option<i64>,
    ) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn update_fields(&self, _id: &str, _updates: &[FieldUpdate]) -> Result<bool> {
        Ok(false)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &str {
        "conflicting"
    }
}
