// 发型试戴核心库 - 试戴流程、设计师数据持久化与统计

// 声明模块
pub mod analytics;
pub mod error;
pub mod event_bus;
pub mod logger;
pub mod models;
pub mod portfolio;
pub mod services;
pub mod settings;
pub mod storage;
pub mod tryon;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use tracing::info;

use analytics::{AnalyticsAggregator, SessionVisitTracker};
use event_bus::EventBus;
use portfolio::PortfolioManager;
use services::{
    BookingLinkOpener, CompositeGenerationService, HttpCompositeGenerator,
    StyleDescriptionService, VisionStyleDescriber,
};
use settings::SalonConfig;
use storage::{LocalMirror, PersistenceGateway, RemoteStore};
use tryon::TryOnController;

/// 核心服务集合（进程级，所有会话共享）
///
/// 由 `initialize` 创建远程连接和本地镜像，`shutdown` 关闭远程连接
#[derive(Clone)]
pub struct SalonCore {
    pub config: SalonConfig,
    pub gateway: Arc<PersistenceGateway>,
    pub portfolio: Arc<PortfolioManager>,
    pub event_bus: Arc<EventBus>,
    describer: Arc<dyn StyleDescriptionService>,
    composer: Arc<dyn CompositeGenerationService>,
}

impl SalonCore {
    /// 按配置连接存储并创建外部服务客户端
    pub async fn initialize(config: SalonConfig) -> anyhow::Result<Self> {
        info!("初始化试戴核心...");

        let remote =
            storage::connect_remote(&config.storage.remote, &config.storage.collection).await?;
        let local = Arc::new(LocalMirror::open(
            &config.storage.local_dir,
            &config.storage.collection,
        )?);

        let http_client = services::build_http_client(config.services.request_timeout_secs)?;
        let describer: Arc<dyn StyleDescriptionService> = Arc::new(VisionStyleDescriber::new(
            http_client.clone(),
            &config.services.description,
        ));
        let composer: Arc<dyn CompositeGenerationService> = Arc::new(
            HttpCompositeGenerator::new(http_client, &config.services.composer),
        );

        let core = Self::from_parts(config, remote, local, describer, composer);
        info!(
            "试戴核心初始化完成: 远程={}, 计数模式={:?}",
            core.gateway.remote_type(),
            core.config.storage.counter_mode
        );
        Ok(core)
    }

    /// 用现成的组件组装（测试或嵌入时注入替身）
    pub fn from_parts(
        config: SalonConfig,
        remote: Arc<dyn RemoteStore>,
        local: Arc<LocalMirror>,
        describer: Arc<dyn StyleDescriptionService>,
        composer: Arc<dyn CompositeGenerationService>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let gateway =
            Arc::new(PersistenceGateway::new(remote, local).with_events(event_bus.clone()));
        let portfolio = Arc::new(PortfolioManager::new(gateway.clone()));

        Self {
            config,
            gateway,
            portfolio,
            event_bus,
            describer,
            composer,
        }
    }

    /// 打开一个客户浏览会话（每个标签页一个）
    pub fn open_session(&self) -> ClientSession {
        let tracker = Arc::new(SessionVisitTracker::new());
        let analytics = Arc::new(
            AnalyticsAggregator::new(
                self.gateway.clone(),
                tracker.clone(),
                self.config.storage.counter_mode,
            )
            .with_events(self.event_bus.clone()),
        );
        info!("打开客户会话 {}", tracker.session_id());

        ClientSession {
            tracker,
            analytics,
            describer: self.describer.clone(),
            composer: self.composer.clone(),
            event_bus: self.event_bus.clone(),
        }
    }

    pub async fn remote_healthy(&self) -> bool {
        self.gateway.remote_healthy().await
    }

    /// 关闭远程连接
    pub async fn shutdown(&self) {
        info!("关闭试戴核心");
        self.gateway.close().await;
    }
}

/// 单个客户会话
pub struct ClientSession {
    tracker: Arc<SessionVisitTracker>,
    pub analytics: Arc<AnalyticsAggregator>,
    describer: Arc<dyn StyleDescriptionService>,
    composer: Arc<dyn CompositeGenerationService>,
    event_bus: Arc<EventBus>,
}

impl ClientSession {
    pub fn session_id(&self) -> String {
        self.tracker.session_id()
    }

    /// 为某位设计师的页面创建试戴控制器
    pub fn try_on_controller(
        &self,
        designer_id: &str,
        opener: Arc<dyn BookingLinkOpener>,
    ) -> TryOnController {
        TryOnController::new(
            designer_id,
            self.describer.clone(),
            self.composer.clone(),
            opener,
            self.analytics.clone(),
        )
        .with_events(self.event_bus.clone())
    }

    /// 结束会话，之后的访问重新计数
    pub fn end(&self) {
        self.tracker.end_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::SalonEvent;
    use crate::storage::{DatabaseConfig, MemoryRepository};
    use crate::testing::{png_bytes, RecordingOpener, ScriptedComposer, ScriptedDescriber};

    fn memory_core() -> SalonCore {
        SalonCore::from_parts(
            SalonConfig::default(),
            Arc::new(MemoryRepository::new()),
            Arc::new(LocalMirror::in_memory("designers")),
            Arc::new(ScriptedDescriber::ok("soft layers")),
            Arc::new(ScriptedComposer::ok("https://cdn/result.png")),
        )
    }

    #[tokio::test]
    async fn test_sessions_count_visits_independently() {
        let core = memory_core();
        let tab_a = core.open_session();
        let tab_b = core.open_session();
        assert_ne!(tab_a.session_id(), tab_b.session_id());

        assert!(tab_a.analytics.track_visit("d1").await);
        assert!(!tab_a.analytics.track_visit("d1").await);
        assert!(tab_b.analytics.track_visit("d1").await);

        tab_a.end();
        assert!(tab_a.analytics.track_visit("d1").await);
        assert_eq!(core.gateway.read("d1").await.stats.visits, 3);
    }

    #[tokio::test]
    async fn test_designer_and_client_flow() {
        let core = memory_core();
        let mut events = core.event_bus.subscribe();

        core.portfolio
            .set_reservation_url("d1", "https://book.example/d1")
            .await
            .unwrap();

        let session = core.open_session();
        let opener = Arc::new(RecordingOpener::default());
        let controller = session.try_on_controller("d1", opener.clone());

        let photo = png_bytes();
        for _ in 0..3 {
            controller
                .start_try_on("https://img/s.jpg", Some(photo.as_slice()))
                .await
                .unwrap();
        }
        controller.book_now("https://img/s.jpg").await.unwrap();

        let summary = session.analytics.summarize("d1").await;
        assert_eq!(summary.total_views, 3);
        assert_eq!(summary.total_bookings, 1);
        assert!((summary.conversion_rate - 33.333).abs() < 0.01);
        assert_eq!(summary.popular_styles, vec!["https://img/s.jpg"]);
        assert_eq!(summary.trial_results.len(), 3);
        assert_eq!(
            opener.opened()[0].1.as_deref(),
            Some("https://book.example/d1")
        );

        let mut saw_booking = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SalonEvent::BookingTracked { .. }) {
                saw_booking = true;
            }
        }
        assert!(saw_booking);
    }

    #[tokio::test]
    async fn test_initialize_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SalonConfig::default();
        config.storage.remote = DatabaseConfig::SQLite {
            db_path: dir.path().join("remote.db").to_string_lossy().to_string(),
        };
        config.storage.local_dir = dir.path().join("mirror");

        let core = SalonCore::initialize(config).await.unwrap();
        assert!(core.remote_healthy().await);

        let session = core.open_session();
        session.analytics.track_style_view("d1", "S").await;
        assert_eq!(core.gateway.read("d1").await.stats.style_views.get("S"), 1);
        assert!(dir.path().join("mirror").join("designers.json").exists());

        core.shutdown().await;
    }
}
