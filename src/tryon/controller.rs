// 试戴控制器 - 两阶段试戴流程的状态机
//
// Idle -> Analyzing -> Generating -> Done，任一阶段失败进入 Error，reset() 随时回到 Idle。
// 每次 start_try_on 领取一个递增的令牌；阶段返回时令牌已过期则丢弃结果。

use crate::analytics::AnalyticsAggregator;
use crate::error::{PipelineStage, TryOnError};
use crate::event_bus::{EventBus, SalonEvent};
use crate::models::TrialResult;
use crate::services::{
    BookingLinkOpener, CompositeGenerationService, FacePhoto, StyleDescriptionService,
};
use crate::storage::WriteReport;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 试戴状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TryOnState {
    Idle,
    /// 阶段一进行中
    Analyzing { style_ref: String },
    /// 阶段二进行中
    Generating { style_ref: String, keywords: String },
    Done { result: TrialResult },
    Error { message: String },
}

impl TryOnState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TryOnState::Analyzing { .. } | TryOnState::Generating { .. }
        )
    }
}

/// 客户选中的参考发型
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSelection {
    pub url: String,
    pub name: Option<String>,
}

impl StyleSelection {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<&str> for StyleSelection {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
            name: None,
        }
    }
}

impl From<String> for StyleSelection {
    fn from(url: String) -> Self {
        Self { url, name: None }
    }
}

/// 一次成功试戴的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnOutcome {
    pub trial: TrialResult,
    pub keywords: String,
    pub token: u64,
}

struct ControllerState {
    token: u64,
    state: TryOnState,
}

/// 试戴控制器（每个客户页面一个，绑定一位设计师）
pub struct TryOnController {
    designer_id: String,
    describer: Arc<dyn StyleDescriptionService>,
    composer: Arc<dyn CompositeGenerationService>,
    opener: Arc<dyn BookingLinkOpener>,
    analytics: Arc<AnalyticsAggregator>,
    events: Option<Arc<EventBus>>,
    current: Mutex<ControllerState>,
}

impl TryOnController {
    pub fn new(
        designer_id: impl Into<String>,
        describer: Arc<dyn StyleDescriptionService>,
        composer: Arc<dyn CompositeGenerationService>,
        opener: Arc<dyn BookingLinkOpener>,
        analytics: Arc<AnalyticsAggregator>,
    ) -> Self {
        Self {
            designer_id: designer_id.into(),
            describer,
            composer,
            opener,
            analytics,
            events: None,
            current: Mutex::new(ControllerState {
                token: 0,
                state: TryOnState::Idle,
            }),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn designer_id(&self) -> &str {
        &self.designer_id
    }

    /// 当前状态快照
    pub async fn state(&self) -> TryOnState {
        self.current.lock().await.state.clone()
    }

    /// 发起试戴
    ///
    /// 校验失败时不改变状态，也不调用任何外部服务。
    /// 被 reset() 或更新的请求取代时返回 `TryOnError::Superseded`。
    pub async fn start_try_on(
        &self,
        style: impl Into<StyleSelection>,
        face_photo: Option<&[u8]>,
    ) -> Result<TryOnOutcome, TryOnError> {
        let style = style.into();
        let style_ref = style.url.trim().to_string();
        if style_ref.is_empty() {
            return Err(TryOnError::Validation("请先选择参考发型".to_string()));
        }
        let photo = match face_photo {
            Some(bytes) => FacePhoto::from_bytes(bytes.to_vec()).map_err(TryOnError::Validation)?,
            None => return Err(TryOnError::Validation("请先上传正脸照片".to_string())),
        };

        let token = self
            .begin(TryOnState::Analyzing {
                style_ref: style_ref.clone(),
            })
            .await;
        info!(
            "开始试戴 #{}: 设计师={}, 风格={}",
            token, self.designer_id, style_ref
        );

        // 发起即计一次浏览，与后续结果无关
        self.analytics
            .track_style_view(&self.designer_id, &style_ref)
            .await;

        if !self.is_current(token).await {
            return Err(TryOnError::Superseded);
        }

        // 阶段一：风格描述
        let keywords = match self.describer.describe(&style_ref).await {
            Ok(keywords) if !keywords.trim().is_empty() => keywords.trim().to_string(),
            Ok(_) => {
                return self
                    .fail(token, PipelineStage::Describe, "未能识别出发型关键词".to_string())
                    .await
            }
            Err(e) => return self.fail(token, PipelineStage::Describe, e.to_string()).await,
        };
        debug!("试戴 #{} 关键词: {}", token, keywords);

        if !self
            .transition(
                token,
                TryOnState::Generating {
                    style_ref: style_ref.clone(),
                    keywords: keywords.clone(),
                },
            )
            .await
        {
            return Err(TryOnError::Superseded);
        }

        // 阶段二：合成试戴图
        let result_url = match self.composer.compose(&photo, &style_ref, &keywords).await {
            Ok(url) => url,
            Err(e) => return self.fail(token, PipelineStage::Compose, e.to_string()).await,
        };

        let trial = TrialResult {
            style_url: style_ref,
            result_url,
            timestamp: Utc::now(),
            style_name: style.name,
        };

        if !self
            .transition(
                token,
                TryOnState::Done {
                    result: trial.clone(),
                },
            )
            .await
        {
            return Err(TryOnError::Superseded);
        }

        self.analytics
            .record_trial_result(&self.designer_id, trial.clone())
            .await;
        info!("试戴 #{} 完成", token);

        Ok(TryOnOutcome {
            trial,
            keywords,
            token,
        })
    }

    /// 回到 Idle，进行中的请求结果将被丢弃
    pub async fn reset(&self) {
        let mut current = self.current.lock().await;
        current.token += 1;
        current.state = TryOnState::Idle;
        let token = current.token;
        drop(current);

        debug!("试戴控制器已重置 (令牌 {})", token);
        self.publish_state(token, TryOnState::Idle);
    }

    /// 立即预约：记录预约后交给界面层打开预约链接
    pub async fn book_now(&self, style_ref: &str) -> anyhow::Result<WriteReport> {
        let report = self
            .analytics
            .track_booking(&self.designer_id, style_ref)
            .await;

        let record = self.analytics.gateway().read(&self.designer_id).await;
        let reservation_url = record.reservation_url.as_deref();
        if reservation_url.is_none() {
            warn!("设计师 {} 尚未设置预约链接", self.designer_id);
        }

        self.opener
            .open(&self.designer_id, reservation_url, style_ref)?;
        Ok(report)
    }

    async fn begin(&self, state: TryOnState) -> u64 {
        let mut current = self.current.lock().await;
        current.token += 1;
        current.state = state.clone();
        let token = current.token;
        drop(current);

        self.publish_state(token, state);
        token
    }

    async fn is_current(&self, token: u64) -> bool {
        self.current.lock().await.token == token
    }

    /// 令牌仍有效时切换状态，返回是否切换
    async fn transition(&self, token: u64, state: TryOnState) -> bool {
        let mut current = self.current.lock().await;
        if current.token != token {
            debug!("试戴 #{} 已过期 (当前 {}), 丢弃阶段结果", token, current.token);
            return false;
        }
        current.state = state.clone();
        drop(current);

        self.publish_state(token, state);
        true
    }

    async fn fail(
        &self,
        token: u64,
        stage: PipelineStage,
        message: String,
    ) -> Result<TryOnOutcome, TryOnError> {
        let error = TryOnError::ExternalService { stage, message };
        if !self
            .transition(
                token,
                TryOnState::Error {
                    message: error.to_string(),
                },
            )
            .await
        {
            return Err(TryOnError::Superseded);
        }
        error!("试戴 #{} 失败: {}", token, error);
        Err(error)
    }

    fn publish_state(&self, token: u64, state: TryOnState) {
        if let Some(events) = &self.events {
            events.publish(SalonEvent::TryOnStateChanged {
                designer_id: self.designer_id.clone(),
                token,
                state,
            });
        }
    }
}
