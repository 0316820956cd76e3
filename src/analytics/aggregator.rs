// 统计聚合器 - 访问、浏览、预约与试戴结果的计数维护
//
// 所有计数更新都以整条记录为单位经过持久化网关写入。
// 统计写入失败不会返回给调用方，只记录警告。

use super::metrics;
use super::session::SessionVisitTracker;
use crate::event_bus::{EventBus, SalonEvent};
use crate::models::{AnalyticsSummary, DesignerRecord, DesignerStats, TrialResult};
use crate::storage::{CounterMode, PersistenceGateway, WriteReport};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AnalyticsAggregator {
    gateway: Arc<PersistenceGateway>,
    sessions: Arc<SessionVisitTracker>,
    mode: CounterMode,
    events: Option<Arc<EventBus>>,
}

impl AnalyticsAggregator {
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        sessions: Arc<SessionVisitTracker>,
        mode: CounterMode,
    ) -> Self {
        Self {
            gateway,
            sessions,
            mode,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    pub fn sessions(&self) -> &Arc<SessionVisitTracker> {
        &self.sessions
    }

    /// 记录一次访问（同一会话内每位设计师只计一次）
    ///
    /// 返回本次调用是否计数
    pub async fn track_visit(&self, designer_id: &str) -> bool {
        if !self.sessions.should_track(designer_id) {
            debug!("设计师 {} 的访问在本会话中已计数", designer_id);
            return false;
        }

        self.mutate_stats(designer_id, "track_visit", |stats| {
            stats.visits += 1;
        })
        .await;

        self.publish(SalonEvent::VisitCounted {
            designer_id: designer_id.to_string(),
        });
        true
    }

    /// 记录一次风格浏览（每次发起试戴都会调用），同时刷新热门风格与转化率
    pub async fn track_style_view(&self, designer_id: &str, style_ref: &str) -> WriteReport {
        let report = self
            .mutate_stats(designer_id, "track_style_view", |stats| {
                stats.style_views.increment(style_ref);
                stats.total_try_ons += 1;
                stats.popular_styles = metrics::popular_styles(&stats.style_views);
                stats.conversion_rate =
                    metrics::conversion_rate(&stats.style_views, &stats.bookings);
            })
            .await;

        self.publish(SalonEvent::StyleViewed {
            designer_id: designer_id.to_string(),
            style_url: style_ref.to_string(),
        });
        report
    }

    /// 记录一次预约并重新计算转化率
    pub async fn track_booking(&self, designer_id: &str, style_ref: &str) -> WriteReport {
        let report = self
            .mutate_stats(designer_id, "track_booking", |stats| {
                stats.bookings.increment(style_ref);
                stats.conversion_rate =
                    metrics::conversion_rate(&stats.style_views, &stats.bookings);
            })
            .await;

        self.publish(SalonEvent::BookingTracked {
            designer_id: designer_id.to_string(),
            style_url: style_ref.to_string(),
        });
        report
    }

    /// 保存试戴结果（最新在前，最多 20 条）
    pub async fn record_trial_result(&self, designer_id: &str, entry: TrialResult) -> WriteReport {
        let style_url = entry.style_url.clone();
        let report = self
            .mutate_stats(designer_id, "record_trial_result", |stats| {
                metrics::push_trial_result(&mut stats.trial_results, entry.clone());
            })
            .await;

        self.publish(SalonEvent::TrialRecorded {
            designer_id: designer_id.to_string(),
            style_url,
        });
        report
    }

    /// 清空统计
    pub async fn reset_analytics(&self, designer_id: &str) -> WriteReport {
        info!("重置设计师 {} 的统计数据", designer_id);
        let report = self
            .mutate_stats(designer_id, "reset_analytics", |stats| {
                *stats = DesignerStats::empty(Utc::now());
            })
            .await;

        self.publish(SalonEvent::AnalyticsReset {
            designer_id: designer_id.to_string(),
        });
        report
    }

    /// 数据看板汇总
    pub async fn summarize(&self, designer_id: &str) -> AnalyticsSummary {
        let record = self.gateway.read(designer_id).await;
        metrics::summarize(&record.stats)
    }

    /// 读取记录、修改统计、写回
    async fn mutate_stats<F>(&self, designer_id: &str, operation: &str, mutate: F) -> WriteReport
    where
        F: Fn(&mut DesignerStats) + Send + Sync,
    {
        let apply = |record: &mut DesignerRecord| {
            mutate(&mut record.stats);
            let now = Utc::now();
            record.stats.last_updated = now;
            record.touch(now);
        };

        let report = match self.mode {
            CounterMode::ReadModifyWrite => {
                let mut record = self.gateway.read(designer_id).await;
                apply(&mut record);
                self.gateway.write(designer_id, &record).await
            }
            CounterMode::CompareAndSwap { max_attempts } => {
                let attempts = max_attempts.max(1);
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let snapshot = self.gateway.read_snapshot(designer_id).await;
                    let mut record = snapshot.record;
                    apply(&mut record);

                    if !snapshot.remote_reachable {
                        // 远程不可达时没有可比较的版本号
                        break self.gateway.write(designer_id, &record).await;
                    }

                    let report = self
                        .gateway
                        .write_if_revision(designer_id, &record, snapshot.revision)
                        .await;
                    if report.is_conflict() {
                        if attempt < attempts {
                            debug!(
                                "{} 版本冲突，重试 ({}/{}): {}",
                                operation, attempt, attempts, designer_id
                            );
                            continue;
                        }
                        // 重试用尽：远程保持冲突，本地镜像仍保存本次修改
                        break WriteReport {
                            local: self.gateway.mirror_local(designer_id, &record),
                            remote: report.remote,
                        };
                    }
                    break report;
                }
            }
        };

        if !report.success() {
            warn!(
                "统计更新未同步到远程 ({} / {}): {:?}",
                operation,
                designer_id,
                report.remote.error()
            );
        }
        report
    }

    fn publish(&self, event: SalonEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}
