// 事件总线 - 用于模块间解耦通信
//
// 试戴状态变化、统计更新和存储回退都会发布到这里，界面层订阅后刷新
// 使用 tokio::sync::broadcast 实现事件分发

use crate::tryon::TryOnState;
use tokio::sync::broadcast;

/// 应用事件枚举
#[derive(Debug, Clone, PartialEq)]
pub enum SalonEvent {
    // --- 试戴事件 ---

    /// 试戴控制器状态变化
    TryOnStateChanged {
        designer_id: String,
        token: u64,
        state: TryOnState,
    },

    // --- 统计事件 ---

    /// 访问已计数（每个会话每位设计师一次）
    VisitCounted { designer_id: String },

    /// 风格被浏览
    StyleViewed {
        designer_id: String,
        style_url: String,
    },

    /// 试戴结果已记录
    TrialRecorded {
        designer_id: String,
        style_url: String,
    },

    /// 预约已记录
    BookingTracked {
        designer_id: String,
        style_url: String,
    },

    /// 统计已重置
    AnalyticsReset { designer_id: String },

    // --- 存储事件 ---

    /// 远程存储不可用，读写回退到本地镜像
    PersistenceFallback {
        designer_id: String,
        operation: String,
        reason: String,
    },
}

/// 事件总线
pub struct EventBus {
    sender: broadcast::Sender<SalonEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// * `capacity` - 缓冲容量，慢订阅者落后超过该数量会丢失旧事件
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃(这是正常的)
    pub fn publish(&self, event: SalonEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SalonEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
