// 会话访问去重 - 每个浏览会话内每位设计师只计一次访问

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

struct SessionState {
    session_id: String,
    counted: HashSet<String>,
}

/// 会话级访问记录
///
/// 只在内存中保存，进程或标签页结束即失效
pub struct SessionVisitTracker {
    inner: Mutex<SessionState>,
}

impl SessionVisitTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionState {
                session_id: Uuid::new_v4().to_string(),
                counted: HashSet::new(),
            }),
        }
    }

    pub fn session_id(&self) -> String {
        self.lock().session_id.clone()
    }

    /// 首次调用返回 true 并记录该设计师；之后都返回 false
    pub fn should_track(&self, designer_id: &str) -> bool {
        let mut state = self.lock();
        let first = state.counted.insert(designer_id.to_string());
        if first {
            debug!("会话 {} 首次访问设计师 {}", state.session_id, designer_id);
        }
        first
    }

    pub fn is_tracked(&self, designer_id: &str) -> bool {
        self.lock().counted.contains(designer_id)
    }

    /// 结束当前会话：清空记录并换一个新的会话 ID
    pub fn end_session(&self) {
        let mut state = self.lock();
        debug!("会话 {} 结束，已计数 {} 位设计师", state.session_id, state.counted.len());
        state.counted.clear();
        state.session_id = Uuid::new_v4().to_string();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionVisitTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_counted_once_per_session() {
        let tracker = SessionVisitTracker::new();
        assert!(tracker.should_track("d1"));
        assert!(!tracker.should_track("d1"));
        assert!(tracker.should_track("d2"));
        assert!(tracker.is_tracked("d1"));
    }

    #[test]
    fn test_end_session_starts_fresh() {
        let tracker = SessionVisitTracker::new();
        let first_id = tracker.session_id();
        tracker.should_track("d1");

        tracker.end_session();
        assert_ne!(tracker.session_id(), first_id);
        assert!(!tracker.is_tracked("d1"));
        assert!(tracker.should_track("d1"));
    }

    #[test]
    fn test_separate_sessions_count_independently() {
        let tab_a = SessionVisitTracker::new();
        let tab_b = SessionVisitTracker::new();
        assert!(tab_a.should_track("d1"));
        assert!(tab_b.should_track("d1"));
    }
}
