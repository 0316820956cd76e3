// 统计模块 - 设计师看板数据的采集与汇总

pub mod aggregator;
pub mod metrics;
pub mod session;

pub use aggregator::AnalyticsAggregator;
pub use session::SessionVisitTracker;
