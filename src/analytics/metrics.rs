// 统计指标计算 - 纯函数，不涉及存储

use crate::models::{
    AnalyticsSummary, CountMap, DesignerStats, StyleCount, TrialResult, MAX_POPULAR_STYLES,
    MAX_TRIAL_RESULTS,
};

/// 按计数降序排列风格，取前 `limit` 个
///
/// 稳定排序：计数相同时保持首次插入的顺序
pub fn rank_styles(views: &CountMap, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(&str, u64)> = views.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(limit)
        .map(|(style, _)| style.to_string())
        .collect()
}

/// 热门风格（最多 MAX_POPULAR_STYLES 个）
pub fn popular_styles(views: &CountMap) -> Vec<String> {
    rank_styles(views, MAX_POPULAR_STYLES)
}

/// 转化率（百分比）
///
/// 浏览总数为 0 时为 0。预约数可能超过浏览数，结果不做截断。
pub fn conversion_rate(views: &CountMap, bookings: &CountMap) -> f64 {
    let total_views = views.total();
    if total_views == 0 {
        return 0.0;
    }
    bookings.total() as f64 / total_views as f64 * 100.0
}

/// 计数最高的风格，并列时取最先插入的
pub fn top_entry(counts: &CountMap) -> Option<StyleCount> {
    let mut best: Option<(&str, u64)> = None;
    for (style, count) in counts.iter() {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((style, count)),
        }
    }
    best.map(|(style, count)| StyleCount {
        style_url: style.to_string(),
        count,
    })
}

/// 最新结果插到最前，超出上限的旧结果被丢弃
pub fn push_trial_result(results: &mut Vec<TrialResult>, entry: TrialResult) {
    results.insert(0, entry);
    results.truncate(MAX_TRIAL_RESULTS);
}

/// 数据看板汇总
pub fn summarize(stats: &DesignerStats) -> AnalyticsSummary {
    AnalyticsSummary {
        visits: stats.visits,
        total_views: stats.style_views.total(),
        total_bookings: stats.bookings.total(),
        conversion_rate: stats.conversion_rate,
        top_viewed_style: top_entry(&stats.style_views),
        top_booked_style: top_entry(&stats.bookings),
        popular_styles: stats.popular_styles.clone(),
        trial_results: stats.trial_results.clone(),
        last_updated: stats.last_updated,
    }
}
