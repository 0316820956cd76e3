// 数据模型模块 - 设计师记录（聚合根）及其嵌套结构
//
// 持久化格式与远程/本地存储一致，字段名使用 camelCase

use chrono::{DateTime, Utc};
use serde::{
    de::{self, Deserializer, MapAccess, Visitor},
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 试戴结果历史的最大条数
pub const MAX_TRIAL_RESULTS: usize = 20;

/// 热门风格的最大条数
pub const MAX_POPULAR_STYLES: usize = 5;

/// 按插入顺序保存的 风格引用 -> 计数 映射
///
/// 排名的并列顺序依赖首次插入顺序，因此不能使用 HashMap/BTreeMap。
/// 序列化为普通 JSON 对象，反序列化时按文档顺序恢复。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap {
    entries: Vec<(String, u64)>,
}

impl CountMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取计数，不存在时为 0
    pub fn get(&self, key: &str) -> u64 {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// 计数加一，返回新值；新键追加在末尾
    pub fn increment(&mut self, key: &str) -> u64 {
        if let Some((_, count)) = self.entries.iter_mut().find(|(k, _)| k == key) {
            *count = count.saturating_add(1);
            return *count;
        }
        self.entries.push((key.to_string(), 1));
        1
    }

    /// 设置计数（已存在的键保持原位置）
    pub fn set(&mut self, key: impl Into<String>, value: u64) {
        let key = key.into();
        if let Some((_, count)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            *count = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| *count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Serialize for CountMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CountMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountMapVisitor;

        impl<'de> Visitor<'de> for CountMapVisitor {
            type Value = CountMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("风格引用到计数的映射")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CountMap, A::Error> {
                let mut map = CountMap::new();
                while let Some((key, count)) = access.next_entry::<String, u64>()? {
                    map.set(key, count);
                }
                Ok(map)
            }

            // 旧数据中可能出现 null
            fn visit_unit<E: de::Error>(self) -> Result<CountMap, E> {
                Ok(CountMap::new())
            }
        }

        deserializer.deserialize_any(CountMapVisitor)
    }
}

/// 一次客户试戴的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    /// 参考发型图片
    pub style_url: String,
    /// 生成的试戴合成图
    pub result_url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub style_name: Option<String>,
}

/// 带计数的风格引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleCount {
    pub style_url: String,
    pub count: u64,
}

/// 设计师统计数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerStats {
    #[serde(default)]
    pub visits: u64,
    #[serde(default)]
    pub style_views: CountMap,
    #[serde(default)]
    pub bookings: CountMap,
    #[serde(default)]
    pub total_try_ons: u64,
    /// 百分比，不做 [0,100] 截断
    #[serde(default)]
    pub conversion_rate: f64,
    #[serde(default)]
    pub popular_styles: Vec<String>,
    /// 最新的在前，最多 MAX_TRIAL_RESULTS 条
    #[serde(default)]
    pub trial_results: Vec<TrialResult>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl DesignerStats {
    /// 全部归零的统计
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            visits: 0,
            style_views: CountMap::new(),
            bookings: CountMap::new(),
            total_try_ons: 0,
            conversion_rate: 0.0,
            popular_styles: Vec::new(),
            trial_results: Vec::new(),
            last_updated: now,
        }
    }
}

impl Default for DesignerStats {
    fn default() -> Self {
        Self::empty(Utc::now())
    }
}

/// 作品性别分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    #[default]
    Unisex,
}

/// 作品集条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEntry {
    pub id: String,
    pub name: String,
    /// 参考发型图片，创建后不可修改
    pub url: String,
    #[serde(default)]
    pub gender: Gender,
    /// 长度、风格等分类字段
    #[serde(default)]
    pub category_fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新作品（由上传表单提交）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPortfolioEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub category_fields: BTreeMap<String, String>,
}

/// 作品修改补丁，不包含图片字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEntryPatch {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub category_fields: Option<BTreeMap<String, String>>,
}

/// 设计师公开资料
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub salon_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 设计师偏好设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerSettings {
    #[serde(default)]
    pub locale: Option<String>,
    /// 是否向客户展示试戴历史
    #[serde(default)]
    pub show_trial_gallery: Option<bool>,
}

/// 设计师记录（聚合根）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerRecord {
    #[serde(default)]
    pub portfolio: Vec<PortfolioEntry>,
    #[serde(default)]
    pub reservation_url: Option<String>,
    #[serde(default)]
    pub stats: DesignerStats,
    #[serde(default)]
    pub profile: Option<DesignerProfile>,
    #[serde(default)]
    pub settings: Option<DesignerSettings>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl DesignerRecord {
    /// 注册时创建的空记录
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            portfolio: Vec::new(),
            reservation_url: None,
            stats: DesignerStats::empty(now),
            profile: None,
            settings: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 每次修改后刷新 updated_at
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn find_entry(&self, entry_id: &str) -> Option<&PortfolioEntry> {
        self.portfolio.iter().find(|e| e.id == entry_id)
    }
}

/// 资料补丁：None 表示保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub salon_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// 设置补丁：None 表示保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub locale: Option<String>,
    pub show_trial_gallery: Option<bool>,
}

/// 记录级别的类型化更新补丁
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPatch {
    ReservationUrl { url: String },
    Profile(ProfilePatch),
    Settings(SettingsPatch),
}

/// 单个字段更新（路径按段拆分，避免 URL 中的 '.' 被误当作分隔符）
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: Vec<String>,
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(path: &[&str], value: Value) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            value,
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn check_text(field: &str, value: &Option<String>, max_len: usize) -> Result<(), String> {
    if let Some(text) = value {
        if text.trim().is_empty() {
            return Err(format!("{} 不能为空", field));
        }
        if text.chars().count() > max_len {
            return Err(format!("{} 超过 {} 个字符", field, max_len));
        }
    }
    Ok(())
}

impl RecordPatch {
    /// 合并前校验
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RecordPatch::ReservationUrl { url } => {
                if !is_http_url(url.trim()) {
                    return Err(format!("预约链接必须是 http(s) 地址: {}", url));
                }
            }
            RecordPatch::Profile(patch) => {
                check_text("displayName", &patch.display_name, 80)?;
                check_text("salonName", &patch.salon_name, 120)?;
                check_text("bio", &patch.bio, 1000)?;
                if let Some(avatar) = &patch.avatar_url {
                    if !is_http_url(avatar) {
                        return Err(format!("头像地址必须是 http(s) 地址: {}", avatar));
                    }
                }
            }
            RecordPatch::Settings(patch) => {
                check_text("locale", &patch.locale, 16)?;
            }
        }
        Ok(())
    }

    /// 将补丁合并进记录（不刷新时间戳）
    pub fn apply_to(&self, record: &mut DesignerRecord) {
        match self {
            RecordPatch::ReservationUrl { url } => {
                record.reservation_url = Some(url.trim().to_string());
            }
            RecordPatch::Profile(patch) => {
                let profile = record.profile.get_or_insert_with(DesignerProfile::default);
                if let Some(v) = &patch.display_name {
                    profile.display_name = Some(v.clone());
                }
                if let Some(v) = &patch.salon_name {
                    profile.salon_name = Some(v.clone());
                }
                if let Some(v) = &patch.bio {
                    profile.bio = Some(v.clone());
                }
                if let Some(v) = &patch.avatar_url {
                    profile.avatar_url = Some(v.clone());
                }
            }
            RecordPatch::Settings(patch) => {
                let settings = record.settings.get_or_insert_with(DesignerSettings::default);
                if let Some(v) = &patch.locale {
                    settings.locale = Some(v.clone());
                }
                if let Some(v) = patch.show_trial_gallery {
                    settings.show_trial_gallery = Some(v);
                }
            }
        }
    }

    /// 远程字段更新：写入合并后的顶层字段，避免覆盖 stats 等其他部分
    pub fn field_updates(&self, merged: &DesignerRecord) -> Result<Vec<FieldUpdate>, serde_json::Error> {
        let update = match self {
            RecordPatch::ReservationUrl { .. } => FieldUpdate::new(
                &["reservationUrl"],
                serde_json::to_value(&merged.reservation_url)?,
            ),
            RecordPatch::Profile(_) => {
                FieldUpdate::new(&["profile"], serde_json::to_value(&merged.profile)?)
            }
            RecordPatch::Settings(_) => {
                FieldUpdate::new(&["settings"], serde_json::to_value(&merged.settings)?)
            }
        };
        Ok(vec![
            update,
            FieldUpdate::new(&["updatedAt"], serde_json::to_value(merged.updated_at)?),
        ])
    }
}

/// 数据看板汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub visits: u64,
    pub total_views: u64,
    pub total_bookings: u64,
    pub conversion_rate: f64,
    pub top_viewed_style: Option<StyleCount>,
    pub top_booked_style: Option<StyleCount>,
    pub popular_styles: Vec<String>,
    pub trial_results: Vec<TrialResult>,
    pub last_updated: DateTime<Utc>,
}
