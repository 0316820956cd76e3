// 外部服务模块 - 试戴流程依赖的两个远程服务
//
// 阶段一：视觉模型描述参考发型（关键词）
// 阶段二：图像生成服务合成试戴图

pub mod composer;
pub mod plugin;
pub mod vision;

pub use composer::HttpCompositeGenerator;
pub use plugin::{
    BookingLinkOpener, CompositeGenerationService, FacePhoto, PhotoFormat, ServiceError,
    StyleDescriptionService,
};
pub use vision::VisionStyleDescriber;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 风格描述服务配置（OpenAI 兼容的 chat/completions 接口）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_description_model")]
    pub model: String,
    #[serde(default = "default_description_url")]
    pub base_url: String,
}

fn default_description_model() -> String {
    "qwen-vl-max-latest".to_string()
}

fn default_description_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions".to_string()
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_description_model(),
            base_url: default_description_url(),
        }
    }
}

/// 试戴图生成服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposerConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_composer_url")]
    pub base_url: String,
    #[serde(default = "default_composer_model")]
    pub model: String,
}

fn default_composer_url() -> String {
    "https://api.openai.com/v1/images/edits".to_string()
}

fn default_composer_model() -> String {
    "gpt-image-1".to_string()
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_composer_url(),
            model: default_composer_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub description: DescriptionConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            description: DescriptionConfig::default(),
            composer: ComposerConfig::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// 创建共享的 HTTP 客户端（两个服务复用连接池）
pub fn build_http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_config_defaults_from_partial_json() {
        let config: ServicesConfig =
            serde_json::from_str(r#"{"description": {"api_key": "k"}}"#).unwrap();
        assert_eq!(config.description.api_key.as_deref(), Some("k"));
        assert_eq!(config.description.model, "qwen-vl-max-latest");
        assert!(config.composer.api_key.is_none());
        assert_eq!(config.request_timeout_secs, 120);
    }
}
