// 视觉模型风格描述 - 调用 OpenAI 兼容的多模态接口提取发型关键词

use super::plugin::{trim_body, ServiceError, StyleDescriptionService};
use super::DescriptionConfig;
use async_trait::async_trait;
use llm_json::{loads, repair_json, RepairOptions};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

const DESCRIBE_PROMPT: &str = r#"你是一名资深发型师。请观察图片中的发型，用 3-8 个简短的英文关键词描述它（长度、层次、卷度、刘海、颜色等）。
只返回 JSON：{"keywords": ["keyword1", "keyword2"]}"#;

/// 视觉模型风格描述服务
pub struct VisionStyleDescriber {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: Client,
}

impl VisionStyleDescriber {
    /// 创建描述服务（接受共享的HTTP客户端以复用连接池）
    pub fn new(client: Client, config: &DescriptionConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            client,
        }
    }

    async fn call_vision_api(&self, style_ref: &str) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("风格描述服务 API key".to_string()))?;

        let request_body = json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": style_ref}},
                        {"type": "text", "text": DESCRIBE_PROMPT}
                    ]
                }
            ],
            "max_tokens": 300,
            "temperature": 0.2
        });

        debug!(
            "调用风格描述服务: model={}, base_url={}",
            self.model, self.base_url
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("风格描述服务错误 ({}): {}", status, error_text);
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                body: trim_body(&error_text, 200),
            });
        }

        let response_data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.without_url().to_string()))?;

        let choice = response_data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidResponse("响应中没有 choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("风格描述响应因达到 token 限制而被截断");
        }

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl StyleDescriptionService for VisionStyleDescriber {
    fn name(&self) -> &str {
        "vision"
    }

    async fn describe(&self, style_ref: &str) -> Result<String, ServiceError> {
        let content = self.call_vision_api(style_ref).await?;
        parse_keywords(&content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let mut lines = trimmed.lines();
        // 跳过 ```json 或 ``` 开头
        lines.next();
        let mut body = Vec::new();
        for line in lines {
            if line.trim_start().starts_with("```") {
                break;
            }
            body.push(line);
        }
        body.join("\n")
    } else {
        trimmed.to_string()
    }
}

/// 把模型输出整理为逗号分隔的关键词
///
/// 优先按 JSON 解析（必要时修复），否则把原文当作关键词列表
pub(crate) fn parse_keywords(raw: &str) -> Result<String, ServiceError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.trim().is_empty() {
        return Err(ServiceError::EmptyDescription);
    }

    let parsed = serde_json::from_str::<Value>(&cleaned).ok().or_else(|| {
        let repaired = repair_json(&cleaned, &RepairOptions::default()).ok()?;
        loads(&repaired, &RepairOptions::default()).ok()
    });

    let candidates: Vec<String> = match parsed {
        Some(Value::Object(map)) => match map.get("keywords") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(text)) => text.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        },
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => cleaned.split(',').map(str::to_string).collect(),
    };

    let mut keywords: Vec<String> = Vec::new();
    for candidate in candidates {
        let normalized = whitespace()
            .replace_all(candidate.trim(), " ")
            .trim_matches(|c: char| c == '"' || c == '.')
            .to_string();
        if normalized.is_empty() || keywords.iter().any(|k| k.eq_ignore_ascii_case(&normalized)) {
            continue;
        }
        keywords.push(normalized);
    }

    if keywords.is_empty() {
        return Err(ServiceError::EmptyDescription);
    }
    Ok(keywords.join(", "))
}
