// 外部服务插件接口 - 风格描述、试戴图合成与预约跳转

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use thiserror::Error;

/// 外部服务错误，消息保持简短可读
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{0} 未配置")]
    NotConfigured(String),

    #[error("网络请求失败: {0}")]
    Transport(String),

    #[error("服务返回错误 (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("无法解析服务响应: {0}")]
    InvalidResponse(String),

    /// 合成服务正常返回但没有图片
    #[error("服务未生成图片")]
    NoImageProduced,

    #[error("未能识别出发型关键词")]
    EmptyDescription,
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Transport("请求超时".to_string())
        } else if err.is_connect() {
            ServiceError::Transport("无法连接到服务".to_string())
        } else {
            ServiceError::Transport(err.without_url().to_string())
        }
    }
}

/// 截断过长的响应正文
pub(crate) fn trim_body(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut trimmed: String = body.chars().take(max_chars).collect();
    trimmed.push_str("...");
    trimmed
}

/// 支持的照片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
}

impl PhotoFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            PhotoFormat::Png => "image/png",
            PhotoFormat::Jpeg => "image/jpeg",
            PhotoFormat::WebP => "image/webp",
            PhotoFormat::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PhotoFormat::Png => "png",
            PhotoFormat::Jpeg => "jpg",
            PhotoFormat::WebP => "webp",
            PhotoFormat::Gif => "gif",
        }
    }
}

/// 客户上传的正脸照片（已校验格式）
#[derive(Debug, Clone, PartialEq)]
pub struct FacePhoto {
    bytes: Vec<u8>,
    format: PhotoFormat,
}

impl FacePhoto {
    /// 根据文件头识别格式
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err("请先上传正脸照片".to_string());
        }

        let format = match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) => PhotoFormat::Png,
            Ok(ImageFormat::Jpeg) => PhotoFormat::Jpeg,
            Ok(ImageFormat::WebP) => PhotoFormat::WebP,
            Ok(ImageFormat::Gif) => PhotoFormat::Gif,
            Ok(other) => return Err(format!("不支持的照片格式: {:?}", other)),
            Err(_) => return Err("无法识别照片格式".to_string()),
        };

        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> PhotoFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// 阶段一：从参考发型图片提取风格关键词
#[async_trait]
pub trait StyleDescriptionService: Send + Sync {
    fn name(&self) -> &str;

    /// 返回逗号分隔的关键词
    async fn describe(&self, style_ref: &str) -> Result<String, ServiceError>;
}

/// 阶段二：生成试戴合成图
#[async_trait]
pub trait CompositeGenerationService: Send + Sync {
    fn name(&self) -> &str;

    /// 返回生成图片的引用（URL 或 data URL）
    async fn compose(
        &self,
        face: &FacePhoto,
        style_ref: &str,
        keywords: &str,
    ) -> Result<String, ServiceError>;
}

/// 预约跳转（由界面层提供，例如打开浏览器）
pub trait BookingLinkOpener: Send + Sync {
    fn open(
        &self,
        designer_id: &str,
        reservation_url: Option<&str>,
        style_ref: &str,
    ) -> anyhow::Result<()>;
}
