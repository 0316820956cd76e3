// 试戴图合成 - 以 multipart 形式上传正脸照片与风格信息，取回生成的图片

use super::plugin::{trim_body, CompositeGenerationService, FacePhoto, ServiceError};
use super::ComposerConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{debug, error, info};

/// HTTP 图像生成服务
pub struct HttpCompositeGenerator {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

impl HttpCompositeGenerator {
    pub fn new(client: Client, config: &ComposerConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            client,
        }
    }

    fn build_prompt(keywords: &str) -> String {
        format!(
            "Keep the person's face, skin tone and expression unchanged. \
             Replace only the hairstyle with: {}. Photorealistic salon lighting.",
            keywords
        )
    }
}

#[async_trait]
impl CompositeGenerationService for HttpCompositeGenerator {
    fn name(&self) -> &str {
        "http-composer"
    }

    async fn compose(
        &self,
        face: &FacePhoto,
        style_ref: &str,
        keywords: &str,
    ) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("试戴图生成服务 API key".to_string()))?;

        let image_part = multipart::Part::bytes(face.bytes().to_vec())
            .file_name(format!("face.{}", face.format().extension()))
            .mime_str(face.mime_type())
            .map_err(|e| ServiceError::Transport(e.without_url().to_string()))?;

        let form = multipart::Form::new()
            .part("image", image_part)
            .text("model", self.model.clone())
            .text("prompt", Self::build_prompt(keywords))
            .text("style_image_url", style_ref.to_string())
            .text("n", "1");

        debug!(
            "调用试戴图生成服务: model={}, base_url={}, 照片 {} 字节",
            self.model,
            self.base_url,
            face.bytes().len()
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("试戴图生成服务错误 ({}): {}", status, error_text);
            return Err(ServiceError::Rejected {
                status: status.as_u16(),
                body: trim_body(&error_text, 200),
            });
        }

        let response_text = response.text().await?;
        let image_ref = parse_image_response(&response_text)?;
        info!("试戴图生成完成");
        Ok(image_ref)
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// 解析生成结果：优先 url，其次 b64_json（转换为 data URL）
pub(crate) fn parse_image_response(body: &str) -> Result<String, ServiceError> {
    let response: ImageResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

    for item in response.data {
        if let Some(url) = item.url.filter(|u| !u.trim().is_empty()) {
            return Ok(url);
        }
        if let Some(encoded) = item.b64_json.filter(|b| !b.trim().is_empty()) {
            let bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ServiceError::InvalidResponse(format!("图片编码无效: {}", e)))?;
            let mime = match image::guess_format(&bytes) {
                Ok(image::ImageFormat::Jpeg) => "image/jpeg",
                Ok(image::ImageFormat::WebP) => "image/webp",
                _ => "image/png",
            };
            return Ok(format!(
                "data:{};base64,{}",
                mime,
                general_purpose::STANDARD.encode(&bytes)
            ));
        }
    }

    Err(ServiceError::NoImageProduced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_response() {
        let body = r#"{"created": 1, "data": [{"url": "https://cdn/out.png"}]}"#;
        assert_eq!(parse_image_response(body).unwrap(), "https://cdn/out.png");
    }

    #[test]
    fn test_parse_b64_response() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let body = format!(
            r#"{{"data": [{{"b64_json": "{}"}}]}}"#,
            general_purpose::STANDARD.encode(png)
        );
        let result = parse_image_response(&body).unwrap();
        assert!(result.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_missing_image_is_no_image_produced() {
        assert_eq!(
            parse_image_response(r#"{"data": []}"#),
            Err(ServiceError::NoImageProduced)
        );
        assert_eq!(
            parse_image_response(r#"{"data": [{"url": ""}]}"#),
            Err(ServiceError::NoImageProduced)
        );
        assert_eq!(
            parse_image_response(r#"{"created": 1}"#),
            Err(ServiceError::NoImageProduced)
        );
    }

    #[test]
    fn test_malformed_body_is_invalid_response() {
        assert!(matches!(
            parse_image_response("<html>gateway error</html>"),
            Err(ServiceError::InvalidResponse(_))
        ));
    }
}
