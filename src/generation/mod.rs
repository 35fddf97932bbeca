//! 답변 생성 모듈 - OpenAI 호환 Chat Completions
//!
//! 프롬프트 하나를 사용자 메시지로 보내고 완성된 텍스트를 받습니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::build_openai_client;
use crate::error::{RagError, RagResult};

/// 기본 채팅 모델
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";

/// 서비스 이름 (에러 표시용)
const SERVICE: &str = "openai-chat";

/// 생성 요청
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// 완성된 프롬프트
    pub prompt: &'a str,
    /// 샘플링 온도 (0.0 ~ 2.0)
    pub temperature: f32,
}

/// 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프롬프트에 대한 완성 텍스트 생성
    async fn generate(&self, request: GenerationRequest<'_>) -> RagResult<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

/// OpenAI Chat Completions 구현체
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiChat {
    /// 새 채팅 클라이언트 생성
    pub fn new(api_key: &str, base_url: &str, model: &str) -> RagResult<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::config("missing OpenAI API key"));
        }
        if model.trim().is_empty() {
            return Err(RagError::config("missing chat model name"));
        }

        let client = build_openai_client(api_key, Duration::from_secs(60))?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
        })
    }
}

/// ref: https://platform.openai.com/docs/api-reference/chat/create
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    async fn generate(&self, request: GenerationRequest<'_>) -> RagResult<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::service(SERVICE, format!("{}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| RagError::service(SERVICE, "response contained no message content"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
