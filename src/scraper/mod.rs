//! 웹 스크래퍼 모듈 - URL의 보이는 텍스트 추출
//!
//! HTTP GET으로 페이지를 가져와 script/style 요소를 제외한 모든 텍스트 노드를
//! 공백 하나로 이어 붙이고, 연속 공백을 정리합니다.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Node};

use crate::error::{RagError, RagResult};

/// 텍스트에서 제외할 요소
const HIDDEN_ELEMENTS: [&str; 2] = ["script", "style"];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// 스크랩된 문서 (수집 중에만 메모리에 존재)
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 원본 URL
    pub url: String,
    /// 정리된 본문 텍스트
    pub text: String,
}

// ============================================================================
// TextSource Trait
// ============================================================================

/// URL에서 정리된 텍스트를 얻는 소스
#[async_trait]
pub trait TextSource: Send + Sync {
    /// URL을 가져와 정리된 텍스트 반환
    async fn extract(&self, url: &str) -> RagResult<Document>;
}

// ============================================================================
// WebScraper
// ============================================================================

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> RagResult<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// 타임아웃을 지정하여 생성
    pub fn with_timeout(timeout: Duration) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pagechat-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self { client })
    }

    /// URL에서 HTML 가져오기
    async fn fetch_html(&self, url: &str) -> RagResult<String> {
        let parsed = url::Url::parse(url)
            .map_err(|e| RagError::validation(format!("invalid url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RagError::validation(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| RagError::Fetch {
                url: url.to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::Fetch {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| RagError::Fetch {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("응답 본문 읽기 실패: {}", e),
        })
    }
}

#[async_trait]
impl TextSource for WebScraper {
    async fn extract(&self, url: &str) -> RagResult<Document> {
        tracing::info!("Scraping: {}", url);

        let html = self.fetch_html(url).await?;
        let text = clean_html(&html);

        tracing::debug!("Extracted {} chars from {}", text.chars().count(), url);

        Ok(Document {
            url: url.to_string(),
            text,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// HTML에서 보이는 텍스트 추출
///
/// script/style 하위의 텍스트는 버리고, 나머지 텍스트 노드를 공백 하나로
/// 연결한 뒤 연속 공백을 정리합니다.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.tree.root().descendants() {
        let Node::Text(fragment) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| HIDDEN_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    collapse_whitespace(&text)
}

/// 연속 공백을 공백 하나로 정리
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
