//! CLI 모듈
//!
//! pagechat-rag 명령어 정의 및 구현

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{ServiceArgs, StoreBackend, DEFAULT_BIND, FETCH_TIMEOUT};
use crate::error::RagResult;
use crate::knowledge::{
    chunk_page, ChunkConfig, IngestLedger, IngestReport, QueryRequest, CONTEXT_SEPARATOR,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_TOP_K,
};
use crate::scraper::WebScraper;
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pagechat-rag")]
#[command(version, about = "웹페이지 하나를 읽고 질문에 답하는 RAG 데모", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 청킹 인자
#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    /// 청크 크기 (문자 수)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// 청크 오버랩 (문자 수)
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,
}

impl ChunkArgs {
    pub fn config(&self) -> RagResult<ChunkConfig> {
        ChunkConfig::new(self.chunk_size, self.chunk_overlap)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 웹페이지를 벡터 저장소에 수집
    Ingest {
        /// 수집할 URL
        #[arg(short, long)]
        url: String,

        #[command(flatten)]
        chunking: ChunkArgs,

        /// 변경이 없어도 다시 임베딩
        #[arg(long)]
        force: bool,
    },

    /// 웹페이지를 청크로 나눠 출력 (임베딩 없음)
    Chunks {
        /// 대상 URL
        #[arg(short, long)]
        url: String,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// 수집된 페이지에 질문
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// 생성 온도 (기본 0.2)
        #[arg(short, long)]
        temperature: Option<f32>,

        /// 사용된 컨텍스트 출력
        #[arg(long)]
        show_context: bool,
    },

    /// HTTP API + 웹 UI 서버 실행
    Serve {
        /// 바인드 주소
        #[arg(long, env = "PAGECHAT_BIND", default_value = DEFAULT_BIND)]
        bind: String,

        /// 시작 전에 수집할 URL
        #[arg(long)]
        ingest_url: Option<String>,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// 상태 확인
    Status {
        /// 표시할 최근 수집 기록 수
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let service = cli.service;
    match cli.command {
        Commands::Ingest {
            url,
            chunking,
            force,
        } => cmd_ingest(&service, &url, &chunking, force).await,
        Commands::Chunks { url, chunking } => cmd_chunks(&url, &chunking).await,
        Commands::Ask {
            question,
            top_k,
            temperature,
            show_context,
        } => cmd_ask(&service, question, top_k, temperature, show_context).await,
        Commands::Serve {
            bind,
            ingest_url,
            chunking,
        } => cmd_serve(&service, &bind, ingest_url.as_deref(), &chunking).await,
        Commands::Status { limit } => cmd_status(&service, limit).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    service: &ServiceArgs,
    url: &str,
    chunking: &ChunkArgs,
    force: bool,
) -> Result<()> {
    let config = chunking.config()?;
    let pipeline = service
        .build_pipeline()
        .await
        .context("파이프라인 초기화 실패")?;

    println!("[*] 페이지 수집 중: {}", url);

    let report = pipeline
        .ingest(url, &config, force)
        .await
        .context("페이지 수집 실패")?;

    print_report(&report);

    if service.store == StoreBackend::Memory {
        println!("[!] memory 저장소는 프로세스 종료 시 사라집니다. `serve --ingest-url`을 사용하세요.");
    }

    Ok(())
}

/// 청크 미리보기 명령어 (chunks)
async fn cmd_chunks(url: &str, chunking: &ChunkArgs) -> Result<()> {
    let config = chunking.config()?;
    let scraper = WebScraper::with_timeout(FETCH_TIMEOUT).context("WebScraper 생성 실패")?;

    println!("[*] 페이지 스크래핑 중: {}", url);

    let chunks = chunk_page(&scraper, url, &config)
        .await
        .context("페이지 스크래핑 실패")?;

    if chunks.is_empty() {
        println!("[!] 추출된 텍스트가 없습니다.");
        return Ok(());
    }

    println!(
        "[OK] {} 청크 (size={}, overlap={}):\n",
        chunks.len(),
        config.chunk_size(),
        config.chunk_overlap()
    );

    for chunk in &chunks {
        println!("  #{:<4} {}", chunk.index, truncate_text(&chunk.text, 120));
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    service: &ServiceArgs,
    question: String,
    top_k: usize,
    temperature: Option<f32>,
    show_context: bool,
) -> Result<()> {
    let pipeline = service
        .build_pipeline()
        .await
        .context("파이프라인 초기화 실패")?;

    let mut request = QueryRequest::new(question).with_top_k(top_k);
    if let Some(t) = temperature {
        request = request.with_temperature(t);
    }

    println!("[*] 질문: \"{}\"", request.question);

    let response = pipeline.query(&request).await.context("질의 실패")?;

    println!("\n[OK] 답변:\n");
    println!("{}", response.answer.trim());

    if show_context {
        println!("\n[*] 사용된 컨텍스트:\n");
        for (i, part) in response.context_used.split(CONTEXT_SEPARATOR).enumerate() {
            println!("  {}. {}", i + 1, truncate_text(part, 200));
        }
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(
    service: &ServiceArgs,
    bind: &str,
    ingest_url: Option<&str>,
    chunking: &ChunkArgs,
) -> Result<()> {
    let config = chunking.config()?;
    let pipeline = service
        .build_pipeline()
        .await
        .context("파이프라인 초기화 실패")?;

    let mut chunks = Vec::new();
    if let Some(url) = ingest_url {
        println!("[*] 시작 전 페이지 수집: {}", url);
        let report = pipeline
            .ingest(url, &config, false)
            .await
            .context("페이지 수집 실패")?;
        print_report(&report);
        chunks = report.chunks;
    }

    let state = AppState::new(pipeline).with_chunks(chunks);
    server::serve(bind, state).await
}

/// 상태 명령어 (status)
async fn cmd_status(service: &ServiceArgs, limit: usize) -> Result<()> {
    println!("pagechat-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", service.data_dir().display());
    println!("[*] 저장소: {}", service.store.as_str());
    println!(
        "[*] namespace: {}",
        if service.namespace.is_empty() {
            "(default)"
        } else {
            service.namespace.as_str()
        }
    );
    println!(
        "[*] 모델: {} / {} ({} dims)",
        service.chat_model,
        service.embedding_model,
        service.embedding_dimension()
    );

    // 자격 증명 상태
    match service.check_credentials() {
        Ok(()) => println!("[OK] 자격 증명: 설정됨"),
        Err(e) => println!("[!] 자격 증명: {}", e),
    }

    // 벡터 수
    if service.store == StoreBackend::Memory {
        println!("[!] memory 저장소는 프로세스별로 비어 있습니다.");
    } else {
        match service.build_store().await {
            Ok(store) => match store.count().await {
                Ok(count) => println!("[OK] 벡터: {} 개 ({})", count, store.location()),
                Err(e) => println!("[!] 벡터 수 조회 실패: {}", e),
            },
            Err(e) => {
                tracing::debug!("벡터 저장소 연결 실패: {}", e);
                println!("[!] 벡터 저장소 연결 실패: {}", e);
            }
        }
    }

    // 최근 수집 기록
    let ledger_path = service.ledger_path();
    if service.store == StoreBackend::Memory || !ledger_path.exists() {
        println!("[!] 수집 기록이 없습니다.");
        return Ok(());
    }

    let ledger = IngestLedger::open(&ledger_path).context("수집 기록 열기 실패")?;
    let history = ledger.history(limit).context("수집 기록 조회 실패")?;

    if history.is_empty() {
        println!("[!] 수집 기록이 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 최근 수집 ({} 건):\n", history.len());
    for record in history {
        println!(
            "  v{:<4} [{}] {}",
            record.version,
            if record.namespace.is_empty() {
                "-"
            } else {
                record.namespace.as_str()
            },
            truncate_text(&record.url, 60)
        );
        println!(
            "        {} | {} chunks ({}/{}) | {}",
            record.ingested_at.format("%Y-%m-%d %H:%M"),
            record.chunk_count,
            record.chunk_size,
            record.chunk_overlap,
            if record.store.is_empty() {
                "-"
            } else {
                record.store.as_str()
            }
        );
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_report(report: &IngestReport) {
    if report.cached {
        println!(
            "[OK] 변경 없음, 기존 임베딩 사용 ({} 청크)",
            report.chunks.len()
        );
    } else {
        println!("[OK] {} 청크 수집 완료", report.chunks.len());
    }

    if let Some(version) = report.version {
        println!("     버전: v{}", version);
    }
    if report.pruned > 0 {
        println!("     이전 항목 {} 개 정리", report.pruned);
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
