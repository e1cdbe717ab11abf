//! CLI 모듈
//!
//! plannr-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Config;
use crate::knowledge::{DocumentStore, SqliteDocumentStore, Vendor, Venue};
use crate::llm::ChatTurn;
use crate::rag::RagService;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "plannr-rag")]
#[command(version, about = "이벤트 플래닝 어시스턴트 RAG 백엔드", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문 한 번에 답변
    Ask {
        /// 질문
        question: String,

        /// 검색된 근거 청크도 출력
        #[arg(short, long)]
        sources: bool,
    },

    /// 대화형 모드 (기록은 이 프로세스가 보관)
    Chat,

    /// 코퍼스 갱신 (장소/업체 반영 → 청킹 → 임베딩 → 스냅샷 교체)
    Refresh,

    /// 코퍼스 원문 파일 업로드
    ImportText {
        /// 원문 텍스트 파일
        file: PathBuf,
    },

    /// 코퍼스 원문을 파일로 내보내기
    ExportText {
        /// 저장할 파일 경로
        file: PathBuf,
    },

    /// 장소/업체 레코드 JSON 업로드 (기존 레코드 교체)
    ImportDirectory {
        /// 장소 목록 JSON 파일
        #[arg(long)]
        venues: Option<PathBuf>,

        /// 업체 목록 JSON 파일
        #[arg(long)]
        vendors: Option<PathBuf>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();

    match cli.command {
        Commands::Ask { question, sources } => cmd_ask(config, &question, sources).await,
        Commands::Chat => cmd_chat(config).await,
        Commands::Refresh => cmd_refresh(config).await,
        Commands::ImportText { file } => cmd_import_text(&config, &file).await,
        Commands::ExportText { file } => cmd_export_text(&config, &file).await,
        Commands::ImportDirectory { venues, vendors } => {
            cmd_import_directory(&config, venues, vendors).await
        }
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 단일 질의 명령어 (ask)
async fn cmd_ask(config: Config, question: &str, sources: bool) -> Result<()> {
    let service = start_service(config).await?;

    if sources {
        let chunks = service.retrieve(question).await.context("검색 실패")?;
        println!("[*] 근거 청크 ({} 건):", chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            println!("  {}. {}", i + 1, truncate_text(chunk.text(), 120));
        }
        println!();
    }

    let answer = service
        .answer(question, None)
        .await
        .context("답변 생성 실패")?;
    println!("{}", answer);

    service.shutdown().await;
    Ok(())
}

/// 대화형 명령어 (chat)
///
/// 서비스는 상태를 갖지 않으므로 대화 기록은 여기서 쌓아 매 요청에 넘깁니다.
async fn cmd_chat(config: Config) -> Result<()> {
    let service = start_service(config).await?;

    println!("[OK] 대화를 시작합니다. 종료: exit 또는 Ctrl-D");

    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match service.answer(question, Some(history.as_slice())).await {
            Ok(answer) => {
                println!("{}", answer);
                history.push(ChatTurn::user(question));
                history.push(ChatTurn::assistant(answer));
            }
            Err(e) => {
                println!("[!] 답변 실패 ({:?}): {}", e.kind(), e);
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

/// 갱신 명령어 (refresh)
async fn cmd_refresh(config: Config) -> Result<()> {
    let service = start_service(config).await?;

    println!("[*] 코퍼스 갱신 중...");
    let report = service.refresh().await.context("코퍼스 갱신 실패")?;

    println!("[OK] 갱신 완료: {} 청크", report.chunks);
    println!(
        "     원문: {}",
        if report.text_updated { "변경됨" } else { "변경 없음" }
    );
    println!(
        "     장소 {} 건, 업체 {} 건 반영",
        report.venues, report.vendors
    );
    if report.duplicates_removed > 0 {
        println!("     중복 스냅샷 {} 개 삭제", report.duplicates_removed);
    }

    service.shutdown().await;
    Ok(())
}

/// 원문 업로드 명령어 (import-text)
async fn cmd_import_text(config: &Config, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", file.display()))?;
    if text.trim().is_empty() {
        bail!("빈 파일입니다: {}", file.display());
    }

    let store = open_store(config)?;
    store
        .store_raw_text(&text)
        .await
        .context("원문 저장 실패")?;

    println!("[OK] 원문 저장됨 ({})", format_bytes(text.len()));
    println!("     반영하려면 `plannr-rag refresh`를 실행하세요");
    Ok(())
}

/// 원문 내보내기 명령어 (export-text)
async fn cmd_export_text(config: &Config, file: &Path) -> Result<()> {
    let store = open_store(config)?;
    let text = store.load_raw_text().await.context("원문 조회 실패")?;

    tokio::fs::write(file, &text)
        .await
        .with_context(|| format!("파일 쓰기 실패: {}", file.display()))?;

    println!(
        "[OK] 원문 내보냄: {} ({})",
        file.display(),
        format_bytes(text.len())
    );
    Ok(())
}

/// 장소/업체 업로드 명령어 (import-directory)
async fn cmd_import_directory(
    config: &Config,
    venues: Option<PathBuf>,
    vendors: Option<PathBuf>,
) -> Result<()> {
    if venues.is_none() && vendors.is_none() {
        bail!("--venues 또는 --vendors 중 하나 이상을 지정해야 합니다");
    }

    let store = open_store(config)?;

    if let Some(path) = venues {
        let records: Vec<Venue> = read_json(&path).await?;
        let count = store
            .replace_venues(records)
            .await
            .context("장소 저장 실패")?;
        println!("[OK] 장소 {} 건 저장됨", count);
    }

    if let Some(path) = vendors {
        let records: Vec<Vendor> = read_json(&path).await?;
        let count = store
            .replace_vendors(records)
            .await
            .context("업체 저장 실패")?;
        println!("[OK] 업체 {} 건 저장됨", count);
    }

    println!("     반영하려면 `plannr-rag refresh`를 실행하세요");
    Ok(())
}

/// 상태 명령어 (status)
///
/// API 키 없이도 저장소 상태를 확인합니다.
async fn cmd_status(config: &Config) -> Result<()> {
    println!("plannr-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 모델: 임베딩 {}, 답변 {}, 요약 {}",
        config.embed_model, config.answer_model, config.summary_model
    );
    println!(
        "[*] 검색: top_k {}, 청크 크기 {}자",
        config.top_k, config.chunk_size
    );

    for (name, present, env_var) in [
        ("Nomic", config.nomic_api_key.is_some(), "NOMIC_API_KEY"),
        ("Groq", config.groq_api_key.is_some(), "GROQ_API_KEY"),
    ] {
        if present {
            println!("[OK] {} API 키: 설정됨", name);
        } else {
            println!("[!] {} API 키: 미설정", name);
            println!("    설정: export {}=your-key", env_var);
        }
    }

    let store = match open_store(config) {
        Ok(store) => store,
        Err(e) => {
            println!("[!] 저장소 열기 실패: {:#}", e);
            return Ok(());
        }
    };

    match store.stats().await {
        Ok(stats) => {
            match stats.raw_text_bytes {
                Some(bytes) => println!("[OK] 코퍼스 원문: {}", format_bytes(bytes)),
                None => println!("[!] 코퍼스 원문: 없음 (import-text 필요)"),
            }
            println!(
                "[OK] 벡터 스냅샷: {} 청크 (스냅샷 {} 개)",
                stats.vector_count, stats.snapshot_count
            );
            match stats.snapshot_current {
                Some(true) => println!("     스냅샷이 현재 원문과 일치합니다"),
                Some(false) => println!("[!] 스냅샷이 오래되었습니다 (refresh 필요)"),
                None => println!("[!] 스냅샷 없음 (refresh 필요)"),
            }
            println!(
                "[OK] 장소 {} 건, 업체 {} 건",
                stats.venue_count, stats.vendor_count
            );
        }
        Err(e) => {
            println!("[!] 통계 조회 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// API 키 확인 후 서비스 시작
async fn start_service(config: Config) -> Result<RagService> {
    if config.nomic_api_key.is_none() || config.groq_api_key.is_none() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export NOMIC_API_KEY=your-nomic-key\n  \
             export GROQ_API_KEY=your-groq-key\n\n\
             API 키 발급:\n  \
             https://atlas.nomic.ai\n  \
             https://console.groq.com/keys"
        );
    }

    RagService::start(config)
        .await
        .context("RAG 서비스 시작 실패")
}

/// 문서 저장소 열기
fn open_store(config: &Config) -> Result<SqliteDocumentStore> {
    let path = config.db_path();
    SqliteDocumentStore::open(&path)
        .with_context(|| format!("저장소 열기 실패: {}", path.display()))
}

/// JSON 레코드 파일 읽기
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("JSON 파싱 실패: {}", path.display()))
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

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["plannr-rag", "ask", "Venues in Dhaka?", "--sources"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ask { ref question, sources: true } if question == "Venues in Dhaka?"
        ));

        let cli = Cli::try_parse_from([
            "plannr-rag",
            "import-directory",
            "--venues",
            "venues.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ImportDirectory { venues: Some(_), vendors: None }
        ));
    }

    #[tokio::test]
    async fn test_import_export_text() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let input = dir.path().join("corpus.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "=== PLATFORM USAGE GUIDE ===\n안내문\n").unwrap();

        cmd_import_text(&config, &input).await.unwrap();
        cmd_export_text(&config, &output).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "=== PLATFORM USAGE GUIDE ===\n안내문\n"
        );
    }

    #[tokio::test]
    async fn test_import_empty_text_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("empty.txt");
        std::fs::write(&input, "  \n").unwrap();

        assert!(cmd_import_text(&config(&dir), &input).await.is_err());
    }

    #[tokio::test]
    async fn test_import_directory() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let venues = dir.path().join("venues.json");
        std::fs::write(
            &venues,
            r#"[{"venueName": "Grand Hall", "location": "Dhaka"}]"#,
        )
        .unwrap();

        cmd_import_directory(&config, Some(venues), None)
            .await
            .unwrap();

        let stats = open_store(&config).unwrap().stats().await.unwrap();
        assert_eq!(stats.venue_count, 1);
        assert_eq!(stats.vendor_count, 0);

        assert!(cmd_import_directory(&config, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_start_service_requires_keys() {
        let dir = TempDir::new().unwrap();
        let err = start_service(config(&dir)).await.err().unwrap();
        assert!(err.to_string().contains("NOMIC_API_KEY"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("ভেন্যু তালিকা", 3), "ভেন...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
