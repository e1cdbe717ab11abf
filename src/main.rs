//! plannr-rag CLI 진입점

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use plannr_rag::cli::{run, Cli};

fn main() -> Result<()> {
    // 로그는 stderr로 (chat 모드의 stdout 답변과 섞이지 않도록)
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plannr_rag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("tokio 런타임 생성 실패")?
        .block_on(run(cli))
}
