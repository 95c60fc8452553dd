//! sqlbee 命令行
//!
//! 用法：sqlbee [--config FILE] [--db PATH] [--verbose] "<question>"

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures_util::StreamExt;
use sqlbee::{config::load_config, observability, SqlAgent, WorkflowEvent};

#[derive(Parser)]
#[command(name = "sqlbee")]
#[command(version)]
#[command(about = "Answer a natural-language question against a SQLite database")]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides database.path)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print every workflow event as JSON while running
    #[arg(short, long)]
    verbose: bool,

    /// The question to answer
    question: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 日志：默认 warn（--verbose 时 info），可通过 RUST_LOG 覆盖
    observability::init(if cli.verbose { "info" } else { "warn" });

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(db) = cli.db {
        cfg.database.path = Some(db);
    }

    let agent = Arc::new(SqlAgent::from_config(&cfg).context("Failed to create agent")?);

    // Ctrl-C：在下一个步骤边界结束运行
    let on_signal = Arc::clone(&agent);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.shutdown();
        }
    });

    if !cli.verbose {
        let answer = agent
            .answer(&cli.question)
            .await
            .context("Run failed")?;
        println!("{}", answer);
        return Ok(());
    }

    let mut events = Box::pin(agent.stream(cli.question));
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
        match event {
            WorkflowEvent::Done { answer, .. } => println!("\n{}", answer),
            WorkflowEvent::Error { message, .. } => anyhow::bail!("Run failed: {}", message),
            _ => {}
        }
    }
    Ok(())
}
