//! Analysis worker binary.
//!
//! Usage: `vlog-worker [--mode full|sliding_window] [--memory profile.json] <chunk>...`
//!
//! Analyzes the given recording chunks (concatenated in order) and prints the
//! session report as JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vlog_llm::{create_backend, LlmConfig, RetryConfig};
use vlog_media::{check_ffmpeg, check_ffprobe, ClipExtractor};
use vlog_models::{AnalysisMode, UserMemory};
use vlog_pipeline::{AnalysisOrchestrator, AnalysisRequest, ObjectStorePublisher, PipelineConfig};
use vlog_storage::{ClipStore, ClipStoreConfig};

#[derive(Debug, Default)]
struct Args {
    mode: Option<AnalysisMode>,
    memory: Option<PathBuf>,
    chunks: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--mode" => {
                let value = iter.next().context("--mode needs a value")?;
                args.mode = Some(value.parse()?);
            }
            "--memory" => {
                let value = iter.next().context("--memory needs a path")?;
                args.memory = Some(PathBuf::from(value));
            }
            _ => args.chunks.push(PathBuf::from(arg)),
        }
    }
    if args.chunks.is_empty() {
        bail!("usage: vlog-worker [--mode full|sliding_window] [--memory profile.json] <chunk>...");
    }
    Ok(args)
}

fn init_tracing() -> Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vlog=info".parse()?)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?);

    // Logs go to stderr so stdout carries only the report.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS); an error only
    // means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        error!("vlog-worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = parse_args()?;

    info!("Starting vlog-worker");
    check_ffmpeg()?;
    check_ffprobe()?;

    let config = PipelineConfig::from_env()?;
    info!("Pipeline config: {:?}", config);
    let llm_config = LlmConfig::from_env();

    let backend = create_backend(config.provider, &llm_config)?;
    let clipper = ClipExtractor::new(config.encoding.clone()).with_timeout(config.ffmpeg_timeout_secs);
    let retry = RetryConfig::new("backend").with_max_retries(llm_config.max_retries);

    let mut orchestrator = AnalysisOrchestrator::new(backend, Arc::new(clipper), config.clone())
        .with_retry(retry);
    if let Some(store_config) = ClipStoreConfig::from_env()? {
        info!("Publishing clips to bucket {}", store_config.bucket_name);
        let store = ClipStore::new(store_config);
        orchestrator =
            orchestrator.with_publisher(Arc::new(ObjectStorePublisher::new(store, config.keep_clips)));
    }

    let memory = match &args.memory {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => UserMemory::empty(),
    };

    let mut request = AnalysisRequest::new(args.chunks).with_memory(memory);
    if let Some(mode) = args.mode {
        request = request.with_mode(mode);
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling session");
            let _ = cancel_tx.send(true);
        }
    });

    let report = orchestrator.run_session(request, cancel_rx, None).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
