mod cache;
mod config;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use extract::{
    ChatCompletionClient, Extractor, JsonlSink, LlmGateway, OllamaClient, TripletRecord,
    TripletSink,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cache::CachedGateway;
use crate::config::{AppConfig, LlmConfig, LlmProvider, OperationMode};
use crate::metrics::{Metrics, TimedOperation};

#[derive(Parser)]
#[command(name = "triplets")]
#[command(about = "Extract (subject, predicate, object) triplets from text with an LLM", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract triplets from a .txt/.md file or a directory of them.
    Extract(ExtractArgs),
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(short, long)]
    input: PathBuf,
    /// JSON lines file that triplet records are appended to.
    #[arg(short, long)]
    output: PathBuf,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    mode: Option<OperationMode>,
    /// One model call per chunk instead of the multi-stage pipeline.
    #[arg(long)]
    direct: bool,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    max_retries: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Extract(args) => run_extract(args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn resolve_config(args: &ExtractArgs) -> Result<AppConfig> {
    resolve_config_with(args, |key| std::env::var(key).ok())
}

/// File and preset, then `lookup` for `TRIPLETS_LLM_*`, then flags.
fn resolve_config_with<F>(args: &ExtractArgs, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AppConfig::load(args.config.as_deref(), args.mode)?;
    config.apply_overrides(lookup)?;

    if args.direct {
        config.pipeline.direct = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency.max_concurrent_chunks = concurrency;
    }
    if let Some(max_retries) = args.max_retries {
        config.pipeline.max_retries = max_retries;
    }

    config.validate()?;
    Ok(config)
}

fn build_gateway(llm: &LlmConfig) -> Result<Arc<dyn LlmGateway>> {
    let timeout = Duration::from_secs(llm.request_timeout_secs);
    let gateway: Arc<dyn LlmGateway> = match llm.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::with_timeout(
            llm.base_url().to_string(),
            llm.model.clone().unwrap_or_else(|| "llama3".to_string()),
            timeout,
        )?),
        LlmProvider::OpenAi => {
            let mut client = ChatCompletionClient::new(llm.base_url(), timeout)?;
            if let Some(model) = &llm.model {
                client = client.model(model);
            }
            if let Some(key) = &llm.api_key {
                client = client.api_key(key);
            }
            if let Some(group) = &llm.resource_group {
                client = client.header("AI-Resource-Group", group);
            }
            Arc::new(client)
        }
    };
    Ok(gateway)
}

async fn run_extract(args: ExtractArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    info!(
        mode = ?config.mode,
        provider = ?config.llm.provider,
        base_url = config.llm.base_url(),
        direct = config.pipeline.direct,
        concurrency = config.concurrency.max_concurrent_chunks,
        max_retries = config.pipeline.max_retries,
        "Starting extraction"
    );

    let mut gateway = build_gateway(&config.llm)?;
    let cache = config.cache.enabled.then(|| {
        Arc::new(CachedGateway::new(
            gateway.clone(),
            config.cache.max_entries,
            Duration::from_secs(config.cache.ttl_secs),
        ))
    });
    if let Some(cache) = &cache {
        gateway = cache.clone();
    }

    let extractor = if config.pipeline.direct {
        Extractor::direct(gateway, config.concurrency.max_concurrent_chunks)
    } else {
        Extractor::orchestrated(gateway, config.orchestrator_config())
    };

    let documents = ingest::ingest_path(&args.input, config.chunker_config()).await?;
    if documents.is_empty() {
        warn!(input = ?args.input, "No .txt or .md documents found");
    }

    let sink = JsonlSink::new(&args.output);
    let metrics = Metrics::new();

    for document in &documents {
        let timer = TimedOperation::start();
        let reports = extractor.extract_reports(&document.texts()).await;

        for report in &reports {
            metrics.record_chunk(report);
        }
        let records = TripletRecord::from_chunk_results(
            &document.ref_id,
            document
                .chunks
                .iter()
                .zip(&reports)
                .map(|(chunk, report)| (chunk.chunk_index, report.triplets.as_slice())),
        );
        sink.write(&records).await?;
        metrics.record_document(timer.elapsed());

        info!(
            source = %document.source,
            ref_id = %document.ref_id,
            chunks = document.chunks.len(),
            triplets = records.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Document processed"
        );
    }

    let snapshot = metrics.snapshot();
    info!(metrics = %serde_json::to_string(&snapshot)?, "Extraction finished");
    if let Some(cache) = &cache {
        info!(cache = %serde_json::to_string(&cache.stats())?, "LLM cache stats");
    }
    info!(output = ?sink.path(), "Triplet records written");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn parse(args: &[&str]) -> ExtractArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Extract(args) => args,
        }
    }

    #[test]
    fn flags_override_the_preset() {
        let args = parse(&[
            "triplets", "extract", "--input", "docs", "--output", "out.jsonl",
            "--mode", "accurate", "--concurrency", "7", "--max-retries", "1", "--direct",
        ]);
        let config = resolve_config_with(&args, no_env).unwrap();

        assert_eq!(config.mode, OperationMode::Accurate);
        assert_eq!(config.concurrency.max_concurrent_chunks, 7);
        assert_eq!(config.pipeline.max_retries, 1);
        assert!(config.pipeline.direct);
        assert!(config.pipeline.repair_malformed_json);
    }

    #[test]
    fn log_json_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "triplets", "extract", "-i", "a.txt", "-o", "out.jsonl", "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let args = parse(&[
            "triplets", "extract", "--input", "a.txt", "--output", "out.jsonl", "--concurrency", "0",
        ]);
        assert!(resolve_config_with(&args, no_env).is_err());
    }

    #[test]
    fn env_sits_between_file_and_flags() {
        let args = parse(&[
            "triplets", "extract", "--input", "a.txt", "--output", "out.jsonl",
        ]);
        let config = resolve_config_with(&args, |key| {
            (key == "TRIPLETS_LLM_MODEL").then(|| "mistral".to_string())
        })
        .unwrap();

        assert_eq!(config.llm.model.as_deref(), Some("mistral"));
        assert_eq!(config.mode, OperationMode::Balanced);
    }

    #[test]
    fn chat_gateway_builds_with_resource_group() {
        let llm = LlmConfig {
            provider: LlmProvider::OpenAi,
            base_url: Some("http://localhost:9/v1".to_string()),
            model: Some("gpt-4o".to_string()),
            api_key: Some("secret".to_string()),
            resource_group: Some("demo".to_string()),
            request_timeout_secs: 5,
        };
        assert!(build_gateway(&llm).is_ok());
    }
}
