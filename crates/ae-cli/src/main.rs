use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use arrow::util::pretty::pretty_format_batches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use ae_config::AlertEvalConfig;
use ae_core::{Condition, ExecutionRequest, Frame, QueryBackend, QueryDataResponse};
use ae_runtime::Evaluator;
use ae_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "alert-eval", about = "Alert condition evaluator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a rule condition against a recorded backend response
    Eval {
        /// Path to alert-eval.toml config file
        #[arg(short, long)]
        config: PathBuf,
        /// Path to the condition JSON
        #[arg(short, long)]
        rule: PathBuf,
        /// Path to the recorded backend response JSON
        #[arg(short, long)]
        fixture: PathBuf,
        /// Evaluation time (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Print the raw query response instead of evaluated states
        #[arg(long)]
        raw: bool,
    },
    /// Parse and validate a config file
    Check {
        /// Path to alert-eval.toml config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Backend that answers every request with the same recorded response.
struct FixtureBackend {
    response: QueryDataResponse,
}

#[async_trait]
impl QueryBackend for FixtureBackend {
    async fn query_data(&self, request: ExecutionRequest) -> Result<QueryDataResponse> {
        tracing::debug!(
            domain = "exec",
            org_id = request.org_id,
            queries = request.queries.len(),
            "replaying fixture"
        );
        Ok(self.response.clone())
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))
}

fn print_frames(frames: &[Frame]) -> Result<()> {
    let batches = frames
        .iter()
        .map(|f| f.to_record_batch().map_err(|e| anyhow::anyhow!("{e}")))
        .collect::<Result<Vec<_>>>()?;
    for (frame, batch) in frames.iter().zip(&batches) {
        if !frame.name.is_empty() {
            println!("{}", frame.name);
        }
        println!("{}", pretty_format_batches(std::slice::from_ref(batch))?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Eval {
            config,
            rule,
            fixture,
            now,
            raw,
        } => {
            let config_path = config
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
            let eval_config = AlertEvalConfig::load(&config_path)?;
            let base_dir = config_path
                .parent()
                .ok_or_else(|| anyhow::anyhow!("config path has no parent directory"))?;

            let _guard = init_tracing(&eval_config.logging, base_dir)?;

            let condition =
                Condition::from_json(&read_file(&rule)?).map_err(|e| anyhow::anyhow!("{e}"))?;
            let response = QueryDataResponse::from_json(&read_file(&fixture)?)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            let now = now.unwrap_or_else(Utc::now);

            let evaluator = Evaluator::new(&eval_config, Arc::new(FixtureBackend { response }));
            tracing::info!(domain = "sys", condition = %condition.condition, %now, "evaluating");

            if raw {
                let resp = evaluator
                    .queries_and_expressions_eval(condition.org_id, &condition.data, now)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                for (ref_id, data) in &resp.responses {
                    println!("== {ref_id} ==");
                    if let Some(err) = &data.error {
                        println!("error: {err}");
                    }
                    print_frames(&data.frames)?;
                }
            } else {
                let results = evaluator
                    .condition_eval(&condition, now)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                print_frames(&[results.as_data_frame()])?;
            }

            if let Some(metrics) = evaluator.metrics() {
                println!("{}", metrics.summary_line());
            }
        }
        Commands::Check { config } => {
            let eval_config = AlertEvalConfig::load(&config)?;
            println!(
                "{}: ok (timeout={:?}, expressions_enabled={}, metrics={})",
                config.display(),
                eval_config.evaluation.timeout(),
                eval_config.evaluation.expressions_enabled,
                eval_config.metrics.enabled
            );
        }
    }

    Ok(())
}
