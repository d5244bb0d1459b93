use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use stepchain_cli::config::EngineConfig;
use stepchain_cli::executors::{BridgeBrowserExecutor, HttpApiExecutor, NoopBrowserExecutor};
use stepchain_cli::runner::ScenarioRunner;
use stepchain_cli::scenario;
use stepchain_dispatcher::{BrowserExecutor, ContextManager, Dispatcher};
use stepchain_router::{LlmClassifier, Router, StepClassifier};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run natural-language test scenarios against live services.
#[derive(Parser, Debug)]
#[command(name = "stepchain", version, about)]
struct Cli {
    /// Scenario files (YAML), executed in order.
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,

    /// JSON config file; defaults plus STEPCHAIN_* env overrides otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run scenarios carrying this tag.
    #[arg(short, long)]
    tag: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    let mut scenarios = Vec::new();
    for path in &cli.scenarios {
        scenarios.extend(scenario::load_file(path)?);
    }
    if scenarios.is_empty() {
        bail!("no scenarios to run");
    }

    let llm: Option<Arc<dyn StepClassifier>> = match config.llm_classifier_config() {
        Some(llm_config) => match LlmClassifier::new(llm_config) {
            Ok(classifier) => Some(Arc::new(classifier)),
            Err(err) => {
                warn!(error = %err, "LLM lane disabled, using keyword classification only");
                None
            }
        },
        None => None,
    };
    let router = Router::new(llm, config.router_config());

    let api = Arc::new(
        HttpApiExecutor::new(config.http_timeout()).context("building API executor")?,
    );
    let browser: Arc<dyn BrowserExecutor> = match &config.browser_bridge_url {
        Some(url) => Arc::new(
            BridgeBrowserExecutor::new(url, config.http_timeout())
                .context("building browser bridge")?,
        ),
        None => Arc::new(NoopBrowserExecutor),
    };

    let dispatcher = Dispatcher::new(router, api, browser.clone());
    let manager = ContextManager::new(browser);
    let runner = ScenarioRunner::new(dispatcher, manager);

    info!(count = scenarios.len(), "starting scenario run");
    let summary = runner.run_all(&scenarios, cli.tag.as_deref()).await;

    println!(
        "{} passed, {} failed ({} scenario(s))",
        summary.passed,
        summary.failed,
        summary.reports.len()
    );
    for report in &summary.reports {
        if let Some(failure) = &report.failure {
            println!("  FAILED {}: {}", report.name, failure);
        }
    }

    if !summary.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
