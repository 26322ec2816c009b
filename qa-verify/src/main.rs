use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use qa_verify::metrics::RunMetrics;
use qa_verify::report::Reporter;
use qa_verify::{inventory_fulfillment_stages, load_scenario_config, ApiClient, ScenarioRunner};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
#[structopt(name = "qa-verify")]
struct Cli {
    /// API base URL, including the `/api` prefix (overrides QA_BASE_URL)
    #[structopt(long)]
    base_url: Option<String>,
    /// Login username (overrides QA_USERNAME)
    #[structopt(long)]
    username: Option<String>,
    /// Login password (overrides QA_PASSWORD)
    #[structopt(long)]
    password: Option<String>,
    /// Emit JSON run summary file path
    #[structopt(long, parse(from_os_str))]
    json: Option<PathBuf>,
    /// Emit Prometheus metrics file
    #[structopt(long, parse(from_os_str))]
    metrics_out: Option<PathBuf>,
    /// Exit non-zero when the scenario aborts before completing
    #[structopt(long)]
    fail_on_abort: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::from_args();
    let mut config = load_scenario_config()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(username) = cli.username {
        config.username = username;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }

    tracing::info!(base_url = %config.base_url, username = %config.username, "starting qa-verify");

    let client = ApiClient::new(&config.base_url)?;
    let metrics = RunMetrics::new()?;
    let runner = ScenarioRunner::new(client, config, inventory_fulfillment_stages(), metrics);

    let mut report = Reporter::stdout();
    let summary = runner.run(&mut report).await?;

    if let Some(json_path) = cli.json.as_ref() {
        let serialized = serde_json::to_string_pretty(&summary)?;
        fs::write(json_path, serialized)
            .with_context(|| format!("Failed to write JSON summary to {}", json_path.display()))?;
        tracing::info!(path = %json_path.display(), "wrote JSON summary");
    }

    if let Some(metrics_path) = cli.metrics_out.as_ref() {
        let rendered = runner.metrics().render()?;
        if let Err(e) = fs::write(metrics_path, rendered) {
            eprintln!("Failed to write metrics: {e}");
        } else {
            tracing::info!(path = %metrics_path.display(), "wrote metrics");
        }
    }

    if cli.fail_on_abort && !summary.completed() {
        eprintln!("Scenario aborted: {:?}", summary.outcome);
        std::process::exit(1);
    }

    Ok(())
}
