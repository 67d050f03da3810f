//! Flow verification runner
//!
//! Exit status: 0 when every scenario passes, 1 when any fails, 2 when the
//! harness itself could not run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use uiflow_e2e::app::AppHandle;
use uiflow_e2e::playwright::{BrowserKind, PlaywrightBrowser};
use uiflow_e2e::{HarnessConfig, SuiteRunner};

/// Run scripted UI flows against a live application
#[derive(Parser)]
#[command(name = "uiflow-e2e")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "uiflow.toml", env = "UIFLOW_CONFIG")]
    config: PathBuf,

    /// Application base URL
    #[arg(long, env = "UIFLOW_BASE_URL")]
    base_url: Option<String>,

    /// Directory of YAML scenarios (built-in flows when omitted)
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Run only the scenario with this name
    #[arg(long, conflicts_with = "tag")]
    name: Option<String>,

    /// Run only scenarios carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Screenshot directory
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Where test-results.json is written
    #[arg(long)]
    output: Option<PathBuf>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Command that serves the application, started before the run
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    app_command: Option<Vec<String>>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, config: &mut HarnessConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(dir) = self.scenarios {
            config.scenarios_dir = Some(dir);
        }
        if let Some(dir) = self.diagnostics {
            config.diagnostics_dir = dir;
        }
        if let Some(dir) = self.output {
            config.output_dir = dir;
        }
        if let Some(browser) = self.browser {
            config.playwright.browser = browser;
        }
        if self.headed {
            config.playwright.headless = false;
        }
        if let Some(command) = self.app_command {
            config.app.command = Some(command);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = HarnessConfig::load(&cli.config)?;
    let name = cli.name.clone();
    let tag = cli.tag.clone();
    cli.apply(&mut config);
    config.validate()?;

    let _app = AppHandle::start(&config.app, &config.base_url).await?;

    let browser = PlaywrightBrowser::new(config.playwright.clone(), config.timeouts.action())?;
    let runner = SuiteRunner::new(Arc::new(browser), &config);

    let results = match (name, tag) {
        (Some(name), _) => runner.run_named(&name).await?,
        (None, Some(tag)) => runner.run_tagged(&tag).await?,
        (None, None) => runner.run_all().await?,
    };
    runner.write_results(&results)?;

    info!(
        "{} of {} scenario(s) passed; diagnostics in {}",
        results.passed,
        results.total,
        config.diagnostics_dir.display()
    );
    Ok(results.failed == 0)
}
