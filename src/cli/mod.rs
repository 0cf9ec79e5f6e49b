// CLI module - the launcher's single entry point

mod output;

use crate::config::{DescriptorSet, FailurePolicy};
use crate::error::Result;
use crate::supervisor::{Supervisor, SupervisorOptions};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Convoy - launch a set of cooperating services with coupled lifetimes
#[derive(Parser)]
#[command(name = "convoy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the unit descriptor file (TOML or JSON)
    config: PathBuf,

    /// Override the shutdown grace period for every unit (seconds)
    #[arg(long, value_name = "SECS")]
    grace_period: Option<u64>,

    /// Override the dependency-wait timeout for every unit (seconds)
    #[arg(long, value_name = "SECS")]
    startup_timeout: Option<u64>,

    /// Policy when a detached unit fails: abort-all or ignore
    #[arg(long, value_name = "POLICY")]
    on_failure: Option<FailurePolicy>,

    /// Log level for the supervisor itself (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Run the CLI application; the returned value is the process exit code
    pub async fn run() -> Result<i32> {
        let cli = Cli::parse();
        cli.execute().await
    }

    async fn execute(&self) -> Result<i32> {
        init_logging(self.log_level.as_deref());

        let set = DescriptorSet::from_file(&self.config)?;

        let options = SupervisorOptions {
            grace_period_secs: self.grace_period,
            startup_timeout_secs: self.startup_timeout,
            on_detached_failure: self.on_failure,
        };

        let supervisor = Supervisor::new(set, options)?;
        let report = supervisor.run().await;

        output::print_report(&report);

        Ok(report.exit_code)
    }
}

/// Initialise the global tracing subscriber.
///
/// Level priority: `--log-level` flag, then the `CONVOY_LOG` environment
/// variable, then "info".
fn init_logging(cli_level: Option<&str>) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env("CONVOY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
