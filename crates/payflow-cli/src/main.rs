mod commands;
mod registry;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use payflow_core::Error as CoreError;
use payflow_dashboard::{DashboardError, Dimension, OutputFormat};
use payflow_generate::GenerationError;
use payflow_transform::TransformError;
use payflow_warehouse::LoadError;
use thiserror::Error;

use commands::{Context, Stage};

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
    #[error("dashboard failed: {0}")]
    Dashboard(#[from] DashboardError),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "payflow",
    version,
    about = "Daily batch pipeline for payment transactions"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the raw transaction partition for a day.
    Generate(CommonArgs),
    /// Validate and clean a raw partition.
    Transform(CommonArgs),
    /// Build the customer dimension from a cleaned partition.
    BuildCustomers(CommonArgs),
    /// Merge a day's processed partitions into the warehouse.
    Load(CommonArgs),
    /// Create the warehouse tables if they are missing.
    InitWarehouse(CommonArgs),
    /// Report aggregates from the warehouse.
    Dashboard(DashboardArgs),
    /// Run generate, transform, build-customers and load for one day.
    Run(CommonArgs),
    /// Print the JSON Schema of the config file.
    ConfigSchema,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct CommonArgs {
    /// Process date; defaults to yesterday.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,
    /// Pipeline config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Overrides the configured base directory.
    #[arg(long, value_name = "PATH")]
    pub base_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct DashboardArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// First day of the range; defaults to `--days` before `--to`.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: Option<NaiveDate>,
    /// Last day of the range; defaults to the process date.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: Option<NaiveDate>,
    /// Range length used when `--from` is omitted.
    #[arg(long, default_value_t = 30)]
    pub days: u32,
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub segment: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    /// channel, segment, region, state or city.
    #[arg(long, default_value = "channel")]
    pub breakdown: Dimension,
    /// Skip the breakdown query.
    #[arg(long, default_value_t = false)]
    pub no_breakdown: bool,
    /// Rows kept in the breakdown, ranked by fee revenue.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
    /// Rolling average window in days.
    #[arg(long, default_value_t = 7)]
    pub window: usize,
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(event = "run_failed", error = %err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command) -> Result<(), CliError> {
    let (stage, common) = match &command {
        Command::ConfigSchema => return commands::config_schema(),
        Command::Generate(args) => (Stage::Generate, args),
        Command::Transform(args) => (Stage::Transform, args),
        Command::BuildCustomers(args) => (Stage::BuildCustomers, args),
        Command::Load(args) => (Stage::Load, args),
        Command::InitWarehouse(args) => (Stage::InitWarehouse, args),
        Command::Dashboard(args) => (Stage::Dashboard, &args.common),
        Command::Run(args) => (Stage::Run, args),
    };

    let ctx = Context::from_args(common)?;
    let log_path = registry::init_stage_logging(&ctx.layout.logs_dir(), stage.as_str())?;
    tracing::info!(
        event = "cli_started",
        command = stage.as_str(),
        process_date = %ctx.date,
        base_dir = %ctx.layout.root().display(),
        log_path = %log_path.display()
    );

    match command {
        Command::Generate(_) => commands::generate(&ctx).await,
        Command::Transform(_) => commands::transform(&ctx),
        Command::BuildCustomers(_) => commands::build_customers(&ctx),
        Command::Load(_) => commands::load(&ctx).await,
        Command::InitWarehouse(_) => commands::init_warehouse(&ctx).await,
        Command::Dashboard(args) => commands::dashboard(&ctx, &args).await,
        Command::Run(_) => commands::run(&ctx).await,
        Command::ConfigSchema => commands::config_schema(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dashboard_flags_parse_into_typed_values() {
        let cli = Cli::try_parse_from([
            "payflow",
            "dashboard",
            "--from",
            "2025-03-01",
            "--breakdown",
            "region",
            "--format",
            "json",
            "--base-dir",
            "/tmp/payflow",
        ])
        .unwrap();

        let Command::Dashboard(args) = cli.command else {
            panic!("expected dashboard command");
        };
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(args.breakdown, Dimension::Region);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.common.base_dir, Some(PathBuf::from("/tmp/payflow")));
    }

    #[test]
    fn unknown_breakdown_is_rejected() {
        let err = Cli::try_parse_from(["payflow", "dashboard", "--breakdown", "planet"]);
        assert!(err.is_err());
    }
}
