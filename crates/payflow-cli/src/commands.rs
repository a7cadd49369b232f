use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use payflow_core::{
    Artifact, PartitionLayout, PipelineConfig, TokioSleeper, redact_connection_string,
    resolve_process_date, warehouse_url,
};
use payflow_dashboard::{
    DashboardFilters, DashboardQuery, DashboardResult, DashboardView, PostgresSource, ViewOptions,
    build_view, render,
};
use payflow_generate::{
    CustomerDimensionBuilder, CustomerOptions, GenerateOptions, TransactionGenerator,
};
use payflow_transform::Transformer;
use payflow_warehouse::{LoadOutcome, PostgresWarehouse, WarehouseLoader};

use crate::registry::{RunManifest, RunStatus, digest_file, write_manifest};
use crate::{CliError, CommonArgs, DashboardArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Generate,
    Transform,
    BuildCustomers,
    Load,
    InitWarehouse,
    Dashboard,
    Run,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Transform => "transform",
            Stage::BuildCustomers => "build-customers",
            Stage::Load => "load",
            Stage::InitWarehouse => "init-warehouse",
            Stage::Dashboard => "dashboard",
            Stage::Run => "run",
        }
    }
}

/// Resolved settings shared by every stage of one invocation.
pub(crate) struct Context {
    pub config: PipelineConfig,
    pub config_path: Option<PathBuf>,
    pub date: NaiveDate,
    pub layout: PartitionLayout,
}

impl Context {
    pub fn from_args(args: &CommonArgs) -> Result<Self, CliError> {
        let mut config = PipelineConfig::load(args.config.as_deref())?;
        if let Some(base_dir) = &args.base_dir {
            config.base_dir = base_dir.clone();
        }
        let date = resolve_process_date(args.date.as_deref())?;
        let layout = PartitionLayout::new(config.base_dir.clone());
        Ok(Self {
            config,
            config_path: args.config.clone(),
            date,
            layout,
        })
    }
}

/// One stage execution and the manifest it leaves behind.
struct Session<'a> {
    ctx: &'a Context,
    started_at: DateTime<Utc>,
    timer: Instant,
    manifest: RunManifest,
}

impl<'a> Session<'a> {
    fn start(ctx: &'a Context, stage: Stage) -> Self {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut manifest = RunManifest::new(
            &run_id,
            stage.as_str(),
            ctx.date,
            started_at,
            ctx.layout.root(),
        );
        manifest.config_path = ctx.config_path.clone();

        info!(
            event = "stage_started",
            run_id = %run_id,
            stage = stage.as_str(),
            process_date = %ctx.date
        );

        Self {
            ctx,
            started_at,
            timer: Instant::now(),
            manifest,
        }
    }

    fn with_input(mut self, path: &Path) -> Self {
        match digest_file(path) {
            Ok(digest) => self.manifest.input = digest,
            Err(err) => warn!(
                event = "input_digest_failed",
                path = %path.display(),
                error = %err
            ),
        }
        self
    }

    fn with_connection(mut self, url: &str) -> Self {
        let connection = redact_connection_string(url);
        info!(event = "warehouse_target", connection = %connection.redacted);
        self.manifest.connection = Some(connection);
        self
    }

    /// Record a stage result: `Ok` as success with its report, `Err` as failed.
    fn complete<T: Serialize, E: Display>(self, result: &Result<T, E>) {
        match result {
            Ok(report) => self.finish(RunStatus::Success, Some(report), None),
            Err(err) => self.finish::<()>(RunStatus::Failed, None, Some(err.to_string())),
        }
    }

    fn finish<T: Serialize>(mut self, status: RunStatus, report: Option<&T>, error: Option<String>) {
        let finished_at = Utc::now();
        let duration_ms = self.timer.elapsed().as_millis() as u64;
        self.manifest.finished_at = Some(finished_at.to_rfc3339());
        self.manifest.duration_ms = Some(duration_ms);
        self.manifest.status = Some(status);
        self.manifest.error = error;
        self.manifest.report = match report.map(serde_json::to_value).transpose() {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "report_serialization_failed", error = %err);
                None
            }
        };

        let path = self
            .manifest
            .path_in(&self.ctx.layout.runs_dir(), self.started_at);
        match write_manifest(&path, &self.manifest) {
            Ok(()) => info!(
                event = "stage_finished",
                run_id = %self.manifest.run_id,
                stage = %self.manifest.stage,
                status = ?status,
                duration_ms = duration_ms,
                manifest = %path.display()
            ),
            Err(err) => warn!(
                event = "manifest_write_failed",
                run_id = %self.manifest.run_id,
                path = %path.display(),
                error = %err
            ),
        }
    }
}

pub(crate) async fn generate(ctx: &Context) -> Result<(), CliError> {
    let session = Session::start(ctx, Stage::Generate);
    let sleeper = TokioSleeper;
    let policy = ctx.config.retry.policy();
    let result = match TransactionGenerator::new(
        &ctx.config.reference,
        GenerateOptions::from_config(&ctx.config),
    ) {
        Ok(generator) => {
            generator
                .write_partition(&ctx.layout, ctx.date, &policy, &sleeper)
                .await
        }
        Err(err) => Err(err),
    };
    session.complete(&result);

    let report = result?;
    println!(
        "generated {} transactions for {} -> {}",
        report.records,
        report.process_date,
        report.path.display()
    );
    Ok(())
}

pub(crate) fn transform(ctx: &Context) -> Result<(), CliError> {
    let input = ctx.layout.artifact_path(Artifact::RawTransactions, ctx.date);
    let session = Session::start(ctx, Stage::Transform).with_input(&input);
    let result = Transformer::new(&ctx.config.reference).transform_partition(&ctx.layout, ctx.date);
    session.complete(&result.as_ref().map(|output| &output.report));

    let output = result?;
    let report = &output.report;
    println!(
        "transformed {} -> {} rows for {} ({} duplicates, {} malformed, {} rejected)",
        report.initial_records,
        report.final_records,
        ctx.date,
        report.duplicates_removed,
        report.malformed_records,
        report.rejected_total()
    );
    for (rule, count) in &report.rejected_by_rule {
        println!("  {rule}: {count}");
    }
    Ok(())
}

pub(crate) fn build_customers(ctx: &Context) -> Result<(), CliError> {
    let input = ctx
        .layout
        .artifact_path(Artifact::CleanedTransactions, ctx.date);
    let session = Session::start(ctx, Stage::BuildCustomers).with_input(&input);
    let result = CustomerDimensionBuilder::new(
        &ctx.config.reference,
        CustomerOptions::from_config(&ctx.config),
    )
    .and_then(|builder| builder.write_partition(&ctx.layout, ctx.date));
    session.complete(&result);

    let report = result?;
    println!(
        "built {} customers from {} rows for {} -> {}",
        report.customers,
        report.source_rows,
        report.process_date,
        report.path.display()
    );
    Ok(())
}

pub(crate) async fn load(ctx: &Context) -> Result<(), CliError> {
    let url = warehouse_url()?;
    let input = ctx
        .layout
        .artifact_path(Artifact::CleanedTransactions, ctx.date);
    let session = Session::start(ctx, Stage::Load)
        .with_input(&input)
        .with_connection(&url);

    let warehouse = PostgresWarehouse::new(url);
    let sleeper = TokioSleeper;
    let loader = WarehouseLoader::new(&warehouse, &ctx.layout, ctx.config.retry.policy(), &sleeper);
    let result = loader.load(ctx.date).await;
    match &result {
        Ok(outcome @ LoadOutcome::Skipped { .. }) => {
            session.finish(RunStatus::Skipped, Some(outcome), None)
        }
        _ => session.complete(&result),
    }

    match result? {
        LoadOutcome::Committed(report) => {
            let facts = report.merged.facts;
            println!(
                "loaded {} facts for {} in {} attempt(s): {} inserted, {} updated, {} unchanged",
                report.fact_rows,
                report.process_date,
                report.attempts,
                facts.inserted,
                facts.updated,
                facts.unchanged
            );
            if let Some(customers) = report.merged.customers {
                println!(
                    "customers: {} inserted, {} updated, {} unchanged",
                    customers.inserted, customers.updated, customers.unchanged
                );
            }
        }
        LoadOutcome::Skipped {
            process_date,
            reason,
        } => println!("skipped load for {process_date}: {reason}"),
    }
    Ok(())
}

pub(crate) async fn init_warehouse(ctx: &Context) -> Result<(), CliError> {
    let url = warehouse_url()?;
    let session = Session::start(ctx, Stage::InitWarehouse).with_connection(&url);
    let result = PostgresWarehouse::new(url).ensure_schema().await;
    session.complete(&result);

    result?;
    println!("warehouse schema is ready");
    Ok(())
}

pub(crate) async fn dashboard(ctx: &Context, args: &DashboardArgs) -> Result<(), CliError> {
    if args.days == 0 {
        return Err(CliError::InvalidArgs("--days must be at least 1".to_string()));
    }
    let url = warehouse_url()?;
    let end = args.to.unwrap_or(ctx.date);
    let start = match args.from {
        Some(start) => start,
        None => end
            .checked_sub_days(Days::new(u64::from(args.days - 1)))
            .ok_or_else(|| CliError::InvalidArgs(format!("--days {} is out of range", args.days)))?,
    };
    let query = DashboardQuery::new(start, end)?.with_filters(DashboardFilters {
        channel: args.channel.clone(),
        segment: args.segment.clone(),
        city: args.city.clone(),
        state: args.state.clone(),
        region: args.region.clone(),
    });
    let options = ViewOptions {
        rolling_window: args.window,
        breakdown: (!args.no_breakdown).then_some(args.breakdown),
        top_n: args.top,
    };

    let session = Session::start(ctx, Stage::Dashboard).with_connection(&url);
    let result = fetch_view(&url, &query, options).await;
    session.complete(&result.as_ref().map(|view| &view.kpis));

    let view = result?;
    println!("{}", render(&view, args.format)?);
    Ok(())
}

async fn fetch_view(
    url: &str,
    query: &DashboardQuery,
    options: ViewOptions,
) -> DashboardResult<DashboardView> {
    let source = PostgresSource::connect(url).await?;
    let view = build_view(&source, query, options).await;
    source.close().await;
    view
}

/// Every stage in order for one date; stops at the first failure.
pub(crate) async fn run(ctx: &Context) -> Result<(), CliError> {
    // Checked first so a missing connection string fails before any partition is written.
    warehouse_url()?;
    generate(ctx).await?;
    transform(ctx)?;
    build_customers(ctx)?;
    init_warehouse(ctx).await?;
    load(ctx).await
}

pub(crate) fn config_schema() -> Result<(), CliError> {
    let schema = schemars::schema_for!(PipelineConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("payflow_cli_{}", Uuid::new_v4()));
        dir
    }

    fn context(base_dir: &Path) -> Context {
        Context::from_args(&CommonArgs {
            date: Some("2025-03-01".to_string()),
            config: None,
            base_dir: Some(base_dir.to_path_buf()),
        })
        .unwrap()
    }

    fn manifests(ctx: &Context, stage: Stage) -> Vec<serde_json::Value> {
        let dir = ctx.layout.runs_dir().join(stage.as_str());
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        entries.sort();
        entries
            .iter()
            .map(|path| serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn base_dir_flag_overrides_config() {
        let base_dir = temp_base_dir();
        let ctx = context(&base_dir);
        assert_eq!(ctx.config.base_dir, base_dir);
        assert_eq!(ctx.layout.root(), base_dir.as_path());
        assert_eq!(ctx.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let err = Context::from_args(&CommonArgs {
            date: None,
            config: Some(temp_base_dir().join("payflow.toml")),
            base_dir: None,
        })
        .err()
        .unwrap();
        assert!(matches!(err, CliError::Core(payflow_core::Error::Configuration(_))));
    }

    #[tokio::test]
    async fn file_stages_write_partitions_and_manifests() {
        let base_dir = temp_base_dir();
        let ctx = context(&base_dir);

        generate(&ctx).await.unwrap();
        transform(&ctx).unwrap();
        build_customers(&ctx).unwrap();

        for artifact in [
            Artifact::RawTransactions,
            Artifact::CleanedTransactions,
            Artifact::CustomerDimension,
        ] {
            assert!(ctx.layout.artifact_path(artifact, ctx.date).exists());
        }

        let transform_runs = manifests(&ctx, Stage::Transform);
        assert_eq!(transform_runs.len(), 1);
        let manifest = &transform_runs[0];
        assert_eq!(manifest["status"], "success");
        assert_eq!(manifest["process_date"], "2025-03-01");
        assert_eq!(manifest["input"]["sha256"].as_str().unwrap().len(), 64);
        assert!(manifest["report"]["final_records"].as_u64().unwrap() > 0);
    }

    #[test]
    fn transform_stage_cleans_small_partition() {
        let base_dir = temp_base_dir();
        let ctx = context(&base_dir);
        let raw_path = ctx.layout.artifact_path(Artifact::RawTransactions, ctx.date);
        std::fs::create_dir_all(raw_path.parent().unwrap()).unwrap();
        std::fs::write(
            &raw_path,
            "\
transaction_id,date_key,customer_key,channel_key,amount,status,processing_time
T2025030100000,20250301,11,1,100.00,success,0.5
T2025030100001,20250301,12,3,-5.00,failed,1.5
",
        )
        .unwrap();

        transform(&ctx).unwrap();

        let cleaned = ctx
            .layout
            .artifact_path(Artifact::CleanedTransactions, ctx.date);
        assert!(cleaned.exists());
        let runs = manifests(&ctx, Stage::Transform);
        assert_eq!(runs[0]["status"], "success");
        assert_eq!(runs[0]["report"]["final_records"], 1);
        assert_eq!(runs[0]["report"]["rejected_by_rule"]["non_positive_amount"], 1);
    }

    #[test]
    fn failed_stage_records_error_in_manifest() {
        let base_dir = temp_base_dir();
        let ctx = context(&base_dir);

        let err = transform(&ctx).unwrap_err();
        assert!(matches!(err, CliError::Transform(_)));

        let runs = manifests(&ctx, Stage::Transform);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["status"], "failed");
        assert!(runs[0].get("input").is_none());
        assert!(runs[0]["error"].as_str().unwrap().contains("transactions.csv"));
    }
}
