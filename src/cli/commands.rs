//! CLI command implementations
//!
//! Boot sequence shared by `run` and `once`:
//! 1. Configuration load and validation
//! 2. Field set compilation
//! 3. State directory, source and target construction
//! 4. Source schema check against the inputs the field set needs
//! 5. Watermark load (once, by the coordinator)
//! 6. Skip journal and refresh cursor attachment (not for dry runs)
//!
//! Any failure before the loop starts is fatal and reported with a
//! non-zero exit.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::delivery::{DeliveryTarget, MemoryTarget};
use crate::source::RecordSource;
use crate::observability::{log_event_at, log_event_with_fields, Event, Severity};
use crate::sync::{
    CycleReport, FileSkipJournal, RefreshOutcome, SkippedRecord, SyncCoordinator, JOURNAL_FILE,
};
use crate::transform::Transformer;
use crate::watermark::WatermarkStore;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run { config } => run_loop(&config),
        Command::Once { config, dry_run } => once(&config, dry_run),
        Command::Check { config } => check(&config),
        Command::Status { config } => status(&config),
        Command::Refresh { config } => refresh(&config),
    }
}

fn runtime() -> CliResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::boot_failed(format!("failed to start runtime: {}", e)))
}

fn load_config(config_path: &Path) -> CliResult<AppConfig> {
    let config = AppConfig::load(config_path)?;
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", &config_path.display().to_string()),
            ("connector_id", &config.connector_id),
        ],
    );
    Ok(config)
}

/// Compare the inputs the field set needs with the fields the source
/// declares. Returns `"ok"`, `"unknown"` when the source declares nothing,
/// or `"unreachable"` when the source is down; the sync loop retries that.
async fn schema_check(
    source: &dyn RecordSource,
    transformer: &Transformer,
) -> Result<&'static str, String> {
    match source.describe_fields().await {
        Ok(Some(available)) => {
            transformer
                .field_set()
                .check_schema(&available)
                .map_err(|e| format!("source schema: {}", e))?;
            Ok("ok")
        }
        Ok(None) => Ok("unknown"),
        Err(e) if e.is_retryable() => {
            log_event_at(
                Severity::Warn,
                Event::SourceUnhealthy,
                &[("code", e.code()), ("reason", &e.to_string())],
            );
            Ok("unreachable")
        }
        Err(e) => Err(format!("source fields: {}", e)),
    }
}

/// Build a coordinator from configuration.
///
/// Refuses to start against a source that lacks required inputs. A dry run
/// never talks to the real target, so it needs no credentials.
async fn boot(config: &AppConfig, dry_run: bool) -> CliResult<SyncCoordinator> {
    let transformer = config.transformer()?;
    log_event_with_fields(
        Event::FieldsCompiled,
        &[("fields", &transformer.field_set().len().to_string())],
    );

    config.ensure_state_dir()?;
    let source = config.build_source()?;
    schema_check(source.as_ref(), &transformer)
        .await
        .map_err(CliError::boot_failed)?;
    let target: Arc<dyn DeliveryTarget> = if dry_run {
        Arc::new(MemoryTarget::new())
    } else {
        config.build_target()?
    };

    let mut coordinator = SyncCoordinator::new(
        config.sync.clone(),
        source,
        transformer,
        target,
        Box::new(config.watermark_store()),
    )?;

    if !dry_run {
        if let Some(journal) = config.open_journal()? {
            coordinator = coordinator.with_journal(Arc::new(journal));
        }
        coordinator = coordinator.with_refresh(Box::new(config.refresh_store()));
    }
    Ok(coordinator)
}

/// Poll until ctrl-c
pub fn run_loop(config_path: &Path) -> CliResult<()> {
    log_event_with_fields(Event::BootStart, &[("command", "run")]);
    let config = load_config(config_path)?;

    runtime()?.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut coordinator = boot(&config, false).await?.with_shutdown(shutdown_rx);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log_event_with_fields(Event::ShutdownStart, &[("signal", "ctrl_c")]);
                let _ = shutdown_tx.send(true);
            }
        });

        log_event_with_fields(
            Event::BootComplete,
            &[
                ("connector_id", &config.connector_id),
                ("watermark", &coordinator.watermark().to_string()),
                ("poll_interval_secs", &config.sync.poll_interval_secs.to_string()),
            ],
        );

        coordinator.run().await?;

        log_event_with_fields(
            Event::ShutdownComplete,
            &[("watermark", &coordinator.watermark().to_string())],
        );
        Ok::<(), CliError>(())
    })
}

/// Drain the backlog once and exit.
///
/// Exits non-zero when the last cycle needed a retry, so schedulers see
/// the failure.
pub fn once(config_path: &Path, dry_run: bool) -> CliResult<()> {
    log_event_with_fields(
        Event::BootStart,
        &[("command", "once"), ("dry_run", if dry_run { "true" } else { "false" })],
    );
    let config = load_config(config_path)?;

    runtime()?.block_on(async {
        let mut coordinator = boot(&config, dry_run).await?;

        if dry_run {
            let preview = coordinator.preview().await?;
            let postings = preview
                .postings
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            return write_response(json!({
                "dry_run": true,
                "watermark": coordinator.watermark(),
                "would_commit": preview.high,
                "capped": preview.capped,
                "postings": postings,
                "failures": skipped_json(&preview.failures)?,
            }));
        }

        let reports = coordinator.run_once().await?;
        let summary = reports
            .iter()
            .map(report_json)
            .collect::<CliResult<Vec<_>>>()?;
        write_response(json!({
            "watermark": coordinator.watermark(),
            "cycles": summary,
        }))?;

        match reports.last() {
            Some(last) if last.outcome.is_retry() => Err(CliError::sync_failed(format!(
                "cycle {} ended with {}",
                last.cycle_id, last.outcome
            ))),
            _ => Ok(()),
        }
    })
}

/// Resend one refresh slice below the watermark and exit.
///
/// Runs whether or not the poll loop has refresh enabled.
pub fn refresh(config_path: &Path) -> CliResult<()> {
    log_event_with_fields(Event::BootStart, &[("command", "refresh")]);
    let config = load_config(config_path)?;

    runtime()?.block_on(async {
        let coordinator = boot(&config, false).await?;
        let report = coordinator
            .run_refresh()
            .await
            .ok_or_else(|| CliError::sync_failed("refresh cursor not attached"))?;

        write_response(json!({
            "watermark": coordinator.watermark(),
            "refresh": serde_json::to_value(&report)?,
        }))?;

        match &report.outcome {
            RefreshOutcome::Failed { code, reason } => Err(CliError::sync_failed(format!(
                "refresh pass failed: {} ({})",
                reason, code
            ))),
            _ => Ok(()),
        }
    })
}

/// Validate configuration, compile formulas and check the source
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let transformer = config.transformer()?;

    runtime()?.block_on(async {
        let source = config.build_source()?;

        if let Err(e) = source.health_check().await {
            log_event_at(
                Severity::Error,
                Event::SourceUnhealthy,
                &[("code", e.code()), ("reason", &e.to_string())],
            );
            return Err(CliError::check_failed(format!("source health check: {}", e)));
        }
        log_event_with_fields(Event::SourceHealthy, &[("connector_id", &config.connector_id)]);

        let records = source
            .count()
            .await
            .map_err(|e| CliError::check_failed(format!("source count: {}", e)))?;

        let schema = schema_check(source.as_ref(), &transformer)
            .await
            .map_err(CliError::check_failed)?;

        write_response(json!({
            "connector_id": config.connector_id,
            "fields": transformer.field_set().names(),
            "inputs": transformer.field_set().referenced_inputs(),
            "source": "healthy",
            "records": records,
            "schema": schema,
        }))
    })
}

/// Print the committed watermark and the skip journal size
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = config.watermark_store();

    let document = store
        .read_document()
        .map_err(|e| CliError::sync_failed(format!("{} ({})", e, e.code())))?;
    let position = store
        .load()
        .map_err(|e| CliError::sync_failed(format!("{} ({})", e, e.code())))?;
    let skipped = FileSkipJournal::read_all(config.state_dir.join(JOURNAL_FILE))?.len();

    write_response(json!({
        "connector_id": config.connector_id,
        "state_dir": config.state_dir.display().to_string(),
        "watermark": position,
        "persisted": document.is_some(),
        "committed_at": document.map(|d| d.committed_at),
        "skipped_records": skipped,
    }))
}

fn skipped_json(skipped: &[SkippedRecord]) -> CliResult<Vec<Value>> {
    Ok(skipped
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?)
}

fn report_json(report: &CycleReport) -> CliResult<Value> {
    Ok(json!({
        "cycle_id": report.cycle_id.to_string(),
        "outcome": report.outcome.name(),
        "fetched": report.fetched,
        "delivered": report.delivered,
        "skipped": skipped_json(&report.skipped)?,
        "watermark_before": report.watermark_before,
        "watermark_after": report.watermark_after,
        "capped": report.capped,
        "backoff_ms": report.backoff.map(|d| d.as_millis() as u64),
        "duration_ms": report.duration.as_millis() as u64,
    }))
}
