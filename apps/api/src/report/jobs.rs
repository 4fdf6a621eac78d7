//! Background report generation.
//!
//! A report row is created as `pending`, generation runs on a spawned task,
//! and the row ends up `completed` or `failed`. The result it describes is
//! never touched, whatever happens here.
//!
//! A task lost to a restart leaves its row `pending`; `fail_interrupted_reports`
//! runs at startup and fails those rows so clients can request a new report.

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::report::ReportRow;
use crate::models::session::ResultRow;
use crate::report::generator::ReportInput;
use crate::report::store::ReportStore;
use crate::state::AppState;

/// Inserts a pending report for `result` and spawns its generation.
/// The handle is returned so tests can wait for the task.
pub async fn queue_report(
    state: &AppState,
    result: &ResultRow,
) -> Result<(ReportRow, JoinHandle<()>), AppError> {
    let report = state.reports.create_report(result.id).await?;
    info!("Queued report {} for result {}", report.id, result.id);

    let task_state = state.clone();
    let task_result = result.clone();
    let report_id = report.id;
    let handle = tokio::spawn(async move {
        run_report(task_state, report_id, task_result).await;
    });

    Ok((report, handle))
}

/// Longer than any generation can take (three attempts at the LLM timeout
/// plus backoff), so rows still in flight elsewhere are left alone.
pub const STALE_REPORT_MINUTES: i64 = 15;

pub const INTERRUPTED_REPORT_MESSAGE: &str =
    "Report generation was interrupted; request a new report";

/// Fails `pending` reports untouched for `STALE_REPORT_MINUTES`.
pub async fn fail_interrupted_reports(reports: &dyn ReportStore) -> Result<u64, AppError> {
    let cutoff = Utc::now() - Duration::minutes(STALE_REPORT_MINUTES);
    let failed = reports
        .fail_stale_reports(cutoff, INTERRUPTED_REPORT_MESSAGE)
        .await?;
    if failed > 0 {
        warn!("Marked {failed} interrupted report(s) as failed");
    }
    Ok(failed)
}

async fn run_report(state: AppState, report_id: uuid::Uuid, result: ResultRow) {
    let outcome = generate(&state, &result).await;

    let recorded = match outcome {
        Ok(content) => {
            info!("Report {report_id} generated for result {}", result.id);
            state.reports.finish_report(report_id, &content).await
        }
        Err(e) => {
            warn!("Report {report_id} for result {} failed: {e}", result.id);
            state.reports.fail_report(report_id, &e.to_string()).await
        }
    };

    if let Err(e) = recorded {
        error!("Could not record outcome of report {report_id}: {e}");
    }
}

async fn generate(state: &AppState, result: &ResultRow) -> Result<serde_json::Value, AppError> {
    let diagnosis = state
        .store
        .load_diagnosis(result.diagnosis_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Diagnosis {} not found", result.diagnosis_id)))?;
    let answers = state.store.list_answers(result.session_id).await?;

    let input = ReportInput {
        diagnosis,
        result: result.clone(),
        answers,
    };
    let report = state.report_generator.generate(&input).await?;

    serde_json::to_value(&report)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize report: {e}")))
}
