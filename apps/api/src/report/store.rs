use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::db::PgStore;
use crate::errors::AppError;
use crate::models::report::{ReportRow, REPORT_COMPLETED, REPORT_FAILED, REPORT_PENDING};

/// Persistence for generated reports. Reports live beside results and never
/// modify them.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Inserts a `pending` report for a result.
    async fn create_report(&self, result_id: Uuid) -> Result<ReportRow, AppError>;

    async fn finish_report(&self, report_id: Uuid, content: &Value) -> Result<(), AppError>;

    async fn fail_report(&self, report_id: Uuid, message: &str) -> Result<(), AppError>;

    /// Most recently created report for a result.
    async fn latest_report(&self, result_id: Uuid) -> Result<Option<ReportRow>, AppError>;

    /// Fails every `pending` report last touched before `updated_before`.
    /// Returns how many rows changed.
    async fn fail_stale_reports(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError>;
}

#[async_trait]
impl ReportStore for PgStore {
    async fn create_report(&self, result_id: Uuid) -> Result<ReportRow, AppError> {
        Ok(sqlx::query_as::<_, ReportRow>(
            r#"
            INSERT INTO diagnosis_reports (id, result_id, status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(result_id)
        .bind(REPORT_PENDING)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn finish_report(&self, report_id: Uuid, content: &Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE diagnosis_reports
            SET status = $1, content = $2, error_message = NULL, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(REPORT_COMPLETED)
        .bind(content)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_report(&self, report_id: Uuid, message: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE diagnosis_reports
            SET status = $1, error_message = $2, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(REPORT_FAILED)
        .bind(message)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_report(&self, result_id: Uuid) -> Result<Option<ReportRow>, AppError> {
        Ok(sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT * FROM diagnosis_reports
            WHERE result_id = $1
            ORDER BY created_at DESC, id
            LIMIT 1
            "#,
        )
        .bind(result_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn fail_stale_reports(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE diagnosis_reports
            SET status = $1, error_message = $2, updated_at = now()
            WHERE status = $3 AND updated_at < $4
            "#,
        )
        .bind(REPORT_FAILED)
        .bind(message)
        .bind(REPORT_PENDING)
        .bind(updated_before)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected())
    }
}
