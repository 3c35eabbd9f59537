use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Pendiente,
    Procesando,
    Completado,
    Fallido,
    Cancelado,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completado | JobState::Fallido | JobState::Cancelado
        )
    }
}

stored_object!(IngestionJob, "ingestion_job", {
    expediente_numero: String,
    filename: String,
    state: JobState,
    current_step: u32,
    total_steps: u32,
    progress: u8,
    message: String,
    error_details: Option<String>,
    is_cancelled: bool,
    start_ts: DateTime<Utc>,
    end_ts: Option<DateTime<Utc>>
});

pub const TOTAL_STEPS: u32 = 12;

impl IngestionJob {
    pub fn new(expediente_numero: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            expediente_numero,
            filename,
            state: JobState::Pendiente,
            current_step: 0,
            total_steps: TOTAL_STEPS,
            progress: 0,
            message: "Pendiente".to_string(),
            error_details: None,
            is_cancelled: false,
            start_ts: now,
            end_ts: None,
        }
    }

    pub async fn create_and_add_to_db(
        expediente_numero: String,
        filename: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let job = Self::new(expediente_numero, filename);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// `update(step, message)`. Idempotent on a terminal job: writes after a terminal
    /// state are ignored. Clamps both `step` (to `[0, total_steps]`) and the derived
    /// `progress` percentage (to `[0, 100]`).
    pub async fn update_progress(
        id: &str,
        step: u32,
        progress: u8,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let current = current.ok_or_else(|| AppError::NotFound("job not found".to_string()))?;

        if current.state.is_terminal() {
            return Ok(());
        }

        let clamped_step = step.min(current.total_steps);
        let clamped_progress = progress.min(100);

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/state", JobState::Procesando))
            .patch(PatchOp::replace("/current_step", clamped_step))
            .patch(PatchOp::replace("/progress", clamped_progress))
            .patch(PatchOp::replace("/message", message.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }

    async fn finish(
        id: &str,
        state: JobState,
        message: &str,
        error_details: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let current = current.ok_or_else(|| AppError::NotFound("job not found".to_string()))?;

        if current.state.is_terminal() {
            return Ok(());
        }

        let now = Utc::now();
        let progress: u8 = if matches!(state, JobState::Completado) {
            100
        } else {
            current.progress
        };

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/state", state))
            .patch(PatchOp::replace("/progress", progress))
            .patch(PatchOp::replace("/message", message.to_string()))
            .patch(PatchOp::replace("/error_details", error_details))
            .patch(PatchOp::replace("/end_ts", surrealdb::Datetime::from(now)))
            .patch(PatchOp::replace("/updated_at", surrealdb::Datetime::from(now)))
            .await?;

        Ok(())
    }

    pub async fn complete(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::finish(id, JobState::Completado, "Completado", None, db).await
    }

    pub async fn fail(id: &str, error: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::finish(id, JobState::Fallido, "Fallido", Some(error.to_string()), db).await
    }

    pub async fn cancel(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::finish(id, JobState::Cancelado, "Cancelado", None, db).await
    }

    /// Flags the cancellation checkpoint without necessarily flipping state yet; the
    /// orchestrator observes this at its cancellation checkpoints and transitions via
    /// `cancel()` the next time it checks.
    pub async fn request_cancel(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let current: Option<Self> = db.get_item(id).await?;
        let current = current.ok_or_else(|| AppError::NotFound("job not found".to_string()))?;
        if current.state.is_terminal() {
            return Ok(());
        }

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/is_cancelled", true))
            .await?;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }

    pub fn elapsed(&self) -> chrono::Duration {
        let end = self.end_ts.unwrap_or_else(Utc::now);
        end - self.start_ts
    }

    /// TTL: 3600s by default, refreshed on every write (i.e. measured from `updated_at`).
    pub fn is_expired(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        (now - self.updated_at).num_seconds() >= ttl_seconds
    }
}
