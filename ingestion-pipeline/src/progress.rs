use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::ingestion_job::IngestionJob},
};

/// A thin, stateless view over `IngestionJob` rows. Every call round-trips to
/// SurrealDB; there is no in-process cache, so concurrent readers (the progress endpoint)
/// always see the orchestrator's latest write.
pub struct ProgressTracker<'a> {
    job_id: String,
    db: &'a SurrealDbClient,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(job_id: String, db: &'a SurrealDbClient) -> Self {
        Self { job_id, db }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn update(&self, step: u32, progress: u8, message: &str) -> Result<(), AppError> {
        IngestionJob::update_progress(&self.job_id, step, progress, message, self.db).await
    }

    pub async fn complete(&self) -> Result<(), AppError> {
        IngestionJob::complete(&self.job_id, self.db).await
    }

    pub async fn fail(&self, error: &str) -> Result<(), AppError> {
        IngestionJob::fail(&self.job_id, error, self.db).await
    }

    pub async fn cancel(&self) -> Result<(), AppError> {
        IngestionJob::cancel(&self.job_id, self.db).await
    }

    /// Checkpoint helper: returns `Err(AppError::Cancelled)` the moment a cancellation has
    /// been requested, without itself flipping the job to `Cancelado` — the orchestrator
    /// does that once, at the point it stops.
    pub async fn check_cancelled(&self) -> Result<(), AppError> {
        let job: Option<IngestionJob> = self.db.get_item(&self.job_id).await?;
        let job = job.ok_or_else(|| AppError::NotFound("ingestion job not found".into()))?;
        if job.is_cancelled() {
            return Err(AppError::Cancelled(self.job_id.clone()));
        }
        Ok(())
    }

    /// `GET progress` view: `None` once the job is past its TTL, matching the 404 rule.
    pub async fn fetch(&self, ttl_seconds: u64) -> Result<Option<IngestionJob>, AppError> {
        let job: Option<IngestionJob> = self.db.get_item(&self.job_id).await?;
        Ok(job.filter(|j| !j.is_expired(ttl_seconds as i64, chrono::Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn check_cancelled_errors_once_flagged() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let job = IngestionJob::create_and_add_to_db("21-004512-0166-PE".into(), "a.pdf".into(), &db)
            .await
            .expect("create");
        let tracker = ProgressTracker::new(job.id.clone(), &db);

        tracker.check_cancelled().await.expect("not cancelled yet");

        IngestionJob::request_cancel(&job.id, &db).await.expect("request cancel");
        let err = tracker.check_cancelled().await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }

    #[tokio::test]
    async fn fetch_hides_expired_jobs() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let job = IngestionJob::create_and_add_to_db("21-004512-0166-PE".into(), "a.pdf".into(), &db)
            .await
            .expect("create");
        let tracker = ProgressTracker::new(job.id.clone(), &db);

        assert!(tracker.fetch(3600).await.expect("fetch").is_some());
        assert!(tracker.fetch(0).await.expect("fetch expired").is_none());
    }
}
