/// Retry/backoff knobs for the job-level retry wrapper in `IngestionPipeline::process_job`.
/// Chunking, OCR, audio, and retriever tuning now live on `AppConfig` since they're
/// operator-facing, not pipeline-internal.
#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub retry_backoff_cap_exponent: u32,
    pub max_attempts: u32,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            retry_base_delay_secs: 5,
            retry_max_delay_secs: 60,
            retry_backoff_cap_exponent: 4,
            max_attempts: 3,
        }
    }
}

pub fn retry_delay(attempt: u32, tuning: &IngestionTuning) -> std::time::Duration {
    let exponent = attempt.saturating_sub(1).min(tuning.retry_backoff_cap_exponent);
    let delay_secs = 2u64.saturating_pow(exponent).saturating_mul(tuning.retry_base_delay_secs);
    std::time::Duration::from_secs(delay_secs.min(tuning.retry_max_delay_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_caps() {
        let tuning = IngestionTuning::default();
        let first = retry_delay(1, &tuning);
        let second = retry_delay(2, &tuning);
        assert!(second > first);
        let capped = retry_delay(100, &tuning);
        assert_eq!(capped.as_secs(), tuning.retry_max_delay_secs);
    }
}
