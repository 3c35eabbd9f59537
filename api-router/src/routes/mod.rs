pub mod cancel;
pub mod liveness;
pub mod progress;
pub mod query;
pub mod readiness;
pub mod sessions;
pub mod upload;
