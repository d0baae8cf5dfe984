use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("store error: {0}")]
    Store(#[from] postpilot_store::StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] postpilot_scheduler::SchedulerError),
}
