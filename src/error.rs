//! Crate-wide error type for operations exposed at the runtime's API boundary.
//!
//! Handler internals propagate `anyhow::Error` (see `kernel::jobs` in the
//! teacher repo for the idiom); `AppError` is reserved for the public
//! surface named in spec §6 (`runWorkerOnce`, `cancelJob`, `getQueueStats`,
//! ...).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("article {0} not found")]
    ArticleNotFound(Uuid),

    #[error("domain {0} not found")]
    DomainNotFound(Uuid),

    #[error("campaign {0} not found")]
    CampaignNotFound(Uuid),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("job {0} timed out")]
    Timeout(Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("feature {0} is disabled")]
    FeatureDisabled(String),
}

pub type AppResult<T> = Result<T, AppError>;
