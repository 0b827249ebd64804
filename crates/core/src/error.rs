use std::fmt;

/// Conditions the engines surface to callers. Anything that is plumbing
/// (SQL, HTTP, config) travels inside `Storage` as an `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already processed (status={status})")]
    AlreadyProcessed {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("{entity} {id} cannot transition from {from} to {to}")]
    InvalidState {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("ad platform call failed: {0}")]
    Platform(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn already_processed(
        entity: &'static str,
        id: impl fmt::Display,
        status: impl fmt::Display,
    ) -> Self {
        Self::AlreadyProcessed {
            entity,
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl fmt::Display,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn platform(err: &anyhow::Error) -> Self {
        Self::Platform(format!("{err:#}"))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
