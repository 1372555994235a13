//! Trigger error taxonomy
//!
//! Every failure surfaced by the orchestrator is a [`TriggerError`]. Callers
//! branch on [`TriggerError::kind`] rather than on message text, e.g. to map
//! an image path conflict to a conflict response.

use stagehand_core::domain::workflow::TransitionError;
use thiserror::Error;

use crate::repository::ReservationError;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Message stored on a run rejected by the vulnerability gate
pub const FOUND_VULNERABILITY: &str = "Found vulnerability on image";

/// Coarse classification of a [`TriggerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported storage provider, missing host URL and similar setup problems
    Configuration,
    /// A pipeline, environment, app, workflow or snapshot does not exist
    UpstreamNotFound,
    /// Stored data cannot be interpreted (material info, plugin inputs, state)
    DataIntegrity,
    /// A destination image path is already claimed
    Conflict,
    /// Vulnerability gate, feasibility filters or GitOps validation rejected the trigger
    PolicyGate,
    /// The workflow execution service rejected or did not answer the request
    Dispatch,
    /// Own records could not be read or written
    Persistence,
    /// An upstream collaborator failed
    Collaborator,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("modifications not found for ci pipeline {pipeline_id}")]
    ModificationsNotFound { pipeline_id: i64 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("image path {image_path} is already in use")]
    ImagePathInUse { image_path: String },

    #[error("found vulnerability for image digest {digest}")]
    Vulnerable { digest: String },

    #[error("trigger blocked: {0}")]
    Blocked(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{context}: {cause:#}")]
    Collaborator {
        context: String,
        cause: anyhow::Error,
    },
}

impl TriggerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::NotFound { .. } => ErrorKind::UpstreamNotFound,
            Self::ModificationsNotFound { .. } | Self::InvalidData(_) | Self::Transition(_) => {
                ErrorKind::DataIntegrity
            }
            Self::ImagePathInUse { .. } => ErrorKind::Conflict,
            Self::Vulnerable { .. } | Self::Blocked(_) => ErrorKind::PolicyGate,
            Self::Dispatch(_) => ErrorKind::Dispatch,
            Self::Database(_) => ErrorKind::Persistence,
            Self::Collaborator { .. } => ErrorKind::Collaborator,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Message recorded on a run that fails with this error
    pub fn run_message(&self) -> String {
        match self {
            Self::Vulnerable { .. } => FOUND_VULNERABILITY.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ReservationError> for TriggerError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Conflict { image_path } => Self::ImagePathInUse { image_path },
            ReservationError::Database(e) => Self::Database(e),
        }
    }
}

/// Converts collaborator results into [`TriggerError`]s
pub(crate) trait CollaboratorResultExt<T> {
    /// Wraps a collaborator failure with `context`
    fn collaborator(self, context: &str) -> Result<T>;
}

impl<T> CollaboratorResultExt<T> for anyhow::Result<T> {
    fn collaborator(self, context: &str) -> Result<T> {
        self.map_err(|cause| TriggerError::Collaborator {
            context: context.to_string(),
            cause,
        })
    }
}

/// Converts `Ok(None)` lookups into [`TriggerError::NotFound`]
pub(crate) trait LookupResultExt<T> {
    fn found(self, entity: &'static str, id: impl ToString) -> Result<T>;
}

impl<T> LookupResultExt<T> for anyhow::Result<Option<T>> {
    fn found(self, entity: &'static str, id: impl ToString) -> Result<T> {
        let id = id.to_string();
        match self {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(TriggerError::NotFound { entity, id }),
            Err(cause) => Err(TriggerError::Collaborator {
                context: format!("failed to load {entity} {id}"),
                cause,
            }),
        }
    }
}

impl<T> LookupResultExt<T> for std::result::Result<Option<T>, sqlx::Error> {
    fn found(self, entity: &'static str, id: impl ToString) -> Result<T> {
        self?.ok_or_else(|| TriggerError::not_found(entity, id))
    }
}
