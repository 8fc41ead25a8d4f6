use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{offload::ObjectStoreError, repos::RepoError, sync::SyncError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Error chain of a failure, outermost first, for structured logs.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn joined(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Update or status change matched no row owned by the caller.
    #[error("content not found or not owned by caller")]
    NotFoundOrForbidden,
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Sync(SyncError),
    #[error("offloaded body could not be loaded")]
    Object(#[from] ObjectStoreError),
}

impl ContentError {
    /// Draft persisted, propagation incomplete. Repeating the same publish repairs it.
    pub fn is_partial(&self) -> bool {
        matches!(self, ContentError::Sync(err) if err.is_partial())
    }
}

impl From<RepoError> for ContentError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFoundOrForbidden => ContentError::NotFoundOrForbidden,
            other => ContentError::Repo(other),
        }
    }
}

impl From<SyncError> for ContentError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Draft(RepoError::NotFoundOrForbidden)
            | SyncError::Transaction(RepoError::NotFoundOrForbidden) => {
                ContentError::NotFoundOrForbidden
            }
            other => ContentError::Sync(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum InteractionError {
    /// Toggle transition from a state that does not allow it.
    #[error("illegal operation: {message}")]
    IllegalOperation { message: String },
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for InteractionError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::IllegalTransition { message } => {
                InteractionError::IllegalOperation { message }
            }
            other => InteractionError::Repo(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Whether the failure is the caller's fault rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::Validation { .. })
                | AppError::Validation(_)
                | AppError::Interaction(InteractionError::IllegalOperation { .. })
                | AppError::NotFound
        )
    }

    /// Message shown to end users. Internal detail stays in the logs.
    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::NotFound => "Resource not found",
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_)
            | AppError::Interaction(InteractionError::IllegalOperation { .. }) => {
                "Request could not be processed"
            }
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(_)
            | AppError::Content(_)
            | AppError::Interaction(InteractionError::Repo(_))
            | AppError::Unexpected(_) => "System error",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
