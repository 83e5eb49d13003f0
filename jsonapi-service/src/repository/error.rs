//! Repository error types
//!
//! Errors reported by the persistence collaborator. They carry the operation
//! that failed and, where known, the `{type, id}` of the entity involved.
//!
//! # Example
//!
//! ```rust
//! use jsonapi_service::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("users", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.resource_id.as_deref(), Some("42"));
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Loading a single entity by id
    Find,
    /// Running a criteria query
    Query,
    /// Counting entities matching criteria
    Count,
    /// Staging a new or changed entity
    Persist,
    /// Staging an entity removal
    Remove,
    /// Writing staged changes
    Flush,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::Query => write!(f, "query"),
            Self::Count => write!(f, "count"),
            Self::Persist => write!(f, "persist"),
            Self::Remove => write!(f, "remove"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Storage constraint violation
    ConstraintViolation,
    /// Validation failed before the storage operation
    ValidationFailed,
    /// Failed to reach the storage backend
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying storage error
    DatabaseError,
    /// Entity could not be converted to or from its stored form
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Resource type of the entity involved
    pub resource_type: Option<String>,
    /// Id of the entity involved
    pub resource_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Find,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(resource_type, resource_id)
    }

    /// Create an "already exists" error with entity context
    pub fn already_exists(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Persist,
            RepositoryErrorKind::AlreadyExists,
            "Entity already exists",
        )
        .with_entity(resource_type, resource_id)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(resource_type), Some(resource_id)) = (&self.resource_type, &self.resource_id) {
            write!(f, " [{}: {}]", resource_type, resource_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_convenience() {
        let err = RepositoryError::not_found("users", "1");
        assert_eq!(err.operation, RepositoryOperation::Find);
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
        assert_eq!(err.resource_type, Some("users".to_string()));
    }

    #[test]
    fn test_already_exists_convenience() {
        let err = RepositoryError::already_exists("users", "1");
        assert_eq!(err.operation, RepositoryOperation::Persist);
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
    }

    #[test]
    fn test_display_with_entity() {
        let err = RepositoryError::not_found("pages", "7");
        assert_eq!(
            err.to_string(),
            "Repository not_found error during find: Entity not found [pages: 7]"
        );
    }

    #[test]
    fn test_display_without_entity() {
        let err = RepositoryError::serialization_error(RepositoryOperation::Query, "bad row");
        assert_eq!(
            err.to_string(),
            "Repository serialization_error error during query: bad row"
        );
    }
}
