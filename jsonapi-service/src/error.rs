//! Error types and JSON:API error document conversion
//!
//! Every request-time failure is rendered as a JSON:API error document:
//!
//! ```json
//! { "errors": [ { "status": "404", "title": "Not Found", "detail": "..." } ] }
//! ```
//!
//! Errors that can carry several faults at once (hydration, validation) hold
//! an [`ErrorList`], so a client sees every problem of a payload in one
//! response.

use std::fmt;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryErrorKind};

/// Media type of every JSON:API request and response body
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Location of the fault inside the request
///
/// Besides the JSON:API `pointer` and `parameter` members this carries the
/// `setter` that was missing during hydration and the offending `field` and
/// `operator` of a rejected filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// JSON pointer into the request document (e.g. `/data/attributes/email`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Query parameter that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Property setter that could not be found (e.g. `User::setBogus`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter: Option<String>,
    /// Filtered field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Filter operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl ErrorSource {
    /// Source pointing into the request document
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            ..Self::default()
        }
    }

    /// Source naming a query parameter
    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            parameter: Some(parameter.into()),
            ..Self::default()
        }
    }

    /// Source naming a missing property setter
    pub fn setter(setter: impl Into<String>) -> Self {
        Self {
            setter: Some(setter.into()),
            ..Self::default()
        }
    }

    /// Source naming a rejected filter field and operator
    pub fn filter(field: impl Into<String>, operator: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            parameter: Some(format!("filter[{}]", field)),
            field: Some(field),
            operator: Some(operator.into()),
            ..Self::default()
        }
    }
}

/// A single JSON:API error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status code applicable to this problem, as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Application-specific error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short summary of the problem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable explanation of this occurrence of the problem
    pub detail: String,
    /// Location of the fault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

impl ErrorObject {
    /// Create an error object with only a detail message
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            title: None,
            detail: detail.into(),
            source: None,
        }
    }

    /// Attach a source
    #[must_use]
    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach an application-specific code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a status, keeping an already set one
    #[must_use]
    fn with_default_status(mut self, status: StatusCode) -> Self {
        if self.status.is_none() {
            self.status = Some(status.as_u16().to_string());
        }
        if self.title.is_none() {
            self.title = status.canonical_reason().map(str::to_string);
        }
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)?;
        if let Some(source) = &self.source {
            if let Some(pointer) = &source.pointer {
                write!(f, " [{}]", pointer)?;
            } else if let Some(setter) = &source.setter {
                write!(f, " [{}]", setter)?;
            } else if let Some(parameter) = &source.parameter {
                write!(f, " [{}]", parameter)?;
            }
        }
        Ok(())
    }
}

/// An accumulating list of error objects
///
/// Hydration and validation collect into an `ErrorList` and only fail once
/// the whole payload has been inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<ErrorObject>);

impl ErrorList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error
    pub fn push(&mut self, error: ErrorObject) {
        self.0.push(error);
    }

    /// Append all errors of another list
    pub fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    /// Whether no error has been collected
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of collected errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the collected errors
    pub fn iter(&self) -> std::slice::Iter<'_, ErrorObject> {
        self.0.iter()
    }

    /// Consume the list and return the inner errors
    pub fn into_vec(self) -> Vec<ErrorObject> {
        self.0
    }

    /// `Ok(value)` when nothing was collected, `Err(self)` otherwise
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ErrorList> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ErrorObject> for ErrorList {
    fn from(error: ErrorObject) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<ErrorObject> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ErrorObject>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ErrorList {
    type Item = ErrorObject;
    type IntoIter = std::vec::IntoIter<ErrorObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// A resource or relationship was declared incorrectly; fatal at startup
    #[error("Resource configuration error: {0}")]
    Configuration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request: bad parameters, bad filters, missing `data`
    #[error("Bad request: {0}")]
    BadRequest(ErrorList),

    /// Authorization denial or an operation that is not allowed
    #[error("Forbidden: {0}")]
    Forbidden(ErrorList),

    /// Unknown resource type, relationship, or id
    #[error("Not found: {0}")]
    NotFound(ErrorList),

    /// Route exists but not for this HTTP method
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(ErrorList),

    /// Attribute or relationship validation failure (422)
    #[error("Validation error: {0}")]
    Validation(ErrorList),

    /// Persistence layer failure
    #[error("{0}")]
    Repository(RepositoryError),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Bad request with a single detail
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest(ErrorObject::new(detail).into())
    }

    /// Bad request with a single detail and source
    pub fn bad_request_at(detail: impl Into<String>, source: ErrorSource) -> Self {
        Self::BadRequest(ErrorObject::new(detail).with_source(source).into())
    }

    /// Forbidden with a single detail
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden(ErrorObject::new(detail).into())
    }

    /// Forbidden with a single detail and source
    pub fn forbidden_at(detail: impl Into<String>, source: ErrorSource) -> Self {
        Self::Forbidden(ErrorObject::new(detail).with_source(source).into())
    }

    /// Not found with a single detail
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(ErrorObject::new(detail).into())
    }

    /// Not found error for a `{type, id}` pair
    pub fn resource_not_found(resource_type: &str, id: &str) -> Self {
        Self::not_found(format!(
            "Resource \"{}\" with id \"{}\" not found.",
            resource_type, id
        ))
    }

    /// Validation failure with a single detail and source
    pub fn validation_at(detail: impl Into<String>, source: ErrorSource) -> Self {
        Self::Validation(ErrorObject::new(detail).with_source(source).into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Repository(e) => match e.kind {
                RepositoryErrorKind::NotFound => StatusCode::NOT_FOUND,
                RepositoryErrorKind::AlreadyExists | RepositoryErrorKind::ConstraintViolation => {
                    StatusCode::CONFLICT
                }
                RepositoryErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Config(_) | Self::Configuration(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Error objects rendered to the client
    ///
    /// Internal failures are reported with a generic detail; the cause is
    /// logged, not exposed.
    pub fn errors(&self) -> ErrorList {
        match self {
            Self::BadRequest(list)
            | Self::Forbidden(list)
            | Self::NotFound(list)
            | Self::MethodNotAllowed(list)
            | Self::Validation(list) => list.clone(),
            Self::Repository(e) => match e.kind {
                RepositoryErrorKind::NotFound
                | RepositoryErrorKind::AlreadyExists
                | RepositoryErrorKind::ConstraintViolation
                | RepositoryErrorKind::ValidationFailed => ErrorObject::new(e.message.clone())
                    .with_code(e.kind.to_string().to_uppercase())
                    .into(),
                _ => ErrorObject::new("Persistence operation failed.")
                    .with_code("REPOSITORY_ERROR")
                    .into(),
            },
            Self::Config(_) | Self::Configuration(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorObject::new("Internal server error.")
                    .with_code("INTERNAL_ERROR")
                    .into()
            }
        }
    }
}

/// Body of an error response; never carries `data`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDocument {
    /// The error objects
    pub errors: Vec<ErrorObject>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "JSON:API request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "JSON:API request rejected: {}", self);
        }

        let document = ErrorDocument {
            errors: self
                .errors()
                .into_iter()
                .map(|e| e.with_default_status(status))
                .collect(),
        };

        let mut response = (status, Json(document)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSONAPI_MEDIA_TYPE),
        );
        response
    }
}

impl From<ErrorList> for Error {
    fn from(errors: ErrorList) -> Self {
        Self::Validation(errors)
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_accumulates() {
        let mut list = ErrorList::new();
        assert!(list.is_empty());
        list.push(ErrorObject::new("first"));
        list.push(ErrorObject::new("second").with_source(ErrorSource::pointer("/data")));
        assert_eq!(list.len(), 2);
        assert_eq!(list.to_string(), "first; second [/data]");
        assert!(list.into_result(()).is_err());
    }

    #[test]
    fn test_empty_error_list_into_ok() {
        assert_eq!(ErrorList::new().into_result(42), Ok(42));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::MethodNotAllowed(ErrorObject::new("x").into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            Error::validation_at("x", ErrorSource::pointer("/data")).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            Error::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let errors = Error::Internal("connection string leaked".into()).errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().detail, "Internal server error.");
    }

    #[test]
    fn test_filter_source_serialization() {
        let source = ErrorSource::filter("name", "like");
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "parameter": "filter[name]",
                "field": "name",
                "operator": "like"
            })
        );
    }

    #[tokio::test]
    async fn test_into_response_renders_errors_document() {
        let response = Error::forbidden_at("Denied.", ErrorSource::pointer("/")).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSONAPI_MEDIA_TYPE
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["status"], "403");
        assert_eq!(json["errors"][0]["detail"], "Denied.");
        assert_eq!(json["errors"][0]["source"]["pointer"], "/");
    }
}
