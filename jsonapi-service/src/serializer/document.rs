//! Top-level documents and their HTTP responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::JSONAPI_MEDIA_TYPE;

/// A JSON:API success document
///
/// `data` is always serialized, `null` included; `included`, `meta` and
/// `links` only when non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonApiDocument {
    /// Primary data: a resource object, an array of them, linkage or `null`
    pub data: Value,

    /// Resources related to the primary data, unique by `{type, id}`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Value>,

    /// Non-standard meta information
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,

    /// Top-level links
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub links: Map<String, Value>,
}

impl JsonApiDocument {
    /// Document with the given primary data
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Document whose primary data is `null`
    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    /// Set a top-level link
    #[must_use]
    pub fn with_link(mut self, name: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.insert(name.into(), Value::String(href.into()));
        self
    }

    /// Set a top-level meta member
    #[must_use]
    pub fn with_meta(mut self, name: impl Into<String>, value: Value) -> Self {
        self.meta.insert(name.into(), value);
        self
    }
}

/// HTTP response carrying a JSON:API document
#[derive(Debug, Clone, PartialEq)]
pub enum JsonApiResponse {
    /// A document with its status (200 or 201) and optional `Location`
    Document {
        /// Response status
        status: StatusCode,
        /// Body
        document: JsonApiDocument,
        /// `Location` header of a created resource
        location: Option<String>,
    },
    /// 204 No Content
    NoContent,
}

impl JsonApiResponse {
    /// 200 OK
    pub fn ok(document: JsonApiDocument) -> Self {
        Self::Document {
            status: StatusCode::OK,
            document,
            location: None,
        }
    }

    /// 201 Created with a `Location` header
    pub fn created(document: JsonApiDocument, location: impl Into<String>) -> Self {
        Self::Document {
            status: StatusCode::CREATED,
            document,
            location: Some(location.into()),
        }
    }

    /// 204 No Content
    pub fn no_content() -> Self {
        Self::NoContent
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Document { status, .. } => *status,
            Self::NoContent => StatusCode::NO_CONTENT,
        }
    }

    /// Body document, if any
    pub fn document(&self) -> Option<&JsonApiDocument> {
        match self {
            Self::Document { document, .. } => Some(document),
            Self::NoContent => None,
        }
    }
}

impl IntoResponse for JsonApiResponse {
    fn into_response(self) -> Response {
        let (status, document, location) = match self {
            Self::NoContent => return StatusCode::NO_CONTENT.into_response(),
            Self::Document {
                status,
                document,
                location,
            } => (status, document, location),
        };

        let mut response = (status, Json(document)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSONAPI_MEDIA_TYPE),
        );

        if let Some(location) = location {
            if let Ok(value) = HeaderValue::from_str(&location) {
                headers.insert(header::LOCATION, value);
            }
        }

        response
    }
}
