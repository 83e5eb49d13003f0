//! Middleware applied by the server around the JSON:API router

pub mod request_tracking;

pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer, MakeRequestUuidV7,
    SENSITIVE_HEADERS,
};
