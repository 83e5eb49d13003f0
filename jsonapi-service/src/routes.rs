//! JSON:API route surface
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | GET, POST | `/{type}` | list, create |
//! | GET, PATCH, DELETE | `/{type}/{id}` | show, update, remove |
//! | GET | `/{type}/{id}/{relationship}` | showRelated, listRelated |
//! | GET, POST, PATCH, DELETE | `/{type}/{id}/relationships/{relationship}` | relationship reads and writes |
//!
//! Every handler builds a [`JsonApiRequest`] from the raw parts and hands it
//! to [`dispatch`]. Unknown paths and unsupported methods are answered with
//! JSON:API error documents.

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::Method,
    routing::get,
    Router,
};

use crate::{
    actions::dispatch,
    error::{Error, ErrorObject, Result},
    gate::Actor,
    request::{JsonApiRequest, Target},
    serializer::JsonApiResponse,
    state::AppState,
};

/// Router serving every registered resource type
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{resource_type}", get(collection).post(collection))
        .route(
            "/{resource_type}/{id}",
            get(resource).patch(resource).delete(resource),
        )
        .route("/{resource_type}/{id}/{relationship}", get(related))
        .route(
            "/{resource_type}/{id}/relationships/{relationship}",
            get(relationships)
                .post(relationships)
                .patch(relationships)
                .delete(relationships),
        )
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(state)
}

async fn handle(
    state: &AppState,
    actor: &Actor,
    method: Method,
    target: Target,
    uri: &OriginalUri,
    body: &Bytes,
) -> Result<JsonApiResponse> {
    let request = JsonApiRequest::new(method, target, &uri.0, body, &state.config().jsonapi)?;
    dispatch(&state.action_context(actor), request).await
}

async fn collection(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    uri: OriginalUri,
    Path(resource_type): Path<String>,
    body: Bytes,
) -> Result<JsonApiResponse> {
    handle(&state, &actor, method, Target::collection(resource_type), &uri, &body).await
}

async fn resource(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    uri: OriginalUri,
    Path((resource_type, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<JsonApiResponse> {
    handle(&state, &actor, method, Target::resource(resource_type, id), &uri, &body).await
}

async fn related(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    uri: OriginalUri,
    Path((resource_type, id, relationship)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<JsonApiResponse> {
    let target = Target::related(resource_type, id, relationship);
    handle(&state, &actor, method, target, &uri, &body).await
}

async fn relationships(
    State(state): State<AppState>,
    actor: Actor,
    method: Method,
    uri: OriginalUri,
    Path((resource_type, id, relationship)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<JsonApiResponse> {
    let target = Target::relationships(resource_type, id, relationship);
    handle(&state, &actor, method, target, &uri, &body).await
}

async fn not_found(uri: OriginalUri) -> Error {
    Error::not_found(format!("No route matches \"{}\".", uri.0.path()))
}

async fn method_not_allowed(method: Method, uri: OriginalUri) -> Error {
    Error::MethodNotAllowed(
        ErrorObject::new(format!(
            "Method {} is not supported on \"{}\".",
            method,
            uri.0.path()
        ))
        .into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JSONAPI_MEDIA_TYPE;
    use crate::testing;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::builder()
            .registry(testing::seeded_registry())
            .gate(testing::gate())
            .without_tracing()
            .build()
            .unwrap();
        router(state)
    }

    async fn call(
        app: Router,
        actor: Actor,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE)
            .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
            .unwrap();
        request.extensions_mut().insert(actor);

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_forbidden_show_renders_error_document() {
        let (status, body) = call(app(), testing::moderator(), Method::GET, "/users/1", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let document = body.as_object().unwrap();
        assert_eq!(document.keys().collect::<Vec<_>>(), vec!["errors"]);
        assert_eq!(body["errors"][0]["status"], json!("403"));
    }

    #[tokio::test]
    async fn test_moderator_replaces_page_author() {
        let (status, body) = call(
            app(),
            testing::moderator(),
            Method::PATCH,
            "/pages/1/relationships/user",
            Some(json!({"data": {"type": "users", "id": "2"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"data": {"id": "2", "type": "users", "links": {"self": "/users/2"}}})
        );
    }

    #[tokio::test]
    async fn test_show_with_include() {
        let (status, body) = call(
            app(),
            testing::root(),
            Method::GET,
            "/pages/1?include=user",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["relationships"]["user"]["data"], json!({"type": "users", "id": "1"}));
        assert_eq!(body["included"][0]["id"], json!("1"));
        assert_eq!(body["included"][0]["type"], json!("users"));
        assert!(body.get("links").is_none());
    }

    #[tokio::test]
    async fn test_paginated_list_links() {
        let (status, body) = call(
            app(),
            testing::root(),
            Method::GET,
            "/users?page%5Bnumber%5D=2&page%5Bsize%5D=1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["meta"]["page"]["total"], json!(testing::USER_COUNT));
        assert_eq!(
            body["links"]["next"],
            json!("/users?page%5Bnumber%5D=3&page%5Bsize%5D=1")
        );
        assert_eq!(
            body["links"]["prev"],
            json!("/users?page%5Bnumber%5D=1&page%5Bsize%5D=1")
        );
    }

    #[tokio::test]
    async fn test_create_returns_location() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/roles")
            .body(Body::from(
                json!({"data": {"type": "roles", "id": "editor", "attributes": {"name": "editor"}}})
                    .to_string(),
            ))
            .unwrap();
        let mut request = request;
        request.extensions_mut().insert(testing::root());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/roles/editor");
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSONAPI_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_validation_errors_are_accumulated() {
        let (status, body) = call(
            app(),
            testing::root(),
            Method::POST,
            "/users",
            Some(json!({"data": {"type": "users",
                "attributes": {"name": "X", "nickname": "y"},
                "relationships": {"roles": {"data": {"type": "roles", "id": "1"}}}}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let pointers: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|error| error["source"]["pointer"].as_str())
            .collect();
        assert!(pointers.contains(&"/data/attributes/nickname"));
        assert!(pointers.contains(&"/data/relationships/roles/data"));
    }

    #[tokio::test]
    async fn test_to_one_relationship_post_is_forbidden() {
        let (status, _) = call(
            app(),
            testing::root(),
            Method::POST,
            "/pages/1/relationships/user",
            Some(json!({"data": {"type": "users", "id": "2"}})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_remove_returns_no_content() {
        let (status, body) = call(app(), testing::root(), Method::DELETE, "/pages/3", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_type_and_route_are_not_found() {
        let (status, body) = call(app(), testing::root(), Method::GET, "/ghosts", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["errors"].is_array());

        let (status, _) = call(app(), testing::root(), Method::GET, "/a/b/c/d/e", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsupported_method_renders_error_document() {
        for (method, uri) in [(Method::PUT, "/users"), (Method::DELETE, "/users/1/roles")] {
            let response = app()
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.headers()[header::CONTENT_TYPE], JSONAPI_MEDIA_TYPE);

            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["errors"][0]["status"], json!("405"));
        }
    }

    #[tokio::test]
    async fn test_offset_past_the_end_returns_empty_page() {
        let (status, body) = call(
            app(),
            testing::root(),
            Method::GET,
            "/users?page%5Boffset%5D=18446744073709551615&page%5Blimit%5D=10",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["links"]["last"], json!("/users?page%5Boffset%5D=0&page%5Blimit%5D=10"));
        assert!(body["links"].get("next").is_none());
    }

    #[tokio::test]
    async fn test_relationship_delete_returns_no_content() {
        let (status, body) = call(
            app(),
            testing::root(),
            Method::DELETE,
            "/users/1/relationships/roles",
            Some(json!({"data": [{"type": "roles", "id": "1"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_anonymous_is_denied() {
        let (status, _) = call(app(), Actor::anonymous(), Method::GET, "/pages", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
