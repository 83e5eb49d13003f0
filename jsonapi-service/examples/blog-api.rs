//! Blog API Example
//!
//! This example demonstrates:
//! - Registering resources with attributes, to-one, to-many and inverse relationships
//! - Meta functions, free-text search and filterable fields
//! - A gate with role grants and an ownership rule
//! - Reading the acting principal from request headers
//!
//! Run with: cargo run --example blog-api
//!
//! The service runs on port 8080 by default (configurable via JSONAPI_SERVICE__PORT)
//!
//! Test with:
//!   curl -H 'x-actor-id: 1' -H 'x-actor-roles: root' 'http://localhost:8080/articles?include=author,tags'
//!   curl -H 'x-actor-id: 2' -H 'x-actor-roles: writer' 'http://localhost:8080/authors/2/articles'
//!   curl -X PATCH -H 'x-actor-id: 2' -H 'x-actor-roles: writer' \
//!        -d '{"data":{"type":"articles","id":"2","attributes":{"title":"Revised"}}}' \
//!        http://localhost:8080/articles/2
//!   curl -H 'x-actor-id: 1' -H 'x-actor-roles: root' \
//!        'http://localhost:8080/articles?filter[published][start]=2024-01-01&sort=-published'

use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response};
use jsonapi_service::prelude::*;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Default, Serialize)]
struct Author {
    id: Option<String>,
    name: String,
}

impl ResourceEntity for Author {
    const RESOURCE_TYPE: &'static str = "authors";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct Article {
    id: Option<String>,
    title: String,
    body: String,
    published: String,
    author: Option<String>,
    tags: Vec<String>,
}

impl ResourceEntity for Article {
    const RESOURCE_TYPE: &'static str = "articles";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct Tag {
    id: Option<String>,
    label: String,
}

impl ResourceEntity for Tag {
    const RESOURCE_TYPE: &'static str = "tags";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

fn registry() -> Result<ResourceRegistry> {
    let store = InMemoryEntityManager::new();

    for (id, name) in [("1", "Ursula"), ("2", "Terry")] {
        store.insert(Author {
            id: Some(id.into()),
            name: name.into(),
        })?;
    }
    for (id, label) in [("rust", "Rust"), ("web", "Web")] {
        store.insert(Tag {
            id: Some(id.into()),
            label: label.into(),
        })?;
    }
    for (id, title, published, author, tags) in [
        ("1", "Ownership explained", "2024-03-02", "1", vec!["rust"]),
        ("2", "Routing with axum", "2024-05-17", "2", vec!["rust", "web"]),
        ("3", "Caching headers", "2023-11-08", "2", vec!["web"]),
    ] {
        store.insert(Article {
            id: Some(id.into()),
            title: title.into(),
            body: format!("{}...", title),
            published: published.into(),
            author: Some(author.into()),
            tags: tags.into_iter().map(String::from).collect(),
        })?;
    }

    ResourceRegistry::builder()
        .register(
            ResourceSchema::new(Author::default)
                .attribute("name", FieldType::String, |a: &mut Author, v: String| a.name = v)
                .inverse_to_many("articles", "articles", "author")
                .search("name"),
        )
        .register(
            ResourceSchema::new(Article::default)
                .attribute("title", FieldType::String, |a: &mut Article, v: String| a.title = v)
                .attribute("body", FieldType::String, |a: &mut Article, v: String| a.body = v)
                .attribute("published", FieldType::String, |a: &mut Article, v: String| {
                    a.published = v
                })
                .to_one("author", "authors", |a: &mut Article, id| a.author = id)
                .to_many("tags", "tags", |a: &mut Article, ids| a.tags = ids)
                .meta("tagCount", |a: &Article| json!(a.tags.len()))
                .search("title")
                .filterable(["title", "published", "author"])
                .default_includes(["author"]),
        )
        .register(
            ResourceSchema::new(Tag::default)
                .attribute("label", FieldType::String, |t: &mut Tag, v: String| t.label = v)
                .id_strategy(IdStrategy::ClientProvided),
        )
        .build(Arc::new(store))
}

fn gate() -> Gate {
    Gate::new()
        .policy(
            ResourcePolicy::new("articles")
                .grant("reader", ["list", "show", "showAuthor", "listTags"])
                .grant("writer", ["list", "show", "create", "showAuthor", "listTags"])
                .allow_if("update", |context| context.subject_is_owned_by_actor("author"))
                .allow_if("updateTags", |context| context.subject_is_owned_by_actor("author")),
        )
        .policy(
            ResourcePolicy::new("authors")
                .grant("reader", ["list", "show", "listArticles"])
                .grant("writer", ["list", "show", "listArticles"]),
        )
        .policy(ResourcePolicy::new("tags").grant("writer", ["list", "show"]))
}

/// Stand-in for an authentication layer: trusts `x-actor-*` headers
async fn actor_from_headers(mut request: Request, next: Next) -> Response {
    {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        if let Some(id) = header("x-actor-id") {
            let actor = header("x-actor-roles")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .fold(Actor::new(id), |actor, role| actor.with_role(role));
            request.extensions_mut().insert(actor);
        }
    }

    next.run(request).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_for_service("blog-api")?;
    init_tracing(&config)?;

    let state = AppState::builder()
        .config(config.clone())
        .registry(registry()?)
        .gate(gate())
        .without_tracing()
        .build()?;

    let app = router(state).layer(axum::middleware::from_fn(actor_from_headers));

    Server::new(config).serve(app).await
}
