//! Shared test fixtures: `users`, `pages` and `roles` resources, a seeded
//! in-memory store and a gate with a moderator role.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::gate::{Actor, Gate, ResourcePolicy, ROOT_ROLE};
use crate::repository::{EntityManager, InMemoryEntityManager};
use crate::resource::{FieldType, IdStrategy, ResourceEntity, ResourceRegistry, ResourceSchema};

/// Number of seeded users
pub const USER_COUNT: u64 = 3;

#[derive(Debug, Clone, Default, Serialize)]
pub struct User {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub age: i64,
    pub password: String,
    pub roles: Vec<String>,
}

impl ResourceEntity for User {
    const RESOURCE_TYPE: &'static str = "users";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub user: Option<String>,
}

impl ResourceEntity for Page {
    const RESOURCE_TYPE: &'static str = "pages";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Role {
    pub id: Option<String>,
    pub name: String,
}

impl ResourceEntity for Role {
    const RESOURCE_TYPE: &'static str = "roles";

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

pub fn user_schema() -> ResourceSchema<User> {
    ResourceSchema::new(User::default)
        .attribute("name", FieldType::String, |u: &mut User, v: String| u.name = v)
        .attribute("email", FieldType::String, |u: &mut User, v: String| u.email = v)
        .attribute("age", FieldType::Integer, |u: &mut User, v: i64| u.age = v)
        .to_many("roles", "roles", |u: &mut User, ids| u.roles = ids)
        .inverse_to_many("pages", "pages", "user")
        .meta("roleCount", |u: &User| json!(u.roles.len()))
        .search("name")
        .filterable(["name", "email", "age"])
}

pub fn page_schema() -> ResourceSchema<Page> {
    ResourceSchema::new(Page::default)
        .attribute("title", FieldType::String, |p: &mut Page, v: String| p.title = v)
        .attribute("content", FieldType::String, |p: &mut Page, v: String| p.content = v)
        .to_one("user", "users", |p: &mut Page, id| p.user = id)
        .search("title")
        .filterable(["title", "user"])
}

pub fn role_schema() -> ResourceSchema<Role> {
    ResourceSchema::new(Role::default)
        .attribute("name", FieldType::String, |r: &mut Role, v: String| r.name = v)
        .id_strategy(IdStrategy::ClientProvided)
        .filterable(["name"])
}

/// Registry of the three fixture resources
pub fn registry(manager: Arc<dyn EntityManager>) -> ResourceRegistry {
    ResourceRegistry::builder()
        .register(user_schema())
        .register(page_schema())
        .register(role_schema())
        .build(manager)
        .unwrap()
}

/// Store holding users 1-3, roles 1-2 and pages 1-3
pub fn seeded_manager() -> Arc<InMemoryEntityManager> {
    let manager = InMemoryEntityManager::new();

    for (id, name, age, roles) in [
        ("1", "Ada", 36, vec!["1"]),
        ("2", "Grace", 45, vec!["2"]),
        ("3", "Alan", 41, vec![]),
    ] {
        manager
            .insert(User {
                id: Some(id.into()),
                name: name.into(),
                email: format!("{}@example.com", name.to_lowercase()),
                age,
                password: "secret".into(),
                roles: roles.into_iter().map(String::from).collect(),
            })
            .unwrap();
    }

    for (id, name) in [("1", "admin"), ("2", "moderator")] {
        manager
            .insert(Role {
                id: Some(id.into()),
                name: name.into(),
            })
            .unwrap();
    }

    for (id, title, user) in [
        ("1", "Engines", Some("1")),
        ("2", "Notes", Some("1")),
        ("3", "Drafts", None),
    ] {
        manager
            .insert(Page {
                id: Some(id.into()),
                title: title.into(),
                content: format!("{} content", title),
                user: user.map(String::from),
            })
            .unwrap();
    }

    Arc::new(manager)
}

/// Registry over a freshly seeded store
pub fn seeded_registry() -> ResourceRegistry {
    registry(seeded_manager())
}

/// Gate granting moderators page reads and page ownership changes
pub fn gate() -> Gate {
    Gate::new()
        .policy(
            ResourcePolicy::new("pages")
                .grant("moderator", ["list", "show", "showUser", "updateUser"])
                .allow_if("update", |context| context.subject_is_owned_by_actor("user")),
        )
        .policy(ResourcePolicy::new("users").grant("moderator", ["list"]))
}

pub fn root() -> Actor {
    Actor::new("admin").with_role(ROOT_ROLE)
}

pub fn moderator() -> Actor {
    Actor::new("2").with_role("moderator")
}
