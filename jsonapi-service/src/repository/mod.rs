//! Persistence-facing layer
//!
//! - [`EntityManager`]: the persistence collaborator (`find`, criteria
//!   queries, staged `persist` / `remove`, `flush`)
//! - [`ResourceRepository`]: per-class gateway with a query builder
//! - [`Criteria`] / [`Predicate`]: AND-composed filter expressions
//! - [`InMemoryEntityManager`]: DashMap-backed store for tests and demos
//!
//! # Example
//!
//! ```rust,ignore
//! let repository = registry.repository("users")?;
//! let (users, total) = repository
//!     .resource_query_builder()
//!     .and_where(Predicate::eq("name", "Ada"))
//!     .paginate(Some(Pagination::page(1, 20)))
//!     .fetch_page()
//!     .await?;
//! ```

mod criteria;
mod error;
mod memory;
mod query;
mod traits;

pub use criteria::{
    Criteria, FilterOperator, FilterValue, OrderDirection, Pagination, Predicate, Sort,
    UnknownOperator,
};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use memory::InMemoryEntityManager;
pub use query::{ResourceQuery, ResourceQueryBuilder};
pub use traits::{related_criteria, EntityManager, RepositoryResult, ResourceRepository};
