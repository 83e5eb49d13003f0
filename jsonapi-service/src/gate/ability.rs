//! Ability names
//!
//! An ability is derived from the HTTP method, the presence of an id and the
//! addressed relationship:
//!
//! | Request                               | Ability             |
//! |---------------------------------------|---------------------|
//! | `GET /users`                          | `list`              |
//! | `GET /users/1`                        | `show`              |
//! | `GET /pages/1/user` (to-one)          | `showUser`          |
//! | `GET /users/1/roles` (to-many)        | `listRoles`         |
//! | `POST /users`                         | `create`            |
//! | `POST /users/1/relationships/roles`   | `createRoles`       |
//! | `PATCH /users/1`                      | `update`            |
//! | `PATCH /pages/1/relationships/user`   | `updateUser`        |
//! | `DELETE /users/1`                     | `remove`            |
//! | `DELETE /users/1/relationships/roles` | `removeRoles`       |

use axum::http::Method;

use crate::error::{Error, ErrorSource, Result};
use crate::resource::{pascal_case, RelationshipDescriptor};

/// Guess the ability a request exercises
///
/// Methods without a mapping (`PUT`, `HEAD`, ...) are forbidden.
pub fn guess_ability(
    method: &Method,
    has_id: bool,
    relationship: Option<&RelationshipDescriptor>,
) -> Result<String> {
    let verb = match *method {
        Method::GET if !has_id => "list",
        Method::GET => match relationship {
            Some(relationship) if relationship.is_to_many() => "list",
            _ => "show",
        },
        Method::POST => "create",
        Method::PATCH => "update",
        Method::DELETE => "remove",
        _ => {
            return Err(Error::forbidden_at(
                format!("No ability is defined for method {}.", method),
                ErrorSource::pointer("/"),
            ))
        }
    };

    Ok(match relationship {
        Some(relationship) if has_id => format!("{}{}", verb, pascal_case(relationship.name())),
        _ => verb.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn relationships() -> (RelationshipDescriptor, RelationshipDescriptor) {
        let known: HashSet<String> = ["users".to_string(), "roles".to_string()].into();
        let user = RelationshipDescriptor::to_one("user", "users", Some("user".into()), &known).unwrap();
        let roles =
            RelationshipDescriptor::to_many("roles", "roles", None, Some("roles".into()), &known).unwrap();
        (user, roles)
    }

    #[test]
    fn test_resource_abilities() {
        assert_eq!(guess_ability(&Method::GET, false, None).unwrap(), "list");
        assert_eq!(guess_ability(&Method::GET, true, None).unwrap(), "show");
        assert_eq!(guess_ability(&Method::POST, false, None).unwrap(), "create");
        assert_eq!(guess_ability(&Method::PATCH, true, None).unwrap(), "update");
        assert_eq!(guess_ability(&Method::DELETE, true, None).unwrap(), "remove");
    }

    #[test]
    fn test_relationship_abilities() {
        let (user, roles) = relationships();
        assert_eq!(guess_ability(&Method::GET, true, Some(&user)).unwrap(), "showUser");
        assert_eq!(guess_ability(&Method::GET, true, Some(&roles)).unwrap(), "listRoles");
        assert_eq!(guess_ability(&Method::POST, true, Some(&roles)).unwrap(), "createRoles");
        assert_eq!(guess_ability(&Method::PATCH, true, Some(&user)).unwrap(), "updateUser");
        assert_eq!(guess_ability(&Method::DELETE, true, Some(&roles)).unwrap(), "removeRoles");
    }

    #[test]
    fn test_unmapped_method_is_forbidden() {
        assert!(matches!(
            guess_ability(&Method::PUT, true, None),
            Err(Error::Forbidden(_))
        ));
    }
}
