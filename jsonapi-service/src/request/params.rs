//! Deep-object query parameters
//!
//! Bracketed keys are folded into a JSON tree:
//!
//! ```text
//! filter[age][start]=18&filter[age][end]=30&page[size]=5&include=roles
//! ```
//!
//! becomes
//!
//! ```json
//! {"filter": {"age": {"start": "18", "end": "30"}}, "page": {"size": "5"}, "include": "roles"}
//! ```
//!
//! `key[]=a&key[]=b` collects into an array. When a key carries both a plain
//! value and nested keys (`filter[name]=Ada&filter[name][operator]=neq`) the
//! plain value is kept under the reserved `eq` sub-key.

use axum::extract::Query;
use axum::http::Uri;
use serde_json::{Map, Value};

use crate::error::{Error, ErrorSource, Result};

/// Sub-key holding a plain value that collided with nested keys
pub const EQUALITY_KEY: &str = "eq";

/// Decoded query parameters as a JSON tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    tree: Map<String, Value>,
}

impl QueryParams {
    /// Decode the query string of `uri`
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri).map_err(|e| {
            Error::bad_request_at(
                format!("Malformed query string: {}", e),
                ErrorSource::parameter(uri.query().unwrap_or_default()),
            )
        })?;
        Ok(Self::from_pairs(pairs))
    }

    /// Fold decoded `(key, value)` pairs into a tree
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut root = Value::Object(Map::new());
        for (key, value) in pairs {
            let path = split_key(key.as_ref());
            insert(&mut root, &path, value.into());
        }

        let tree = match root {
            Value::Object(tree) => tree,
            _ => Map::new(),
        };
        Self { tree }
    }

    /// Top-level parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }

    /// Top-level parameter as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whole tree
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.tree
    }
}

/// `filter[age][start]` → `["filter", "age", "start"]`
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }

    let mut path = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                path.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => return vec![key.to_string()],
        }
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    path
}

fn insert(target: &mut Value, path: &[String], value: String) {
    match path.split_first() {
        None => match target {
            Value::Object(map) => {
                map.insert(EQUALITY_KEY.to_string(), Value::String(value));
            }
            Value::Array(items) => items.push(Value::String(value)),
            _ => *target = Value::String(value),
        },
        Some((head, rest)) if head.is_empty() => {
            if !target.is_array() {
                let existing = std::mem::take(target);
                *target = Value::Array(match existing {
                    Value::String(s) => vec![Value::String(s)],
                    _ => Vec::new(),
                });
            }
            if let Value::Array(items) = target {
                let mut child = Value::Null;
                insert(&mut child, rest, value);
                items.push(child);
            }
        }
        Some((head, rest)) => {
            match std::mem::take(target) {
                Value::Object(map) => *target = Value::Object(map),
                Value::String(scalar) => {
                    let mut map = Map::new();
                    map.insert(EQUALITY_KEY.to_string(), Value::String(scalar));
                    *target = Value::Object(map);
                }
                _ => *target = Value::Object(Map::new()),
            }
            if let Value::Object(map) = target {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                insert(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(pairs: &[(&str, &str)]) -> Value {
        Value::Object(QueryParams::from_pairs(pairs.iter().copied()).tree)
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("include"), vec!["include"]);
        assert_eq!(split_key("page[size]"), vec!["page", "size"]);
        assert_eq!(split_key("filter[age][start]"), vec!["filter", "age", "start"]);
        assert_eq!(split_key("ids[]"), vec!["ids", ""]);
        assert_eq!(split_key("broken[key"), vec!["broken[key"]);
        assert_eq!(split_key("[x]"), vec!["[x]"]);
    }

    #[test]
    fn test_nested_tree() {
        let tree = parse(&[
            ("filter[age][start]", "18"),
            ("filter[age][end]", "30"),
            ("page[size]", "5"),
            ("include", "roles"),
        ]);
        assert_eq!(
            tree,
            json!({
                "filter": {"age": {"start": "18", "end": "30"}},
                "page": {"size": "5"},
                "include": "roles"
            })
        );
    }

    #[test]
    fn test_array_keys() {
        let tree = parse(&[("filter[name][]", "Ada"), ("filter[name][]", "Grace")]);
        assert_eq!(tree, json!({"filter": {"name": ["Ada", "Grace"]}}));
    }

    #[test]
    fn test_scalar_and_nested_keep_both() {
        let before = parse(&[("filter[name]", "Ada"), ("filter[name][operator]", "neq")]);
        let after = parse(&[("filter[name][operator]", "neq"), ("filter[name]", "Ada")]);
        let expected = json!({"filter": {"name": {"eq": "Ada", "operator": "neq"}}});
        assert_eq!(before, expected);
        assert_eq!(after, expected);
    }

    #[test]
    fn test_from_uri_decodes_brackets() {
        let uri: Uri = "/users?page%5Bnumber%5D=2&sort=-name%2Cage".parse().unwrap();
        let params = QueryParams::from_uri(&uri).unwrap();
        assert_eq!(params.get("page"), Some(&json!({"number": "2"})));
        assert_eq!(params.get_str("sort"), Some("-name,age"));
    }
}
