//! Pagination parameters
//!
//! Two styles are accepted and never mixed in one request:
//!
//! - `page[number]` / `page[size]` (1-indexed page number)
//! - `page[offset]` / `page[limit]`

use serde_json::{json, Map, Value};

use crate::error::{Error, ErrorSource, Result};
use crate::repository::Pagination;

/// Resolved page of a collection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSpec {
    /// Page-number style
    Number {
        /// 1-indexed page number
        number: u64,
        /// Page size
        size: u64,
    },
    /// Offset style
    Offset {
        /// Results to skip
        offset: u64,
        /// Maximum results
        limit: u64,
    },
}

impl PageSpec {
    /// Resolve the `page` parameter
    ///
    /// Without page parameters the first page of `default_size` is used.
    /// Sizes above `max_size` are clamped.
    pub fn parse(page: Option<&Value>, default_size: u64, max_size: Option<u64>) -> Result<Self> {
        let clamp = |size: u64| max_size.map_or(size, |max| size.min(max));

        let params = match page {
            None => {
                return Ok(Self::Number {
                    number: 1,
                    size: clamp(default_size),
                })
            }
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(Error::bad_request_at(
                    "Pagination parameters must be given as page[...] keys.",
                    ErrorSource::parameter("page"),
                ))
            }
        };

        let number_style = params.contains_key("number") || params.contains_key("size");
        let offset_style = params.contains_key("offset") || params.contains_key("limit");

        if number_style && offset_style {
            return Err(Error::bad_request_at(
                "page[number]/page[size] cannot be combined with page[offset]/page[limit].",
                ErrorSource::parameter("page"),
            ));
        }

        if offset_style {
            Ok(Self::Offset {
                offset: read(params, "offset", 0)?.unwrap_or(0),
                limit: clamp(read(params, "limit", 1)?.unwrap_or(default_size)),
            })
        } else {
            Ok(Self::Number {
                number: read(params, "number", 1)?.unwrap_or(1),
                size: clamp(read(params, "size", 1)?.unwrap_or(default_size)),
            })
        }
    }

    /// Index of the first result
    pub fn first_result(&self) -> u64 {
        match *self {
            Self::Number { number, size } => number.saturating_sub(1).saturating_mul(size),
            Self::Offset { offset, .. } => offset,
        }
    }

    /// Maximum number of results
    pub fn max_results(&self) -> u64 {
        match *self {
            Self::Number { size, .. } => size,
            Self::Offset { limit, .. } => limit,
        }
    }

    /// Window handed to the repository
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.first_result(), self.max_results())
    }

    /// Number of pages needed for `total` results, at least one
    pub fn page_count(&self, total: u64) -> u64 {
        let size = self.max_results().max(1);
        total.div_ceil(size).max(1)
    }

    /// `meta.page` member of a collection document
    pub fn meta(&self, total: u64) -> Value {
        match *self {
            Self::Number { number, size } => json!({
                "number": number,
                "size": size,
                "total": total,
                "lastPage": self.page_count(total),
            }),
            Self::Offset { offset, limit } => json!({
                "offset": offset,
                "limit": limit,
                "total": total,
            }),
        }
    }

    /// Neighbouring pages keyed by link name (`first`, `last`, `prev`, `next`)
    pub fn neighbours(&self, total: u64) -> Vec<(&'static str, PageSpec)> {
        let last_page = self.page_count(total);
        let mut links = Vec::with_capacity(4);

        match *self {
            Self::Number { number, size } => {
                links.push(("first", Self::Number { number: 1, size }));
                links.push(("last", Self::Number { number: last_page, size }));
                if number > 1 {
                    links.push(("prev", Self::Number { number: (number - 1).min(last_page), size }));
                }
                if number < last_page {
                    links.push(("next", Self::Number { number: number + 1, size }));
                }
            }
            Self::Offset { offset, limit } => {
                links.push(("first", Self::Offset { offset: 0, limit }));
                let last = (last_page - 1).saturating_mul(limit);
                links.push(("last", Self::Offset { offset: last, limit }));
                if offset > 0 {
                    let prev = offset.saturating_sub(limit).min(last);
                    links.push(("prev", Self::Offset { offset: prev, limit }));
                }
                if let Some(next) = offset.checked_add(limit).filter(|next| *next < total) {
                    links.push(("next", Self::Offset { offset: next, limit }));
                }
            }
        }
        links
    }

    /// Encoded query pairs selecting this page
    pub fn query_pairs(&self) -> [(&'static str, u64); 2] {
        match *self {
            Self::Number { number, size } => [("page%5Bnumber%5D", number), ("page%5Bsize%5D", size)],
            Self::Offset { offset, limit } => [("page%5Boffset%5D", offset), ("page%5Blimit%5D", limit)],
        }
    }
}

fn read(params: &Map<String, Value>, key: &str, minimum: u64) -> Result<Option<u64>> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };

    let parsed = match value {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };

    match parsed {
        Some(n) if n >= minimum => Ok(Some(n)),
        _ => Err(Error::bad_request_at(
            format!(
                "page[{}] must be an integer greater than or equal to {}.",
                key, minimum
            ),
            ErrorSource::parameter(format!("page[{}]", key)),
        )),
    }
}
