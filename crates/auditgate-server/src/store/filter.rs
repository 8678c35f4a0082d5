//! Listing filters
//!
//! A filter compares one top-level field of a stored JSON document against a
//! value. Field names and values are always bound as query parameters; only
//! the operator token, taken from a fixed whitelist, is written into SQL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{Postgres, QueryBuilder};

use super::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "like", alias = "LIKE")]
    Like,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
        }
    }

    fn is_ordering(self) -> bool {
        matches!(self, FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge)
    }

    fn compare<T: PartialOrd + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            FilterOp::Eq => left == right,
            FilterOp::Ne => left != right,
            FilterOp::Lt => left < right,
            FilterOp::Le => left <= right,
            FilterOp::Gt => left > right,
            FilterOp::Ge => left >= right,
            FilterOp::Like => false,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for FilterOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::Ne),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            other if other.eq_ignore_ascii_case("like") => Ok(FilterOp::Like),
            other => Err(StoreError::InvalidFilter(format!(
                "unsupported operator '{other}'"
            ))),
        }
    }
}

/// `{key, op, value}` condition on a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn new(
        key: impl Into<String>,
        op: FilterOp,
        value: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(StoreError::InvalidFilter("filter key is empty".to_string()));
        }
        Ok(Self {
            key,
            op,
            value: value.into(),
        })
    }

    /// Ordering operators compare numerically when the value is a number
    pub fn numeric_value(&self) -> Option<f64> {
        if !self.op.is_ordering() {
            return None;
        }
        self.value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }

    /// Evaluate against a document the way the SQL rendering would
    pub fn matches(&self, document: &JsonValue) -> bool {
        if let Some(expected) = self.numeric_value() {
            return document
                .get(&self.key)
                .and_then(JsonValue::as_f64)
                .is_some_and(|actual| self.op.compare(&actual, &expected));
        }

        let text = match document.get(&self.key) {
            None | Some(JsonValue::Null) => return false,
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match self.op {
            FilterOp::Like => like_matches(&text, &self.value),
            op => op.compare(text.as_str(), self.value.as_str()),
        }
    }

    /// Append `data ->> $key <op> $value` to a Postgres query
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self.numeric_value() {
            // Only JSON numbers are cast; other values compare as NULL.
            Some(number) => {
                builder
                    .push("CASE WHEN jsonb_typeof(data -> ")
                    .push_bind(self.key.clone())
                    .push(") = 'number' THEN (data ->> ")
                    .push_bind(self.key.clone())
                    .push(")::float8 END ")
                    .push(self.op.as_sql())
                    .push(" ")
                    .push_bind(number);
            },
            None => {
                builder
                    .push("data ->> ")
                    .push_bind(self.key.clone())
                    .push(" ")
                    .push(self.op.as_sql())
                    .push(" ")
                    .push_bind(self.value.clone());
            },
        }
    }
}

/// Parses `key:op:value`; the value may itself contain `:`
impl FromStr for Filter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(op), Some(value)) => Filter::new(key, op.parse()?, value),
            _ => Err(StoreError::InvalidFilter(format!(
                "expected key:op:value, got '{s}'"
            ))),
        }
    }
}

/// Append ` WHERE a AND b ...` for a non-empty filter list
pub fn push_where(builder: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) {
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        filter.push_sql(builder);
    }
}

/// SQL `LIKE` semantics: `%` any run, `_` one character, `\` escapes
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_from(&text, &pattern)
}

fn like_from(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_from(&text[1..], rest),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == rest.first() && like_from(&text[1..], &rest[1..])
        },
        Some((c, rest)) => text.first() == Some(c) && like_from(&text[1..], rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_operators() {
        for (token, op) in [
            ("=", FilterOp::Eq),
            ("!=", FilterOp::Ne),
            ("<>", FilterOp::Ne),
            ("<", FilterOp::Lt),
            ("<=", FilterOp::Le),
            (">", FilterOp::Gt),
            (">=", FilterOp::Ge),
            ("LIKE", FilterOp::Like),
            ("like", FilterOp::Like),
        ] {
            assert_eq!(token.parse::<FilterOp>().unwrap(), op, "token {token}");
        }
        assert!("; DROP TABLE records".parse::<FilterOp>().is_err());
    }

    #[test]
    fn test_parse_filter_keeps_colons_in_value() {
        let filter: Filter = "created:>=:2024-01-01T00:00:00".parse().unwrap();
        assert_eq!(filter.key, "created");
        assert_eq!(filter.op, FilterOp::Ge);
        assert_eq!(filter.value, "2024-01-01T00:00:00");
    }

    #[test]
    fn test_parse_filter_rejects_malformed() {
        assert!("status".parse::<Filter>().is_err());
        assert!(":=:x".parse::<Filter>().is_err());
        assert!("a:~:x".parse::<Filter>().is_err());
    }

    #[test]
    fn test_numeric_comparison() {
        let doc = json!({"amount": 250, "code": "9"});

        assert!(Filter::new("amount", FilterOp::Gt, "100").unwrap().matches(&doc));
        assert!(!Filter::new("amount", FilterOp::Lt, "100").unwrap().matches(&doc));
        // strings never compare numerically, whatever they contain
        assert!(!Filter::new("code", FilterOp::Gt, "1").unwrap().matches(&doc));
    }

    #[test]
    fn test_numeric_comparison_skips_non_numbers() {
        let filter = Filter::new("amount", FilterOp::Ge, "100").unwrap();

        assert!(filter.matches(&json!({"amount": 150.5})));
        assert!(!filter.matches(&json!({"amount": "n/a"})));
        assert!(!filter.matches(&json!({"amount": "150"})));
        assert!(!filter.matches(&json!({"amount": null})));
        assert!(!filter.matches(&json!({"amount": [150]})));
    }

    #[test]
    fn test_text_comparison() {
        let doc = json!({"status": "active", "flag": true});

        assert!(Filter::new("status", FilterOp::Eq, "active").unwrap().matches(&doc));
        assert!(Filter::new("status", FilterOp::Ne, "closed").unwrap().matches(&doc));
        assert!(Filter::new("flag", FilterOp::Eq, "true").unwrap().matches(&doc));
        assert!(!Filter::new("missing", FilterOp::Ne, "x").unwrap().matches(&doc));
    }

    #[test]
    fn test_like() {
        let doc = json!({"name": "Alice Smith"});
        let like = |p: &str| Filter::new("name", FilterOp::Like, p).unwrap().matches(&doc);

        assert!(like("Alice%"));
        assert!(like("%Smith"));
        assert!(like("A_ice%"));
        assert!(!like("alice%"));
        assert!(!like("Bob%"));
        assert!(like_matches("100%", "100\\%"));
        assert!(!like_matches("1000", "100\\%"));
    }

    #[test]
    fn test_push_sql_binds_key_and_value() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT data FROM records");
        push_where(
            &mut builder,
            &[
                Filter::new("status", FilterOp::Eq, "active").unwrap(),
                Filter::new("amount", FilterOp::Ge, "10").unwrap(),
            ],
        );

        assert_eq!(
            builder.sql(),
            "SELECT data FROM records WHERE data ->> $1 = $2 AND \
             CASE WHEN jsonb_typeof(data -> $3) = 'number' THEN (data ->> $4)::float8 END >= $5"
        );
    }
}
