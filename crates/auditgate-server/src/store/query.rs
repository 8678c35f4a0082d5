//! Column-projected raw SQL queries
//!
//! Expressions, the table and the `WHERE` suffix are trusted SQL supplied by
//! application code, never by request input. Aliases are validated and
//! quoted because they become JSON keys of the result rows.

use serde::{Deserialize, Serialize};

use super::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionField {
    pub expr: String,
    pub alias: String,
}

impl ProjectionField {
    pub fn new(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionQuery {
    pub fields: Vec<ProjectionField>,
    pub table: String,
    #[serde(default)]
    pub suffix: String,
}

impl ProjectionQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            table: table.into(),
            suffix: String::new(),
        }
    }

    pub fn field(mut self, expr: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push(ProjectionField::new(expr, alias));
        self
    }

    /// Condition placed after `WHERE`; empty means no condition
    pub fn filter(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// `SELECT expr AS "alias", ... FROM table [WHERE suffix]`
    pub fn to_sql(&self) -> Result<String, StoreError> {
        if self.fields.is_empty() {
            return Err(StoreError::InvalidQuery(
                "projection has no fields".to_string(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(StoreError::InvalidQuery("projection has no table".to_string()));
        }

        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.expr.trim().is_empty() {
                return Err(StoreError::InvalidQuery(format!(
                    "empty expression for alias '{}'",
                    field.alias
                )));
            }
            if !is_identifier(&field.alias) {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid alias '{}'",
                    field.alias
                )));
            }
            columns.push(format!("{} AS \"{}\"", field.expr, field.alias));
        }

        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), self.table);
        let suffix = self.suffix.trim();
        if !suffix.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(suffix);
        }
        Ok(sql)
    }
}

/// Letters, digits and `_`, not starting with a digit
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql() {
        let query = ProjectionQuery::new("records")
            .field("id", "id")
            .field("data ->> 'status'", "status")
            .filter("data ->> 'status' = 'active'");

        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT id AS \"id\", data ->> 'status' AS \"status\" FROM records \
             WHERE data ->> 'status' = 'active'"
        );
    }

    #[test]
    fn test_to_sql_without_suffix() {
        let query = ProjectionQuery::new("records").field("count(*)", "total");
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT count(*) AS \"total\" FROM records"
        );
    }

    #[test]
    fn test_rejects_bad_projection() {
        assert!(ProjectionQuery::new("records").to_sql().is_err());
        assert!(ProjectionQuery::new("").field("id", "id").to_sql().is_err());
        assert!(ProjectionQuery::new("records")
            .field("id", "x\" FROM secrets --")
            .to_sql()
            .is_err());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("records"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
