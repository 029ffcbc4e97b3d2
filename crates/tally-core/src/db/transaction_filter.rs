//! Transaction filter builder for constructing dynamic SQL queries
//!
//! Used by the audit list, the dashboard, and the HTTP query API so they
//! share one set of WHERE clauses.

use chrono::NaiveDate;

use crate::models::{TransactionSource, TransactionStatus, TransactionType};

/// Builder for constructing transaction query filters
///
/// The lifetime `'query` represents how long borrowed filter parameters
/// (search terms, sort field) must remain valid.
#[derive(Default)]
pub struct TransactionFilter<'query> {
    pub user_id: Option<&'query str>,
    pub statement_id: Option<i64>,
    pub search: Option<&'query str>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub source: Option<TransactionSource>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub sort_field: Option<&'query str>,
    pub sort_order: Option<&'query str>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> TransactionFilter<'query> {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one owner
    pub fn user_id(mut self, user_id: Option<&'query str>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Restrict to one statement
    pub fn statement_id(mut self, id: Option<i64>) -> Self {
        self.statement_id = id;
        self
    }

    /// Set search query (name, category, notes, merchant)
    pub fn search(mut self, query: Option<&'query str>) -> Self {
        self.search = query;
        self
    }

    pub fn transaction_type(mut self, value: Option<TransactionType>) -> Self {
        self.transaction_type = value;
        self
    }

    pub fn status(mut self, value: Option<TransactionStatus>) -> Self {
        self.status = value;
        self
    }

    pub fn source(mut self, value: Option<TransactionSource>) -> Self {
        self.source = value;
        self
    }

    /// Set inclusive date range filter
    pub fn date_range(mut self, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        self.date_range = range;
        self
    }

    /// Set sort field (date, amount, name, category, or created)
    pub fn sort_field(mut self, field: Option<&'query str>) -> Self {
        self.sort_field = field;
        self
    }

    /// Set sort order (asc or desc)
    pub fn sort_order(mut self, order: Option<&'query str>) -> Self {
        self.sort_order = order;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(user) = self.user_id {
            conditions.push("t.user_id = ?".to_string());
            params.push(Box::new(user.to_string()));
        }

        if let Some(sid) = self.statement_id {
            conditions.push("t.statement_id = ?".to_string());
            params.push(Box::new(sid));
        }

        if let Some(q) = self.search {
            if !q.trim().is_empty() {
                conditions.push(
                    "(t.transaction_name LIKE ? COLLATE NOCASE OR t.category LIKE ? COLLATE NOCASE \
                     OR t.notes LIKE ? COLLATE NOCASE OR t.merchant LIKE ? COLLATE NOCASE)"
                        .to_string(),
                );
                let pattern = format!("%{}%", q.trim());
                for _ in 0..4 {
                    params.push(Box::new(pattern.clone()));
                }
            }
        }

        if let Some(kind) = self.transaction_type {
            conditions.push("t.type = ?".to_string());
            params.push(Box::new(kind.as_str()));
        }

        if let Some(status) = self.status {
            conditions.push("t.status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        if let Some(source) = self.source {
            conditions.push("t.source = ?".to_string());
            params.push(Box::new(source.as_str()));
        }

        if let Some((from_date, to_date)) = self.date_range {
            conditions.push("t.date >= ? AND t.date <= ?".to_string());
            params.push(Box::new(from_date.to_string()));
            params.push(Box::new(to_date.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Whitelist sort columns; never interpolate caller input
        let sort_column = match self.sort_field {
            Some("amount") => "t.amount",
            Some("name") | Some("transaction_name") => "t.transaction_name",
            Some("category") => "t.category",
            Some("created") | Some("created_at") => "t.created_at",
            _ => "t.date",
        };
        let sort_dir = match self.sort_order {
            Some(o) if o.eq_ignore_ascii_case("asc") => "ASC",
            _ => "DESC",
        };
        let order_clause = format!("ORDER BY {} {}, t.id {}", sort_column, sort_dir, sort_dir);

        FilterResult {
            where_clause,
            order_clause,
            params,
        }
    }
}
