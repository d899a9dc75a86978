use std::collections::HashMap;

use serde_json::Value as JsonValue;

const DEFAULT_LIMIT: usize = 100;

/// A single equality filter on a document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    key: String,
    value: JsonValue,
}

impl Expr {
    pub fn eq<V: Into<JsonValue>>(
        key: &str,
        value: V,
    ) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }
}

/// Collection query: `and`-ed filters, ordering and paging.
#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<Expr>,
    // (key, descending)
    order_by: Vec<(String, bool)>,
    limit: usize,
    offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_filter(
        mut self,
        expr: Expr,
    ) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn with_order(
        mut self,
        key: &str,
        rev: bool,
    ) -> Self {
        self.order_by.push((key.to_string(), rev));
        self
    }

    pub fn with_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_offset(
        mut self,
        offset: usize,
    ) -> Self {
        self.offset = offset;
        self
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn order_by(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether a document satisfies every filter.
    pub fn is_match(
        &self,
        doc: &HashMap<String, JsonValue>,
    ) -> bool {
        self.filters.iter().all(|expr| doc.get(&expr.key) == Some(&expr.value))
    }
}
