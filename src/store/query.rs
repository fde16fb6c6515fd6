//! Backend-neutral query description.
//!
//! Covers exactly what the workflows need: exact-match and range filters,
//! multi-key ordering, to-one embeds of a few columns from a referenced
//! collection, and a row limit.

use serde_json::Value;

use super::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub condition: Condition,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Self { field, condition: Condition::Eq, value: value.into() }
    }

    pub fn gte(field: &'static str, value: impl Into<Value>) -> Self {
        Self { field, condition: Condition::Gte, value: value.into() }
    }

    pub fn lte(field: &'static str, value: impl Into<Value>) -> Self {
        Self { field, condition: Condition::Lte, value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: &'static str,
    pub ascending: bool,
    pub nulls_first: bool,
}

/// To-one expansion: `alias` becomes a nested object (or null) holding
/// `columns` of the `collection` row whose `id` equals the base row's
/// `foreign_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub alias: &'static str,
    pub collection: Collection,
    pub foreign_key: &'static str,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    /// Empty means every column.
    pub columns: Vec<&'static str>,
    pub embeds: Vec<Embed>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            columns: Vec::new(),
            embeds: Vec::new(),
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&'static str]) -> Self {
        self.columns = columns.to_vec();
        self
    }

    pub fn embed(
        mut self,
        alias: &'static str,
        collection: Collection,
        foreign_key: &'static str,
        columns: &[&'static str],
    ) -> Self {
        self.embeds.push(Embed {
            alias,
            collection,
            foreign_key,
            columns: columns.to_vec(),
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    pub fn gte(self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::gte(field, value))
    }

    pub fn lte(self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::lte(field, value))
    }

    /// Ascending, nulls last.
    pub fn order_asc(self, field: &'static str) -> Self {
        self.order(Order { field, ascending: true, nulls_first: false })
    }

    /// Ascending with nulls sorted ahead of every value.
    pub fn order_asc_nulls_first(self, field: &'static str) -> Self {
        self.order(Order { field, ascending: true, nulls_first: true })
    }

    /// Descending, nulls last.
    pub fn order_desc(self, field: &'static str) -> Self {
        self.order(Order { field, ascending: false, nulls_first: false })
    }

    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Column and collection names are interpolated into SQL and URLs, so only
/// plain identifiers are allowed through.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_in_call_order() {
        let q = Query::new(Collection::Visits)
            .columns(&["id", "visit_date"])
            .gte("visit_date", "2024-01-10")
            .lte("visit_date", "2024-01-17")
            .order_asc("visit_date")
            .order_asc_nulls_first("visit_time")
            .limit(5);

        assert_eq!(q.columns, vec!["id", "visit_date"]);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[0].condition, Condition::Gte);
        assert_eq!(q.filters[1].condition, Condition::Lte);
        assert_eq!(q.orders[0].field, "visit_date");
        assert!(!q.orders[0].nulls_first);
        assert!(q.orders[1].nulls_first);
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("clinic_file_no"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("name; DROP TABLE patients"));
        assert!(!is_identifier("doctors.name"));
    }
}
