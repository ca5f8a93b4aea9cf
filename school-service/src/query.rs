//! Filter and sort query construction
//!
//! Turns whitelisted query-string parameters into a parameterized SQL
//! fragment. Equality filters are bound by position, never interpolated;
//! only column names taken from the [`FieldRegistry`] reach the SQL text.
//!
//! # Example
//!
//! ```rust
//! use school_service::models::teacher_registry;
//! use school_service::query::QueryBuilder;
//!
//! let registry = teacher_registry().unwrap();
//! let builder = QueryBuilder::new(&registry);
//! let params = vec![
//!     ("class".to_string(), "9A".to_string()),
//!     ("sort-by".to_string(), "subject:asc".to_string()),
//!     ("sort-by".to_string(), "bogus".to_string()),
//!     ("sort-by".to_string(), "class:desc".to_string()),
//! ];
//!
//! let fragment = builder.build(&params).unwrap();
//! assert_eq!(fragment.filter, "class = ?");
//! assert_eq!(fragment.order, "subject asc, class desc");
//! assert_eq!(fragment.args.len(), 1);
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::fields::{FieldDescriptor, FieldRegistry, FieldValue, Record};

/// Query parameter carrying `field:direction` sort specs
pub const SORT_PARAM: &str = "sort-by";

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Asc,
    /// Sort in descending order (Z-A, 9-0)
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl SortOrder {
    /// Parse a direction keyword; only `asc` and `desc` are accepted
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// SQL keyword for this direction
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A validated equality filter
#[derive(Debug, Clone)]
pub struct FilterClause<'r, R: Record> {
    /// Filtered field
    pub field: &'r FieldDescriptor<R>,
    /// Value the column must equal, bound positionally
    pub value: FieldValue,
}

/// A validated sort key
#[derive(Debug, Clone)]
pub struct SortClause<'r, R: Record> {
    /// Sorted field
    pub field: &'r FieldDescriptor<R>,
    /// Direction for this key
    pub direction: SortOrder,
}

/// Rendered filter and order fragments plus their bound arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFragment {
    /// `col = ? AND col = ?`, empty when no filters apply
    pub filter: String,
    /// `col dir, col dir`, empty when no sort applies
    pub order: String,
    /// Positional arguments for the `?` placeholders in `filter`
    pub args: Vec<FieldValue>,
}

impl QueryFragment {
    /// Append the fragment to a base `SELECT ... FROM table` statement
    #[must_use]
    pub fn apply_to(&self, base: &str) -> String {
        let mut sql = String::from(base);
        if !self.filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filter);
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order);
        }
        sql
    }
}

/// Builds [`QueryFragment`]s against a field registry
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'r, R: Record> {
    registry: &'r FieldRegistry<R>,
}

impl<'r, R: Record> QueryBuilder<'r, R> {
    /// Create a builder that only recognizes fields in `registry`
    pub fn new(registry: &'r FieldRegistry<R>) -> Self {
        Self { registry }
    }

    /// Build filters and sort order from raw query pairs
    ///
    /// Filters come out in registry order using the first non-empty value
    /// of each recognized parameter. Sort specs come from every
    /// [`SORT_PARAM`] pair, in request order.
    pub fn build(&self, params: &[(String, String)]) -> Result<QueryFragment> {
        let filters = self.filters(params)?;
        let sort_specs: Vec<&str> = params
            .iter()
            .filter(|(key, _)| key == SORT_PARAM)
            .map(|(_, value)| value.as_str())
            .collect();
        let sorts = self.sorts(&sort_specs);

        Ok(render(filters, sorts))
    }

    /// Validate equality filters
    ///
    /// A value that cannot be converted to the field's kind is a validation
    /// error; empty values are ignored.
    pub fn filters(&self, params: &[(String, String)]) -> Result<Vec<FilterClause<'r, R>>> {
        let mut clauses = Vec::new();

        for descriptor in self.registry.iter().filter(|d| d.filterable) {
            let Some((_, raw)) = params
                .iter()
                .find(|(key, value)| key == descriptor.external_name && !value.is_empty())
            else {
                continue;
            };

            let value = descriptor.kind().parse_param(raw).ok_or_else(|| {
                Error::Validation(format!(
                    "filter '{}' expects a {} value",
                    descriptor.external_name,
                    descriptor.kind()
                ))
            })?;

            clauses.push(FilterClause {
                field: descriptor,
                value,
            });
        }

        Ok(clauses)
    }

    /// Validate `field:direction` tokens, silently dropping invalid ones
    pub fn sorts(&self, specs: &[&str]) -> Vec<SortClause<'r, R>> {
        specs
            .iter()
            .filter_map(|spec| {
                let clause = self.parse_sort(spec);
                if clause.is_none() {
                    tracing::debug!(spec = %spec, "Ignoring invalid sort spec");
                }
                clause
            })
            .collect()
    }

    fn parse_sort(&self, spec: &str) -> Option<SortClause<'r, R>> {
        let mut parts = spec.split(':');
        let (field, direction) = match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(direction), None) => (field, direction),
            _ => return None,
        };

        let descriptor = self.registry.get(field).filter(|d| d.sortable)?;
        let direction = SortOrder::parse(direction)?;

        Some(SortClause {
            field: descriptor,
            direction,
        })
    }
}

fn render<R: Record>(filters: Vec<FilterClause<'_, R>>, sorts: Vec<SortClause<'_, R>>) -> QueryFragment {
    let mut args = Vec::with_capacity(filters.len());
    let conditions: Vec<String> = filters
        .into_iter()
        .map(|clause| {
            args.push(clause.value);
            format!("{} = ?", clause.field.column)
        })
        .collect();

    let order: Vec<String> = sorts
        .iter()
        .map(|clause| format!("{} {}", clause.field.column, clause.direction))
        .collect();

    QueryFragment {
        filter: conditions.join(" AND "),
        order: order.join(", "),
        args,
    }
}
