//! The immutable query options record.
//!
//! A [`Query`] describes everything a dataset knows about the statement it
//! will produce: source, projection, filters, joins, grouping, ordering,
//! paging, compounds and locking. Every refinement method clones the record,
//! changes one option, and returns the new value; the receiver is never
//! modified, so any query can be shared and refined independently.

mod render;

use std::sync::Arc;

pub use render::InsertValues;

use crate::expr::{col, count_all, func, Expr};

/// Alias used when a query is wrapped as a sub-select.
pub const FROM_SELF_ALIAS: &str = "t1";

/// How a stored procedure call is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Returns all rows.
    Select,
    /// Returns the first row.
    First,
    /// Returns the inserted id.
    Insert,
    /// Returns affected rows.
    Update,
    /// Returns affected rows.
    Delete,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

/// A single ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// Sorted expression.
    pub expr: Expr,
    /// Direction.
    pub direction: OrderDirection,
}

impl Ordering {
    /// Ascending ordering.
    #[must_use]
    pub const fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Asc,
        }
    }

    /// Descending ordering.
    #[must_use]
    pub const fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Desc,
        }
    }

    /// Flips the direction.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            direction: match self.direction {
                OrderDirection::Asc => OrderDirection::Desc,
                OrderDirection::Desc => OrderDirection::Asc,
            },
        }
    }
}

impl From<Expr> for Ordering {
    fn from(expr: Expr) -> Self {
        Self::asc(expr)
    }
}

impl From<&str> for Ordering {
    fn from(column: &str) -> Self {
        Self::asc(col(column))
    }
}

/// What a query reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A table, optionally aliased.
    Table {
        /// Table name.
        name: String,
        /// Alias.
        alias: Option<String>,
    },
    /// An aliased sub-select.
    Subquery {
        /// Inner query.
        query: Arc<Query>,
        /// Alias.
        alias: String,
    },
}

impl Source {
    /// Plain table source.
    #[must_use]
    pub fn table(name: &str) -> Self {
        Self::Table {
            name: String::from(name),
            alias: None,
        }
    }

    /// The table name when the source is a plain table.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Self::Table { name, .. } => Some(name),
            Self::Subquery { .. } => None,
        }
    }
}

/// Join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL JOIN`
    Full,
    /// `CROSS JOIN`
    Cross,
}

impl JoinKind {
    /// SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join type.
    pub kind: JoinKind,
    /// Joined source.
    pub source: Source,
    /// `ON` condition.
    pub on: Option<Expr>,
}

/// Compound operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    /// `UNION`
    Union,
    /// `INTERSECT`
    Intersect,
    /// `EXCEPT`
    Except,
}

impl CompoundOp {
    /// SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
        }
    }
}

/// A compound member.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    /// Operator.
    pub op: CompoundOp,
    /// Keep duplicates (`ALL`).
    pub all: bool,
    /// Member query.
    pub query: Arc<Query>,
}

/// Row locking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// `FOR UPDATE`
    Update,
    /// `FOR SHARE`
    Share,
}

/// The immutable options record behind a dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub(crate) source: Option<Source>,
    pub(crate) distinct: bool,
    pub(crate) select: Vec<Expr>,
    pub(crate) filter: Option<Expr>,
    pub(crate) joins: Vec<Join>,
    pub(crate) group: Vec<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) order: Vec<Ordering>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) compounds: Vec<Compound>,
    pub(crate) lock: Option<LockMode>,
    pub(crate) columns: Option<Arc<[String]>>,
}

fn and_merge(existing: Option<&Expr>, expr: Expr) -> Expr {
    match existing {
        Some(current) => current.clone().and(expr),
        None => expr,
    }
}

impl Query {
    /// A query with no source (`SELECT *`), mostly useful with [`Query::select`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A query reading from `table`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: &str) -> Self {
        Self {
            source: Some(Source::table(table)),
            ..Self::default()
        }
    }

    /// A query reading from an arbitrary source.
    #[must_use]
    pub fn from_source(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// The source, if any.
    #[must_use]
    pub const fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// The table name when the source is a plain table.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.source.as_ref().and_then(Source::table_name)
    }

    /// Current filter.
    #[must_use]
    pub const fn filter_expr(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    /// Current projection. Empty means `*`.
    #[must_use]
    pub fn projection(&self) -> &[Expr] {
        &self.select
    }

    /// Current ORDER BY terms.
    #[must_use]
    pub fn orderings(&self) -> &[Ordering] {
        &self.order
    }

    /// Current limit.
    #[must_use]
    pub const fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Current offset.
    #[must_use]
    pub const fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Compound members.
    #[must_use]
    pub fn compounds(&self) -> &[Compound] {
        &self.compounds
    }

    /// Lock mode.
    #[must_use]
    pub const fn lock_mode(&self) -> Option<LockMode> {
        self.lock
    }

    /// Whether the query is `DISTINCT`.
    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Columns known for the source table.
    #[must_use]
    pub fn known_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Whether the query has joins, grouping or compounds.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.joins.is_empty() && self.group.is_empty() && self.compounds.is_empty()
    }

    /// Records the column list of the source table, used to check positional
    /// inserts.
    #[must_use]
    pub fn with_columns(&self, columns: Arc<[String]>) -> Self {
        Self {
            columns: Some(columns),
            ..self.clone()
        }
    }

    /// Replaces the projection.
    #[must_use]
    pub fn select<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        Self {
            select: exprs.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Replaces the projection with plain columns.
    #[must_use]
    pub fn select_columns(&self, columns: &[&str]) -> Self {
        self.select(columns.iter().map(|c| col(c)))
    }

    /// Appends to the projection. An empty projection is treated as `*`.
    #[must_use]
    pub fn select_append<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        let mut select = if self.select.is_empty() {
            vec![Expr::Star]
        } else {
            self.select.clone()
        };
        select.extend(exprs.into_iter().map(Into::into));
        Self {
            select,
            ..self.clone()
        }
    }

    /// Resets the projection to `*`.
    #[must_use]
    pub fn select_all(&self) -> Self {
        Self {
            select: Vec::new(),
            ..self.clone()
        }
    }

    /// Marks the query `DISTINCT`.
    #[must_use]
    pub fn distinct(&self) -> Self {
        Self {
            distinct: true,
            ..self.clone()
        }
    }

    /// Adds a condition, ANDed with the current filter.
    #[must_use]
    pub fn filter(&self, expr: impl Into<Expr>) -> Self {
        Self {
            filter: Some(and_merge(self.filter.as_ref(), expr.into())),
            ..self.clone()
        }
    }

    /// Adds a condition, ORed with the current filter. Without a current
    /// filter this is a plain filter.
    #[must_use]
    pub fn or_filter(&self, expr: impl Into<Expr>) -> Self {
        let expr = expr.into();
        Self {
            filter: Some(match &self.filter {
                Some(current) => current.clone().or(expr),
                None => expr,
            }),
            ..self.clone()
        }
    }

    /// Adds a negated condition.
    #[must_use]
    pub fn exclude(&self, expr: impl Into<Expr>) -> Self {
        self.filter(expr.into().not())
    }

    /// Removes the filter.
    #[must_use]
    pub fn unfiltered(&self) -> Self {
        Self {
            filter: None,
            ..self.clone()
        }
    }

    /// Adds a HAVING condition, ANDed with the current one.
    #[must_use]
    pub fn having(&self, expr: impl Into<Expr>) -> Self {
        Self {
            having: Some(and_merge(self.having.as_ref(), expr.into())),
            ..self.clone()
        }
    }

    /// Replaces the GROUP BY expressions.
    #[must_use]
    pub fn group<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        Self {
            group: exprs.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Replaces the ordering.
    #[must_use]
    pub fn order<O: Into<Ordering>>(&self, orderings: impl IntoIterator<Item = O>) -> Self {
        Self {
            order: orderings.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Appends to the ordering.
    #[must_use]
    pub fn order_more<O: Into<Ordering>>(&self, orderings: impl IntoIterator<Item = O>) -> Self {
        let mut order = self.order.clone();
        order.extend(orderings.into_iter().map(Into::into));
        Self {
            order,
            ..self.clone()
        }
    }

    /// Removes the ordering.
    #[must_use]
    pub fn unordered(&self) -> Self {
        Self {
            order: Vec::new(),
            ..self.clone()
        }
    }

    /// Flips every ordering direction.
    #[must_use]
    pub fn reverse(&self) -> Self {
        Self {
            order: self.order.iter().map(Ordering::invert).collect(),
            ..self.clone()
        }
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(&self, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..self.clone()
        }
    }

    /// Removes limit and offset.
    #[must_use]
    pub fn unlimited(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    /// Adds a join against a table.
    #[must_use]
    pub fn join(&self, kind: JoinKind, table: &str, on: impl Into<Expr>) -> Self {
        self.push_join(Join {
            kind,
            source: Source::table(table),
            on: Some(on.into()),
        })
    }

    /// Adds a join against a sub-select under `alias`.
    #[must_use]
    pub fn join_query(&self, kind: JoinKind, query: &Self, alias: &str, on: impl Into<Expr>) -> Self {
        self.push_join(Join {
            kind,
            source: Source::Subquery {
                query: Arc::new(query.clone()),
                alias: String::from(alias),
            },
            on: Some(on.into()),
        })
    }

    /// Adds a `CROSS JOIN`.
    #[must_use]
    pub fn cross_join(&self, table: &str) -> Self {
        self.push_join(Join {
            kind: JoinKind::Cross,
            source: Source::table(table),
            on: None,
        })
    }

    fn push_join(&self, join: Join) -> Self {
        let mut joins = self.joins.clone();
        joins.push(join);
        Self {
            joins,
            ..self.clone()
        }
    }

    /// Wraps this query as the source of a new one: `SELECT * FROM (...) AS t1`.
    #[must_use]
    pub fn from_self(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            ..Self::from_source(Source::Subquery {
                query: Arc::new(self.clone()),
                alias: String::from(FROM_SELF_ALIAS),
            })
        }
    }

    /// Appends a compound member.
    ///
    /// A receiver that already orders or limits its rows is wrapped with
    /// [`Query::from_self`] first so the compound applies to the paged rows.
    /// Dialect capability is checked when the SQL is rendered.
    #[must_use]
    pub fn compound(&self, op: CompoundOp, other: &Self, all: bool) -> Self {
        let base = if self.order.is_empty() && self.limit.is_none() && self.offset.is_none() {
            self.clone()
        } else {
            self.from_self()
        };
        let mut compounds = base.compounds.clone();
        compounds.push(Compound {
            op,
            all,
            query: Arc::new(other.clone()),
        });
        Self { compounds, ..base }
    }

    /// `UNION`.
    #[must_use]
    pub fn union(&self, other: &Self, all: bool) -> Self {
        self.compound(CompoundOp::Union, other, all)
    }

    /// `INTERSECT`.
    #[must_use]
    pub fn intersect(&self, other: &Self, all: bool) -> Self {
        self.compound(CompoundOp::Intersect, other, all)
    }

    /// `EXCEPT`.
    #[must_use]
    pub fn except(&self, other: &Self, all: bool) -> Self {
        self.compound(CompoundOp::Except, other, all)
    }

    /// Sets a row lock.
    #[must_use]
    pub fn lock(&self, mode: LockMode) -> Self {
        Self {
            lock: Some(mode),
            ..self.clone()
        }
    }

    /// `SELECT * ... LIMIT 1` keeping the current filter and order.
    #[must_use]
    pub fn first(&self) -> Self {
        self.limit(1)
    }

    /// The query behind an aggregate such as `sum(col)`:
    /// `SELECT fn(arg) AS fn FROM ... LIMIT 1`.
    ///
    /// Queries whose row set is shaped by paging, `DISTINCT`, grouping or
    /// compounds are wrapped with [`Query::from_self`] so the aggregate sees
    /// the same rows a plain select would return.
    #[must_use]
    pub fn aggregate(&self, function: &str, arg: Expr) -> Self {
        let base = if self.needs_wrapping_for_aggregate() {
            self.from_self()
        } else {
            self.unordered()
        };
        Self {
            select: vec![func(function, vec![arg]).alias(function)],
            lock: None,
            ..base
        }
        .limit(1)
    }

    /// `SELECT count(*) AS count FROM ... LIMIT 1`.
    #[must_use]
    pub fn count_query(&self) -> Self {
        let base = if self.needs_wrapping_for_aggregate() {
            self.from_self()
        } else {
            self.unordered()
        };
        Self {
            select: vec![count_all().alias("count")],
            lock: None,
            ..base
        }
        .limit(1)
    }

    /// `SELECT 1 AS one FROM ... LIMIT 1`, used to test for emptiness.
    #[must_use]
    pub fn exists_query(&self) -> Self {
        let base = if self.needs_wrapping_for_aggregate() {
            self.from_self()
        } else {
            self.unordered()
        };
        Self {
            select: vec![Expr::from(1_i64).alias("one")],
            lock: None,
            ..base
        }
        .limit(1)
    }

    fn needs_wrapping_for_aggregate(&self) -> bool {
        self.limit.is_some()
            || self.offset.is_some()
            || self.distinct
            || !self.group.is_empty()
            || !self.compounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refinement_does_not_mutate_receiver() {
        let base = Query::from("items");
        let filtered = base.filter(col("price").gt(10));
        assert!(base.filter_expr().is_none());
        assert!(filtered.filter_expr().is_some());
        assert_eq!(base, Query::from("items"));
    }

    #[test]
    fn test_filter_is_conjunctive() {
        let a = col("a").eq(1);
        let b = col("b").eq(2);
        let chained = Query::from("t").filter(a.clone()).filter(b.clone());
        let combined = Query::from("t").filter(a.and(b));
        assert_eq!(chained, combined);
    }

    #[test]
    fn test_reverse_flips_directions() {
        let q = Query::from("t").order([col("a").asc(), col("b").desc()]).reverse();
        let dirs: Vec<_> = q.orderings().iter().map(|o| o.direction).collect();
        assert_eq!(dirs, vec![OrderDirection::Desc, OrderDirection::Asc]);
    }

    #[test]
    fn test_compound_on_limited_query_wraps() {
        let a = Query::from("a").limit(5);
        let b = Query::from("b");
        let u = a.union(&b, false);
        assert!(matches!(u.source(), Some(Source::Subquery { .. })));
        assert_eq!(u.compounds().len(), 1);
        assert_eq!(u.limit_value(), None);
    }

    #[test]
    fn test_with_columns_survives_refinement() {
        let cols: Arc<[String]> = Arc::from(vec![String::from("id"), String::from("name")]);
        let q = Query::from("t").with_columns(cols).filter(col("id").eq(1));
        assert_eq!(q.known_columns().map(<[String]>::len), Some(2));
    }
}
