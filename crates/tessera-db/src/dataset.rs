//! Executable datasets.
//!
//! A [`Dataset`] pairs a [`Query`] with the [`Database`] it runs against.
//! Refinement methods return new datasets and never touch the receiver;
//! execution methods render SQL with the database's dialect, run it through
//! the pool and decode the result.
//!
//! A dataset can also be switched into stored-procedure mode with
//! [`Dataset::prepare_sproc`], after which it renders a procedure call
//! instead of a SELECT. In that mode row fetches need a `Select` or `First`
//! call, `insert`, `update` and `delete` run the call when its kind matches,
//! and counting or aggregating is refused.

use std::sync::Arc;

use tessera_core::{
    CallKind, CompoundOp, Expr, FromSqlValue, InsertValues, JoinKind, LockMode, Ordering, Query,
    SqlValue, ToSqlValue,
};

use crate::database::Database;
use crate::driver::RawResult;
use crate::error::{Error, Result};
use crate::row::Row;

/// A prepared stored procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    /// How the result is consumed.
    pub kind: CallKind,
    /// Procedure name.
    pub name: String,
    /// Arguments bound so far.
    pub args: Vec<SqlValue>,
}

/// Result of a stored procedure call, shaped by its [`CallKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// Every returned row.
    Rows(Vec<Row>),
    /// The first returned row.
    Row(Option<Row>),
    /// Id generated by an insert.
    Inserted(Option<i64>),
    /// Rows changed.
    Affected(u64),
}

/// A query bound to a database.
#[derive(Debug, Clone)]
pub struct Dataset {
    db: Database,
    query: Query,
    procedure: Option<Procedure>,
}

impl Dataset {
    pub(crate) const fn new(db: Database, query: Query) -> Self {
        Self {
            db,
            query,
            procedure: None,
        }
    }

    /// The options record.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// The database this dataset runs against.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// The prepared procedure call, if any.
    #[must_use]
    pub const fn procedure(&self) -> Option<&Procedure> {
        self.procedure.as_ref()
    }

    fn refine(&self, f: impl FnOnce(&Query) -> Query) -> Self {
        Self {
            db: self.db.clone(),
            query: f(&self.query),
            procedure: self.procedure.clone(),
        }
    }

    /// Adds a condition, ANDed with the current filter.
    #[must_use]
    pub fn filter(&self, expr: impl Into<Expr>) -> Self {
        self.refine(|q| q.filter(expr))
    }

    /// Adds a condition, ORed with the current filter.
    #[must_use]
    pub fn or_filter(&self, expr: impl Into<Expr>) -> Self {
        self.refine(|q| q.or_filter(expr))
    }

    /// Adds a negated condition.
    #[must_use]
    pub fn exclude(&self, expr: impl Into<Expr>) -> Self {
        self.refine(|q| q.exclude(expr))
    }

    /// Removes the filter.
    #[must_use]
    pub fn unfiltered(&self) -> Self {
        self.refine(Query::unfiltered)
    }

    /// Replaces the projection.
    #[must_use]
    pub fn select<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        self.refine(|q| q.select(exprs))
    }

    /// Replaces the projection with plain columns.
    #[must_use]
    pub fn select_columns(&self, columns: &[&str]) -> Self {
        self.refine(|q| q.select_columns(columns))
    }

    /// Appends to the projection.
    #[must_use]
    pub fn select_append<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        self.refine(|q| q.select_append(exprs))
    }

    /// Resets the projection to `*`.
    #[must_use]
    pub fn select_all(&self) -> Self {
        self.refine(Query::select_all)
    }

    /// Marks the dataset `DISTINCT`.
    #[must_use]
    pub fn distinct(&self) -> Self {
        self.refine(Query::distinct)
    }

    /// Replaces GROUP BY.
    #[must_use]
    pub fn group<E: Into<Expr>>(&self, exprs: impl IntoIterator<Item = E>) -> Self {
        self.refine(|q| q.group(exprs))
    }

    /// Adds a HAVING condition.
    #[must_use]
    pub fn having(&self, expr: impl Into<Expr>) -> Self {
        self.refine(|q| q.having(expr))
    }

    /// Replaces the ordering.
    #[must_use]
    pub fn order<O: Into<Ordering>>(&self, orderings: impl IntoIterator<Item = O>) -> Self {
        self.refine(|q| q.order(orderings))
    }

    /// Appends to the ordering.
    #[must_use]
    pub fn order_more<O: Into<Ordering>>(&self, orderings: impl IntoIterator<Item = O>) -> Self {
        self.refine(|q| q.order_more(orderings))
    }

    /// Removes the ordering.
    #[must_use]
    pub fn unordered(&self) -> Self {
        self.refine(Query::unordered)
    }

    /// Flips every ordering direction.
    #[must_use]
    pub fn reverse(&self) -> Self {
        self.refine(Query::reverse)
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(&self, limit: u64) -> Self {
        self.refine(|q| q.limit(limit))
    }

    /// Removes limit and offset.
    #[must_use]
    pub fn unlimited(&self) -> Self {
        self.refine(Query::unlimited)
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.refine(|q| q.offset(offset))
    }

    /// Joins a table.
    #[must_use]
    pub fn join(&self, kind: JoinKind, table: &str, on: impl Into<Expr>) -> Self {
        self.refine(|q| q.join(kind, table, on))
    }

    /// Cross joins a table.
    #[must_use]
    pub fn cross_join(&self, table: &str) -> Self {
        self.refine(|q| q.cross_join(table))
    }

    /// Joins another dataset as an aliased sub-select.
    #[must_use]
    pub fn join_dataset(
        &self,
        kind: JoinKind,
        other: &Self,
        alias: &str,
        on: impl Into<Expr>,
    ) -> Self {
        self.refine(|q| q.join_query(kind, &other.query, alias, on))
    }

    /// Wraps the dataset as a sub-select.
    #[must_use]
    pub fn from_self(&self) -> Self {
        self.refine(Query::from_self)
    }

    /// Sets a row lock. Dropped from the SQL on dialects without locking.
    #[must_use]
    pub fn lock(&self, mode: LockMode) -> Self {
        self.refine(|q| q.lock(mode))
    }

    /// Records the table's column list so positional inserts are checked.
    #[must_use]
    pub fn with_columns(&self, columns: Arc<[String]>) -> Self {
        self.refine(|q| q.with_columns(columns))
    }

    /// Loads the table's column list from the schema cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] without a table source, or the
    /// error raised while reading the schema.
    pub async fn with_known_columns(&self) -> Result<Self> {
        let table = self.table()?;
        let columns = self.db.schema(table).await?;
        Ok(self.with_columns(columns))
    }

    /// `UNION` with another dataset.
    #[must_use]
    pub fn union(&self, other: &Self, all: bool) -> Self {
        self.refine(|q| q.union(&other.query, all))
    }

    /// `INTERSECT` with another dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] when the dialect lacks it.
    pub fn intersect(&self, other: &Self, all: bool) -> Result<Self> {
        self.checked_compound(CompoundOp::Intersect, other, all)
    }

    /// `EXCEPT` with another dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] when the dialect lacks it.
    pub fn except(&self, other: &Self, all: bool) -> Result<Self> {
        self.checked_compound(CompoundOp::Except, other, all)
    }

    fn checked_compound(&self, op: CompoundOp, other: &Self, all: bool) -> Result<Self> {
        let refined = self.refine(|q| q.compound(op, &other.query, all));
        refined.query.check_compounds(self.db.dialect())?;
        Ok(refined)
    }

    fn table(&self) -> Result<&str> {
        self.query
            .table_name()
            .ok_or_else(|| Error::InvalidOperation(String::from("dataset has no table source")))
    }

    /// Renders the SELECT (or the procedure call in procedure mode).
    ///
    /// # Errors
    ///
    /// Returns rendering errors such as unsupported compounds.
    pub fn sql(&self) -> Result<String> {
        self.select_statement(&self.query)
    }

    fn select_statement(&self, query: &Query) -> Result<String> {
        let dialect = self.db.dialect();
        match &self.procedure {
            Some(p) => Ok(dialect.call_procedure_sql(p.kind, &p.name, &p.args)?),
            None => Ok(query.select_sql(dialect)?),
        }
    }

    /// The prepared procedure, when its kind is one of `kinds`.
    fn procedure_for(&self, operation: &str, kinds: &[CallKind]) -> Result<Option<&Procedure>> {
        match &self.procedure {
            Some(p) if !kinds.contains(&p.kind) => Err(Error::InvalidOperation(format!(
                "{operation} is not available on a {:?} stored procedure call",
                p.kind
            ))),
            other => Ok(other.as_ref()),
        }
    }

    fn reject_procedure(&self, operation: &str) -> Result<()> {
        self.procedure_for(operation, &[]).map(|_| ())
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>> {
        self.procedure_for("fetching rows", &[CallKind::Select, CallKind::First])?;
        let sql = self.select_statement(query)?;
        self.db.fetch(&sql).await
    }

    /// Every row.
    ///
    /// # Errors
    ///
    /// Returns rendering, pool and driver errors.
    pub async fn all(&self) -> Result<Vec<Row>> {
        self.fetch(&self.query).await
    }

    /// Calls `f` for every row, in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns execution errors and the first error from `f`.
    pub async fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        for row in self.all().await? {
            f(row)?;
        }
        Ok(())
    }

    /// The first row, if any.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn first(&self) -> Result<Option<Row>> {
        Ok(self.fetch(&self.query.first()).await?.into_iter().next())
    }

    /// The first column of the first row, `None` for no rows or NULL.
    ///
    /// # Errors
    ///
    /// Returns execution errors and [`Error::Decode`].
    pub async fn single_value<T: FromSqlValue>(&self) -> Result<Option<T>> {
        let Some(row) = self.first().await? else {
            return Ok(None);
        };
        match row.values().first() {
            None | Some(SqlValue::Null) => Ok(None),
            Some(value) => Ok(Some(value.decode()?)),
        }
    }

    /// One column of every row.
    ///
    /// # Errors
    ///
    /// Returns execution errors and [`Error::Decode`].
    pub async fn map<T: FromSqlValue>(&self, column: &str) -> Result<Vec<T>> {
        self.all()
            .await?
            .iter()
            .map(|row| row.get(column))
            .collect()
    }

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn count(&self) -> Result<i64> {
        self.reject_procedure("count")?;
        let sql = self.query.count_query().select_sql(self.db.dialect())?;
        let rows = self.db.fetch(&sql).await?;
        match rows.first().and_then(|r| r.values().first()) {
            None | Some(SqlValue::Null) => Ok(0),
            Some(value) => Ok(value.decode()?),
        }
    }

    async fn aggregate(&self, function: &str, arg: impl Into<Expr>) -> Result<Option<SqlValue>> {
        self.reject_procedure(function)?;
        let sql = self
            .query
            .aggregate(function, arg.into())
            .select_sql(self.db.dialect())?;
        let rows = self.db.fetch(&sql).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .filter(|v| !v.is_null()))
    }

    /// `sum(expr)`, `None` when there are no non-NULL values.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn sum(&self, expr: impl Into<Expr>) -> Result<Option<SqlValue>> {
        self.aggregate("sum", expr).await
    }

    /// `avg(expr)`, `None` when there are no non-NULL values.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn avg(&self, expr: impl Into<Expr>) -> Result<Option<SqlValue>> {
        self.aggregate("avg", expr).await
    }

    /// `max(expr)`, `None` when there are no non-NULL values.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn max(&self, expr: impl Into<Expr>) -> Result<Option<SqlValue>> {
        self.aggregate("max", expr).await
    }

    /// `min(expr)`, `None` when there are no non-NULL values.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn min(&self, expr: impl Into<Expr>) -> Result<Option<SqlValue>> {
        self.aggregate("min", expr).await
    }

    /// Whether the dataset returns no rows.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn is_empty(&self) -> Result<bool> {
        self.reject_procedure("is_empty")?;
        let sql = self.query.exists_query().select_sql(self.db.dialect())?;
        Ok(self.db.fetch(&sql).await?.is_empty())
    }

    /// Column names the dataset returns.
    ///
    /// A plain `SELECT *` from a table uses the schema cache; anything else
    /// runs the query with `LIMIT 1` and reads the result header. A
    /// procedure call reports the header of the call.
    ///
    /// # Errors
    ///
    /// See [`Dataset::all`].
    pub async fn columns(&self) -> Result<Vec<String>> {
        if self
            .procedure_for("columns", &[CallKind::Select, CallKind::First])?
            .is_some()
        {
            let sql = self.sql()?;
            return Ok(self.db.execute(&sql).await?.columns);
        }
        if self.query.projection().is_empty() && self.query.is_simple() {
            if let Some(table) = self.query.table_name() {
                return Ok(self.db.schema(table).await?.to_vec());
            }
        }
        let sql = self.select_statement(&self.query.limit(1))?;
        Ok(self.db.execute(&sql).await?.columns)
    }

    /// Renders an INSERT.
    ///
    /// # Errors
    ///
    /// See [`Query::insert_sql`].
    pub fn insert_sql(&self, values: &InsertValues) -> Result<String> {
        self.reject_procedure("insert_sql")?;
        Ok(self.query.insert_sql(values, self.db.dialect())?)
    }

    /// Inserts a row and returns the generated id, when reported.
    ///
    /// An `Insert` procedure call passes the literal values as extra
    /// arguments instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnCount`] for positional values that do not match
    /// known columns, plus execution errors.
    pub async fn insert(&self, values: InsertValues) -> Result<Option<i64>> {
        if self.procedure_for("insert", &[CallKind::Insert])?.is_some() {
            let args = match values {
                InsertValues::Default => Vec::new(),
                InsertValues::Positional(exprs) => literal_args(exprs)?,
                InsertValues::Named(pairs) => literal_args(pairs.into_iter().map(|(_, e)| e))?,
                InsertValues::Select(_) => {
                    return Err(Error::InvalidOperation(String::from(
                        "a stored procedure call cannot insert from a query",
                    )))
                }
            };
            return Ok(self.call_raw(args).await?.last_insert_id);
        }
        let sql = self.insert_sql(&values)?;
        Ok(self.db.execute(&sql).await?.last_insert_id)
    }

    fn assignments<K: Into<String>, V: Into<Expr>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Vec<(String, Expr)> {
        pairs.into_iter().map(|(c, v)| (c.into(), v.into())).collect()
    }

    /// Renders an UPDATE.
    ///
    /// # Errors
    ///
    /// See [`Query::update_sql`].
    pub fn update_sql<K: Into<String>, V: Into<Expr>>(
        &self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<String> {
        self.reject_procedure("update_sql")?;
        Ok(self
            .query
            .update_sql(&Self::assignments(pairs), self.db.dialect())?)
    }

    /// Updates the filtered rows and returns how many changed.
    ///
    /// An `Update` procedure call passes the literal values as extra
    /// arguments instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for joined, grouped or compound
    /// datasets, plus execution errors.
    pub async fn update<K: Into<String>, V: Into<Expr>>(
        &self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<u64> {
        if self.procedure_for("update", &[CallKind::Update])?.is_some() {
            let args = literal_args(Self::assignments(pairs).into_iter().map(|(_, e)| e))?;
            return Ok(self.call_raw(args).await?.rows_affected);
        }
        let sql = self.update_sql(pairs)?;
        Ok(self.db.execute(&sql).await?.rows_affected)
    }

    /// Renders a DELETE.
    ///
    /// # Errors
    ///
    /// See [`Query::delete_sql`].
    pub fn delete_sql(&self) -> Result<String> {
        self.reject_procedure("delete_sql")?;
        Ok(self.query.delete_sql(self.db.dialect())?)
    }

    /// Deletes the filtered rows and returns how many were removed.
    ///
    /// A `Delete` procedure call runs with its bound arguments instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for joined, grouped or compound
    /// datasets, plus execution errors.
    pub async fn delete(&self) -> Result<u64> {
        if self.procedure_for("delete", &[CallKind::Delete])?.is_some() {
            return Ok(self.call_raw(Vec::<SqlValue>::new()).await?.rows_affected);
        }
        let sql = self.delete_sql()?;
        Ok(self.db.execute(&sql).await?.rows_affected)
    }

    /// Switches to stored-procedure mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] when the dialect has no stored
    /// procedures. Nothing is sent to the database.
    pub fn prepare_sproc(&self, kind: CallKind, name: &str) -> Result<Self> {
        let dialect = self.db.dialect();
        if !dialect.supports_stored_procedures() {
            return Err(Error::UnsupportedOperation(format!(
                "stored procedures are not supported by the {} dialect",
                dialect.name()
            )));
        }
        Ok(Self {
            db: self.db.clone(),
            query: self.query.clone(),
            procedure: Some(Procedure {
                kind,
                name: String::from(name),
                args: Vec::new(),
            }),
        })
    }

    /// Binds arguments ahead of the call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the dataset is not in
    /// procedure mode.
    pub fn bind<T: ToSqlValue>(&self, args: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut procedure = self.procedure.clone().ok_or_else(|| {
            Error::InvalidOperation(String::from("bind requires a prepared stored procedure"))
        })?;
        procedure
            .args
            .extend(args.into_iter().map(ToSqlValue::to_sql_value));
        Ok(Self {
            procedure: Some(procedure),
            ..self.clone()
        })
    }

    /// Calls the prepared procedure with bound arguments followed by `args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the dataset is not in
    /// procedure mode, plus execution errors.
    pub async fn call<T: ToSqlValue>(&self, args: impl IntoIterator<Item = T>) -> Result<CallResult> {
        let kind = self
            .procedure
            .as_ref()
            .map(|p| p.kind)
            .ok_or_else(|| {
                Error::InvalidOperation(String::from("call requires a prepared stored procedure"))
            })?;
        let raw = self.call_raw(args).await?;
        Ok(match kind {
            CallKind::Select => CallResult::Rows(Row::from_raw(raw)),
            CallKind::First => CallResult::Row(Row::from_raw(raw).into_iter().next()),
            CallKind::Insert => CallResult::Inserted(raw.last_insert_id),
            CallKind::Update | CallKind::Delete => CallResult::Affected(raw.rows_affected),
        })
    }

    async fn call_raw<T: ToSqlValue>(&self, args: impl IntoIterator<Item = T>) -> Result<RawResult> {
        let sql = self.bind(args)?.sql()?;
        self.db.execute(&sql).await
    }
}

fn literal_args(exprs: impl IntoIterator<Item = Expr>) -> Result<Vec<SqlValue>> {
    exprs
        .into_iter()
        .map(|expr| match expr {
            Expr::Literal(value) => Ok(value),
            other => Err(Error::InvalidOperation(format!(
                "stored procedure arguments must be literal values, got {other:?}"
            ))),
        })
        .collect()
}
