//! SQL rendering for the options record.

use std::sync::Arc;

use super::{Compound, CompoundOp, LockMode, OrderDirection, Query, Source, FROM_SELF_ALIAS};
use crate::dialect::Dialect;
use crate::error::{CoreError, Result};
use crate::expr::Expr;

/// Values for an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValues {
    /// `DEFAULT VALUES`.
    Default,
    /// Values in table column order.
    Positional(Vec<Expr>),
    /// Explicit column/value pairs, rendered in the given order.
    Named(Vec<(String, Expr)>),
    /// `INSERT INTO t SELECT ...`.
    Select(Arc<Query>),
}

impl InsertValues {
    /// Builds named values from column/value pairs.
    pub fn named<V: Into<Expr>>(pairs: impl IntoIterator<Item = (&'static str, V)>) -> Self {
        Self::Named(
            pairs
                .into_iter()
                .map(|(c, v)| (String::from(c), v.into()))
                .collect(),
        )
    }
}

fn join_rendered(exprs: &[Expr], dialect: &dyn Dialect) -> Result<String> {
    let mut out = String::new();
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        e.render(dialect, &mut out)?;
    }
    Ok(out)
}

fn source_sql(source: &Source, dialect: &dyn Dialect) -> Result<String> {
    Ok(match source {
        Source::Table { name, alias: None } => dialect.literal_identifier(name),
        Source::Table {
            name,
            alias: Some(alias),
        } => format!(
            "{} AS {}",
            dialect.literal_identifier(name),
            dialect.literal_identifier(alias)
        ),
        Source::Subquery { query, alias } => format!(
            "({}) AS {}",
            query.select_sql(dialect)?,
            dialect.literal_identifier(alias)
        ),
    })
}

fn check_compound(compound: &Compound, dialect: &dyn Dialect) -> Result<()> {
    if compound.op == CompoundOp::Union {
        return Ok(());
    }
    let supported = if compound.all {
        dialect.supports_intersect_except_all()
    } else {
        dialect.supports_intersect_except()
    };
    if supported {
        Ok(())
    } else {
        Err(CoreError::UnsupportedOperation(format!(
            "{}{} is not supported by the {} dialect",
            compound.op.as_str(),
            if compound.all { " ALL" } else { "" },
            dialect.name()
        )))
    }
}

fn compound_member_sql(member: &Query, dialect: &dyn Dialect) -> Result<String> {
    let wrap = !member.order.is_empty()
        || member.limit.is_some()
        || member.offset.is_some()
        || !member.compounds.is_empty();
    if wrap {
        Ok(format!(
            "SELECT * FROM ({}) AS {}",
            member.select_sql(dialect)?,
            dialect.literal_identifier(FROM_SELF_ALIAS)
        ))
    } else {
        member.select_sql(dialect)
    }
}

impl Query {
    /// Verifies that every compound member is expressible in `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedOperation`] for `INTERSECT`/`EXCEPT`
    /// (or their `ALL` forms) on dialects without them.
    pub fn check_compounds(&self, dialect: &dyn Dialect) -> Result<()> {
        self.compounds
            .iter()
            .try_for_each(|c| check_compound(c, dialect))
    }

    /// Renders the SELECT statement.
    ///
    /// Rendering is deterministic: the same options and dialect always yield
    /// the same text.
    ///
    /// # Errors
    ///
    /// Fails when a compound operator is unsupported by `dialect`.
    pub fn select_sql(&self, dialect: &dyn Dialect) -> Result<String> {
        self.check_compounds(dialect)?;

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&join_rendered(&self.select, dialect)?);
        }

        if let Some(source) = &self.source {
            sql.push_str(" FROM ");
            sql.push_str(&source_sql(source, dialect)?);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_str());
            sql.push(' ');
            sql.push_str(&source_sql(&join.source, dialect)?);
            if let Some(on) = &join.on {
                sql.push_str(" ON ");
                on.render(dialect, &mut sql)?;
            }
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(dialect, &mut sql)?;
        }

        if !self.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&join_rendered(&self.group, dialect)?);
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            having.render(dialect, &mut sql)?;
        }

        for compound in &self.compounds {
            sql.push(' ');
            sql.push_str(compound.op.as_str());
            if compound.all {
                sql.push_str(" ALL");
            }
            sql.push(' ');
            sql.push_str(&compound_member_sql(&compound.query, dialect)?);
        }

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, ordering) in self.order.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                ordering.expr.render(dialect, &mut sql)?;
                sql.push_str(match ordering.direction {
                    OrderDirection::Asc => " ASC",
                    OrderDirection::Desc => " DESC",
                });
            }
        }

        sql.push_str(&dialect.limit_clause(self.limit, self.offset));

        if let Some(lock) = self.lock {
            if dialect.supports_locking() {
                sql.push_str(match lock {
                    LockMode::Update => " FOR UPDATE",
                    LockMode::Share => " FOR SHARE",
                });
            }
        }

        Ok(sql)
    }

    fn mutation_table(&self, action: &str) -> Result<&str> {
        let table = self.table_name().ok_or_else(|| {
            CoreError::InvalidOperation(format!("{action} requires a table source"))
        })?;
        let reason = if !self.joins.is_empty() {
            Some("joined")
        } else if !self.group.is_empty() {
            Some("grouped")
        } else if !self.compounds.is_empty() {
            Some("compound")
        } else {
            None
        };
        match reason {
            Some(shape) => Err(CoreError::InvalidOperation(format!(
                "cannot {action} a {shape} dataset"
            ))),
            None => Ok(table),
        }
    }

    /// Renders an INSERT into the source table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ColumnCount`] when positional values do not match
    /// the known column list, and [`CoreError::InvalidOperation`] when the
    /// dataset has no plain table source or is joined, grouped or compound.
    pub fn insert_sql(&self, values: &InsertValues, dialect: &dyn Dialect) -> Result<String> {
        let table = dialect.literal_identifier(self.mutation_table("insert into")?);
        match values {
            InsertValues::Default => Ok(format!("INSERT INTO {table} DEFAULT VALUES")),
            InsertValues::Positional(exprs) if exprs.is_empty() => {
                Ok(format!("INSERT INTO {table} DEFAULT VALUES"))
            }
            InsertValues::Named(pairs) if pairs.is_empty() => {
                Ok(format!("INSERT INTO {table} DEFAULT VALUES"))
            }
            InsertValues::Positional(exprs) => match self.known_columns() {
                Some(columns) if columns.len() != exprs.len() => Err(CoreError::ColumnCount {
                    expected: columns.len(),
                    actual: exprs.len(),
                }),
                Some(columns) => {
                    let names: Vec<String> = columns
                        .iter()
                        .map(|c| dialect.literal_identifier(c))
                        .collect();
                    Ok(format!(
                        "INSERT INTO {table} ({}) VALUES ({})",
                        names.join(", "),
                        join_rendered(exprs, dialect)?
                    ))
                }
                None => Ok(format!(
                    "INSERT INTO {table} VALUES ({})",
                    join_rendered(exprs, dialect)?
                )),
            },
            InsertValues::Named(pairs) => {
                let mut names = Vec::with_capacity(pairs.len());
                let mut rendered = Vec::with_capacity(pairs.len());
                for (name, value) in pairs {
                    names.push(dialect.literal_identifier(name));
                    rendered.push(value.to_sql(dialect)?);
                }
                Ok(format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    names.join(", "),
                    rendered.join(", ")
                ))
            }
            InsertValues::Select(query) => {
                Ok(format!("INSERT INTO {table} {}", query.select_sql(dialect)?))
            }
        }
    }

    /// Renders an UPDATE of the filtered rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an empty assignment list or
    /// a joined, grouped or compound dataset.
    pub fn update_sql(&self, assignments: &[(String, Expr)], dialect: &dyn Dialect) -> Result<String> {
        let table = dialect.literal_identifier(self.mutation_table("update")?);
        if assignments.is_empty() {
            return Err(CoreError::InvalidOperation(String::from(
                "update requires at least one column",
            )));
        }
        let mut sql = format!("UPDATE {table} SET ");
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&dialect.literal_identifier(column));
            sql.push_str(" = ");
            value.render(dialect, &mut sql)?;
        }
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(dialect, &mut sql)?;
        }
        Ok(sql)
    }

    /// Renders a DELETE of the filtered rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for a joined, grouped or
    /// compound dataset.
    pub fn delete_sql(&self, dialect: &dyn Dialect) -> Result<String> {
        let table = dialect.literal_identifier(self.mutation_table("delete from")?);
        let mut sql = format!("DELETE FROM {table}");
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(dialect, &mut sql)?;
        }
        Ok(sql)
    }
}
