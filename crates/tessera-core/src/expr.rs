//! Immutable expression trees.
//!
//! Expressions are built from a small set of combinators and rendered to SQL
//! by a [`Dialect`]. Literal values are carried as [`SqlValue`]s and only turn
//! into text through the dialect's literalizer; [`raw`] is the one explicit
//! escape hatch and its content is trusted as written.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::query::{Ordering, Query};
use crate::value::{SqlValue, ToSqlValue};

/// Creates a column reference. A dotted name (`users.id`) is qualified.
#[must_use]
pub fn col(name: &str) -> Expr {
    Expr::Column(ColumnRef::parse(name))
}

/// Creates a literal value expression.
#[must_use]
pub fn lit<T: ToSqlValue>(value: T) -> Expr {
    Expr::Literal(value.to_sql_value())
}

/// Creates a raw SQL fragment.
///
/// **Warning**: the text is inserted verbatim. Never pass user input here.
#[must_use]
pub fn raw(sql: impl Into<String>) -> Expr {
    Expr::Raw(sql.into())
}

/// Creates a SQL function call such as `lower(name)`.
#[must_use]
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: String::from(name),
        args,
        distinct: false,
    }
}

/// `count(*)`.
#[must_use]
pub fn count_all() -> Expr {
    func("count", vec![Expr::Star])
}

/// `*`.
#[must_use]
pub const fn star() -> Expr {
    Expr::Star
}

/// A column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Optional table qualifier.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Creates a qualified column reference.
    #[must_use]
    pub fn qualified(table: &str, name: &str) -> Self {
        Self {
            table: Some(String::from(table)),
            name: String::from(name),
        }
    }

    fn parse(name: &str) -> Self {
        match name.split_once('.') {
            Some((table, column)) => Self::qualified(table, column),
            None => Self {
                table: None,
                name: String::from(name),
            },
        }
    }

    fn to_sql(&self, dialect: &dyn Dialect) -> String {
        match &self.table {
            Some(t) => format!(
                "{}.{}",
                dialect.literal_identifier(t),
                dialect.literal_identifier(&self.name)
            ),
            None => dialect.literal_identifier(&self.name),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
        })
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `NOT`
    Not,
    /// Arithmetic negation.
    Neg,
}

/// An expression tree node.
///
/// Children are reference counted so trees can be shared between datasets
/// without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column reference.
    Column(ColumnRef),
    /// A literal value.
    Literal(SqlValue),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Arc<Expr>,
        /// Right operand.
        right: Arc<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Arc<Expr>,
    },
    /// Caller-trusted SQL, emitted verbatim.
    Raw(String),
    /// A parenthesized sub-select.
    Subquery(Arc<Query>),
    /// A function call.
    Function {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
        /// Whether the arguments are prefixed with `DISTINCT`.
        distinct: bool,
    },
    /// An aliased expression (`expr AS alias`).
    Alias {
        /// Aliased expression.
        expr: Arc<Expr>,
        /// Alias name.
        alias: String,
    },
    /// `*`
    Star,
}

impl Expr {
    fn binary(self, op: BinaryOp, right: impl Into<Self>) -> Self {
        Self::Binary {
            op,
            left: Arc::new(self),
            right: Arc::new(right.into()),
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary {
            op,
            operand: Arc::new(self),
        }
    }

    /// Creates an equality expression.
    #[must_use]
    pub fn eq(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Eq, value)
    }

    /// Creates an inequality expression.
    #[must_use]
    pub fn not_eq(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::NotEq, value)
    }

    /// Creates a less-than expression.
    #[must_use]
    pub fn lt(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Lt, value)
    }

    /// Creates a less-than-or-equal expression.
    #[must_use]
    pub fn lt_eq(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::LtEq, value)
    }

    /// Creates a greater-than expression.
    #[must_use]
    pub fn gt(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Gt, value)
    }

    /// Creates a greater-than-or-equal expression.
    #[must_use]
    pub fn gt_eq(self, value: impl Into<Self>) -> Self {
        self.binary(BinaryOp::GtEq, value)
    }

    /// Creates a LIKE expression.
    #[must_use]
    pub fn like(self, pattern: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Like, pattern)
    }

    /// Creates a NOT LIKE expression.
    #[must_use]
    pub fn not_like(self, pattern: impl Into<Self>) -> Self {
        self.binary(BinaryOp::NotLike, pattern)
    }

    /// Creates an IN expression over a list of values, kept in order.
    #[must_use]
    pub fn in_list<T: ToSqlValue>(self, values: impl IntoIterator<Item = T>) -> Self {
        self.binary(BinaryOp::In, crate::value::array(values))
    }

    /// Creates a NOT IN expression over a list of values.
    #[must_use]
    pub fn not_in_list<T: ToSqlValue>(self, values: impl IntoIterator<Item = T>) -> Self {
        self.binary(BinaryOp::NotIn, crate::value::array(values))
    }

    /// Creates an IN expression against a sub-select.
    #[must_use]
    pub fn in_query(self, query: impl Into<Query>) -> Self {
        self.binary(BinaryOp::In, Self::Subquery(Arc::new(query.into())))
    }

    /// Creates a NOT IN expression against a sub-select.
    #[must_use]
    pub fn not_in_query(self, query: impl Into<Query>) -> Self {
        self.binary(BinaryOp::NotIn, Self::Subquery(Arc::new(query.into())))
    }

    /// Creates an IS NULL expression.
    #[must_use]
    pub fn is_null(self) -> Self {
        self.binary(BinaryOp::Is, SqlValue::Null)
    }

    /// Creates an IS NOT NULL expression.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.binary(BinaryOp::IsNot, SqlValue::Null)
    }

    /// Creates an AND expression.
    #[must_use]
    pub fn and(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Creates an OR expression.
    #[must_use]
    pub fn or(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Negates the expression with NOT.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    /// Aliases the expression (`expr AS alias`).
    #[must_use]
    pub fn alias(self, alias: &str) -> Self {
        Self::Alias {
            expr: Arc::new(self),
            alias: String::from(alias),
        }
    }

    /// Marks a function call as `DISTINCT`. Other expressions are unchanged.
    #[must_use]
    pub fn distinct(self) -> Self {
        match self {
            Self::Function { name, args, .. } => Self::Function {
                name,
                args,
                distinct: true,
            },
            other => other,
        }
    }

    /// Ascending ordering on this expression.
    #[must_use]
    pub fn asc(self) -> Ordering {
        Ordering::asc(self)
    }

    /// Descending ordering on this expression.
    #[must_use]
    pub fn desc(self) -> Ordering {
        Ordering::desc(self)
    }

    /// Renders the expression for a dialect.
    ///
    /// # Errors
    ///
    /// Fails only when a nested sub-select cannot be rendered by `dialect`.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<String> {
        let mut out = String::new();
        self.render(dialect, &mut out)?;
        Ok(out)
    }

    pub(crate) fn render(&self, dialect: &dyn Dialect, out: &mut String) -> Result<()> {
        match self {
            Self::Column(c) => out.push_str(&c.to_sql(dialect)),
            Self::Literal(v) => out.push_str(&dialect.literal(v)),
            Self::Raw(sql) => out.push_str(sql),
            Self::Star => out.push('*'),
            Self::Subquery(q) => {
                out.push('(');
                out.push_str(&q.select_sql(dialect)?);
                out.push(')');
            }
            Self::Binary { op, left, right } => render_binary(*op, left, right, dialect, out)?,
            Self::Unary { op, operand } => {
                out.push_str(match op {
                    UnaryOp::Not => "NOT ",
                    UnaryOp::Neg => "-",
                });
                operand.render(dialect, out)?;
            }
            Self::Function {
                name,
                args,
                distinct,
            } => {
                out.push_str(name);
                out.push('(');
                if *distinct {
                    out.push_str("DISTINCT ");
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.render(dialect, out)?;
                }
                out.push(')');
            }
            Self::Alias { expr, alias } => {
                expr.render(dialect, out)?;
                out.push_str(" AS ");
                out.push_str(&dialect.literal_identifier(alias));
            }
        }
        Ok(())
    }
}

fn render_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    dialect: &dyn Dialect,
    out: &mut String,
) -> Result<()> {
    let op = match (op, right) {
        (BinaryOp::Eq, Expr::Literal(SqlValue::Null)) => BinaryOp::Is,
        (BinaryOp::NotEq, Expr::Literal(SqlValue::Null)) => BinaryOp::IsNot,
        (op, _) => op,
    };
    if let (BinaryOp::In | BinaryOp::NotIn, Expr::Literal(SqlValue::Array(items))) = (op, right) {
        if items.is_empty() {
            // Nothing is IN an empty list, everything is NOT IN it.
            out.push_str(if op == BinaryOp::In { "(1 = 0)" } else { "(1 = 1)" });
            return Ok(());
        }
        out.push('(');
        left.render(dialect, out)?;
        out.push_str(&format!(" {op} ("));
        out.push_str(&dialect.literal_list(items));
        out.push_str("))");
        return Ok(());
    }
    out.push('(');
    left.render(dialect, out)?;
    out.push_str(&format!(" {op} "));
    right.render(dialect, out)?;
    out.push(')');
    Ok(())
}

impl<T: ToSqlValue> From<T> for Expr {
    fn from(value: T) -> Self {
        Self::Literal(value.to_sql_value())
    }
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

impl From<Query> for Expr {
    fn from(query: Query) -> Self {
        Self::Subquery(Arc::new(query))
    }
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Self;

    fn add(self, rhs: T) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Self;

    fn sub(self, rhs: T) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Self;

    fn div(self, rhs: T) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }
}

impl Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(UnaryOp::Neg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, PostgresDialect};

    fn sql(expr: &Expr) -> String {
        expr.to_sql(&GenericDialect::new()).unwrap()
    }

    #[test]
    fn test_column_eq() {
        assert_eq!(sql(&col("name").eq("Alice")), "(name = 'Alice')");
    }

    #[test]
    fn test_column_comparison() {
        assert_eq!(sql(&col("age").gt(18)), "(age > 18)");
        assert_eq!(sql(&col("age").lt_eq(65)), "(age <= 65)");
    }

    #[test]
    fn test_null_comparisons() {
        assert_eq!(sql(&col("deleted_at").is_null()), "(deleted_at IS NULL)");
        assert_eq!(sql(&col("deleted_at").eq(SqlValue::Null)), "(deleted_at IS NULL)");
        assert_eq!(sql(&col("deleted_at").not_eq(None::<i64>)), "(deleted_at IS NOT NULL)");
    }

    #[test]
    fn test_in_list_preserves_order() {
        let expr = col("name").in_list(["France", "Germany", "Italy"]);
        assert_eq!(sql(&expr), "(name IN ('France', 'Germany', 'Italy'))");
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(sql(&col("id").in_list(Vec::<i64>::new())), "(1 = 0)");
        assert_eq!(sql(&col("id").not_in_list(Vec::<i64>::new())), "(1 = 1)");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(sql(&(col("population") / 1_000_000)), "(population / 1000000)");
        assert_eq!(sql(&(col("a") + col("b") * 2)), "(a + (b * 2))");
        assert_eq!(sql(&-col("balance")), "-balance");
    }

    #[test]
    fn test_and_or_not() {
        let expr = col("active")
            .eq(true)
            .and(col("age").gt(18).or(col("verified").eq(true)));
        assert_eq!(
            sql(&expr),
            "((active = TRUE) AND ((age > 18) OR (verified = TRUE)))"
        );
        assert_eq!(sql(&col("x").eq(1).not()), "NOT (x = 1)");
    }

    #[test]
    fn test_functions_and_alias() {
        assert_eq!(sql(&count_all().alias("count")), "count(*) AS count");
        assert_eq!(
            sql(&func("count", vec![col("email")]).distinct()),
            "count(DISTINCT email)"
        );
    }

    #[test]
    fn test_qualified_column_quoting() {
        let expr = col("users.name").eq("Bob");
        assert_eq!(sql(&expr), "(users.name = 'Bob')");
        assert_eq!(
            expr.to_sql(&PostgresDialect::new()).unwrap(),
            "(\"users\".\"name\" = 'Bob')"
        );
    }

    #[test]
    fn test_raw_is_verbatim() {
        assert_eq!(sql(&raw("now() - interval '1 day'")), "now() - interval '1 day'");
    }

    #[test]
    fn test_sql_injection_prevention() {
        let malicious = "'; DROP TABLE users; --";
        assert_eq!(
            sql(&col("name").eq(malicious)),
            "(name = '''; DROP TABLE users; --')"
        );
    }

    #[test]
    fn test_shared_subtrees() {
        let shared = col("region").eq("Asia");
        let a = shared.clone().and(col("x").gt(1));
        let b = shared.clone().or(col("y").lt(2));
        assert_eq!(sql(&a), "((region = 'Asia') AND (x > 1))");
        assert_eq!(sql(&b), "((region = 'Asia') OR (y < 2))");
        assert_eq!(sql(&shared), "(region = 'Asia')");
    }
}
