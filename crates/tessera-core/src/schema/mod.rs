//! Schema definition DSL and DDL rendering.
//!
//! Tables are described with [`TableDefinition`] and altered through
//! [`AlterTable`]; both lower into [`SchemaOp`]s, which render to
//! dialect-specific DDL and know how to invert themselves where that is
//! possible without extra information.

use crate::dialect::Dialect;
use crate::value::{SqlValue, ToSqlValue};

/// Column data types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Fixed-point decimal.
    Decimal {
        /// Total digits.
        precision: u16,
        /// Digits after the point.
        scale: u16,
    },
    /// Variable length string, optionally bounded.
    String(Option<u32>),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time without zone.
    DateTime,
    /// Time of day.
    Time,
    /// Binary data.
    Blob,
    /// A type name passed through unchanged.
    Custom(String),
}

impl ColumnType {
    /// ANSI-flavoured type name. Dialects refine it in
    /// [`Dialect::column_type_sql`].
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Integer => String::from("INTEGER"),
            Self::BigInt => String::from("BIGINT"),
            Self::SmallInt => String::from("SMALLINT"),
            Self::Float => String::from("REAL"),
            Self::Double => String::from("DOUBLE"),
            Self::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            Self::String(Some(len)) => format!("VARCHAR({len})"),
            Self::String(None) => String::from("VARCHAR"),
            Self::Text => String::from("TEXT"),
            Self::Boolean => String::from("BOOLEAN"),
            Self::Date => String::from("DATE"),
            Self::DateTime => String::from("DATETIME"),
            Self::Time => String::from("TIME"),
            Self::Blob => String::from("BLOB"),
            Self::Custom(name) => name.clone(),
        }
    }
}

/// Per-column options.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOptions {
    /// Part of the primary key.
    pub primary_key: bool,
    /// Database-generated key. Implies `primary_key`.
    pub auto_increment: bool,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Default value.
    pub default: Option<SqlValue>,
    /// UNIQUE constraint.
    pub unique: bool,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            primary_key: false,
            auto_increment: false,
            null: true,
            default: None,
            unique: false,
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Column options.
    pub options: ColumnOptions,
}

impl ColumnDef {
    /// Creates a nullable column without constraints.
    #[must_use]
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: String::from(name),
            column_type,
            options: ColumnOptions::default(),
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.options.null = false;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl ToSqlValue) -> Self {
        self.options.default = Some(value.to_sql_value());
        self
    }

    /// Renders the column clause.
    #[must_use]
    pub fn to_sql(&self, dialect: &dyn Dialect, inline_primary_key: bool) -> String {
        let name = dialect.literal_identifier(&self.name);
        if self.options.auto_increment {
            return format!("{name} {}", dialect.auto_increment_sql(&self.column_type));
        }
        let mut sql = format!("{name} {}", dialect.column_type_sql(&self.column_type));
        if inline_primary_key && self.options.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.options.null {
            sql.push_str(" NOT NULL");
        }
        if self.options.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.options.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&dialect.literal(default));
        }
        sql
    }
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Indexed table.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Explicit name; defaults to `{table}_{columns}_index`.
    pub name: Option<String>,
    /// UNIQUE index.
    pub unique: bool,
}

impl IndexDef {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new(table: &str, columns: &[&str]) -> Self {
        Self {
            table: String::from(table),
            columns: columns.iter().map(|c| String::from(*c)).collect(),
            name: None,
            unique: false,
        }
    }

    /// Resolved index name.
    #[must_use]
    pub fn index_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_index", self.table, self.columns.join("_")))
    }

    fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| dialect.literal_identifier(c))
            .collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            dialect.literal_identifier(&self.index_name()),
            dialect.literal_identifier(&self.table),
            columns.join(", ")
        )
    }
}

/// A table definition built column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Indexes created along with the table.
    pub indexes: Vec<IndexDef>,
    /// Use `IF NOT EXISTS`.
    pub if_not_exists: bool,
}

impl TableDefinition {
    /// Starts a table definition.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            columns: Vec::new(),
            indexes: Vec::new(),
            if_not_exists: false,
        }
    }

    /// Adds an auto-incrementing integer primary key.
    #[must_use]
    pub fn primary_key(mut self, name: &str) -> Self {
        let mut column = ColumnDef::new(name, ColumnType::Integer);
        column.options.primary_key = true;
        column.options.auto_increment = true;
        column.options.null = false;
        self.columns.push(column);
        self
    }

    /// Adds a plain column.
    #[must_use]
    pub fn column(self, name: &str, column_type: ColumnType) -> Self {
        self.column_def(ColumnDef::new(name, column_type))
    }

    /// Adds a fully specified column.
    #[must_use]
    pub fn column_def(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an integer column.
    #[must_use]
    pub fn integer(self, name: &str) -> Self {
        self.column(name, ColumnType::Integer)
    }

    /// Adds a `VARCHAR(255)` column.
    #[must_use]
    pub fn string(self, name: &str) -> Self {
        self.column(name, ColumnType::String(Some(255)))
    }

    /// Adds a text column.
    #[must_use]
    pub fn text(self, name: &str) -> Self {
        self.column(name, ColumnType::Text)
    }

    /// Adds a boolean column.
    #[must_use]
    pub fn boolean(self, name: &str) -> Self {
        self.column(name, ColumnType::Boolean)
    }

    /// Adds an index on the given columns.
    #[must_use]
    pub fn index(mut self, columns: &[&str]) -> Self {
        let index = IndexDef::new(&self.name, columns);
        self.indexes.push(index);
        self
    }

    /// Adds a unique index on the given columns.
    #[must_use]
    pub fn unique_index(mut self, columns: &[&str]) -> Self {
        let mut index = IndexDef::new(&self.name, columns);
        index.unique = true;
        self.indexes.push(index);
        self
    }

    /// Renders `CREATE TABLE ... IF NOT EXISTS`.
    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Names of the columns in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn to_sql(&self, dialect: &dyn Dialect) -> Vec<String> {
        let key_columns: Vec<&ColumnDef> = self
            .columns
            .iter()
            .filter(|c| c.options.primary_key && !c.options.auto_increment)
            .collect();
        let composite = key_columns.len() > 1;

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.to_sql(dialect, !composite))
            .collect();
        if composite {
            let names: Vec<String> = key_columns
                .iter()
                .map(|c| dialect.literal_identifier(&c.name))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {}{} ({})",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            dialect.literal_identifier(&self.name),
            parts.join(", ")
        )];
        statements.extend(self.indexes.iter().map(|i| i.to_sql(dialect)));
        statements
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOp {
    /// `CREATE TABLE` plus its indexes.
    CreateTable(TableDefinition),
    /// `DROP TABLE`.
    DropTable {
        /// Table name.
        name: String,
        /// Use `IF EXISTS`.
        if_exists: bool,
    },
    /// `ALTER TABLE ... RENAME TO`.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `ALTER TABLE ... ADD COLUMN`.
    AddColumn {
        /// Table name.
        table: String,
        /// New column.
        column: ColumnDef,
    },
    /// `ALTER TABLE ... DROP COLUMN`.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// `ALTER TABLE ... RENAME COLUMN`.
    RenameColumn {
        /// Table name.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// `CREATE INDEX`.
    AddIndex(IndexDef),
    /// `DROP INDEX`.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Caller-trusted SQL with an optional inverse.
    Raw {
        /// Forward statement.
        up: String,
        /// Inverse statement.
        down: Option<String>,
    },
}

impl SchemaOp {
    /// Drop table operation.
    #[must_use]
    pub fn drop_table(name: &str) -> Self {
        Self::DropTable {
            name: String::from(name),
            if_exists: false,
        }
    }

    /// Rename table operation.
    #[must_use]
    pub fn rename_table(from: &str, to: &str) -> Self {
        Self::RenameTable {
            from: String::from(from),
            to: String::from(to),
        }
    }

    /// Raw SQL operation.
    #[must_use]
    pub fn raw(up: &str, down: Option<&str>) -> Self {
        Self::Raw {
            up: String::from(up),
            down: down.map(String::from),
        }
    }

    /// Returns the inverse operation, or `None` when it cannot be derived.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable(def) => Some(Self::drop_table(&def.name)),
            Self::RenameTable { from, to } => Some(Self::rename_table(to, from)),
            Self::AddColumn { table, column } => Some(Self::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
            }),
            Self::RenameColumn { table, from, to } => Some(Self::RenameColumn {
                table: table.clone(),
                from: to.clone(),
                to: from.clone(),
            }),
            Self::AddIndex(index) => Some(Self::DropIndex {
                table: index.table.clone(),
                name: index.index_name(),
            }),
            Self::Raw { up, down } => down.as_ref().map(|down| Self::Raw {
                up: down.clone(),
                down: Some(up.clone()),
            }),
            Self::DropTable { .. } | Self::DropColumn { .. } | Self::DropIndex { .. } => None,
        }
    }

    /// Short description used in logs and errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable(def) => format!("create_table {}", def.name),
            Self::DropTable { name, .. } => format!("drop_table {name}"),
            Self::RenameTable { from, to } => format!("rename_table {from} -> {to}"),
            Self::AddColumn { table, column } => format!("add_column {table}.{}", column.name),
            Self::DropColumn { table, column } => format!("drop_column {table}.{column}"),
            Self::RenameColumn { table, from, to } => {
                format!("rename_column {table}.{from} -> {to}")
            }
            Self::AddIndex(index) => format!("add_index {}", index.index_name()),
            Self::DropIndex { name, .. } => format!("drop_index {name}"),
            Self::Raw { up, .. } => format!("run {up}"),
        }
    }

    /// Renders the statements for this operation.
    #[must_use]
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Vec<String> {
        let ident = |name: &str| dialect.literal_identifier(name);
        match self {
            Self::CreateTable(def) => def.to_sql(dialect),
            Self::DropTable { name, if_exists } => vec![format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                ident(name)
            )],
            Self::RenameTable { from, to } => {
                vec![format!("ALTER TABLE {} RENAME TO {}", ident(from), ident(to))]
            }
            Self::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                ident(table),
                column.to_sql(dialect, true)
            )],
            Self::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                ident(table),
                ident(column)
            )],
            Self::RenameColumn { table, from, to } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                ident(table),
                ident(from),
                ident(to)
            )],
            Self::AddIndex(index) => vec![index.to_sql(dialect)],
            Self::DropIndex { name, .. } => vec![format!("DROP INDEX {}", ident(name))],
            Self::Raw { up, .. } => vec![up.clone()],
        }
    }
}

/// Collects changes to an existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    table: String,
    ops: Vec<SchemaOp>,
}

impl AlterTable {
    /// Starts altering `table`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: String::from(table),
            ops: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn add_column(mut self, column: ColumnDef) -> Self {
        self.ops.push(SchemaOp::AddColumn {
            table: self.table.clone(),
            column,
        });
        self
    }

    /// Drops a column.
    #[must_use]
    pub fn drop_column(mut self, column: &str) -> Self {
        self.ops.push(SchemaOp::DropColumn {
            table: self.table.clone(),
            column: String::from(column),
        });
        self
    }

    /// Renames a column.
    #[must_use]
    pub fn rename_column(mut self, from: &str, to: &str) -> Self {
        self.ops.push(SchemaOp::RenameColumn {
            table: self.table.clone(),
            from: String::from(from),
            to: String::from(to),
        });
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn add_index(mut self, columns: &[&str]) -> Self {
        self.ops
            .push(SchemaOp::AddIndex(IndexDef::new(&self.table, columns)));
        self
    }

    /// Drops an index by the name it was created with.
    #[must_use]
    pub fn drop_index(mut self, columns: &[&str]) -> Self {
        let name = IndexDef::new(&self.table, columns).index_name();
        self.ops.push(SchemaOp::DropIndex {
            table: self.table.clone(),
            name,
        });
        self
    }

    /// The collected operations, in order.
    #[must_use]
    pub fn into_ops(self) -> Vec<SchemaOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, MysqlDialect, PostgresDialect};

    fn users() -> TableDefinition {
        TableDefinition::new("users")
            .primary_key("id")
            .column_def(ColumnDef::new("email", ColumnType::String(Some(255))).not_null().unique())
            .column_def(ColumnDef::new("active", ColumnType::Boolean).default_value(true))
            .index(&["email"])
    }

    #[test]
    fn test_create_table_generic() {
        let sql = SchemaOp::CreateTable(users()).to_sql(&GenericDialect::new());
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE users (id INTEGER PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY, \
                 email VARCHAR(255) NOT NULL UNIQUE, active BOOLEAN DEFAULT TRUE)",
                "CREATE INDEX users_email_index ON users (email)",
            ]
        );
    }

    #[test]
    fn test_create_table_postgres() {
        let sql = SchemaOp::CreateTable(users()).to_sql(&PostgresDialect::new());
        assert_eq!(
            sql[0],
            "CREATE TABLE \"users\" (\"id\" SERIAL PRIMARY KEY, \
             \"email\" VARCHAR(255) NOT NULL UNIQUE, \"active\" BOOLEAN DEFAULT TRUE)"
        );
    }

    #[test]
    fn test_create_table_mysql_auto_increment() {
        let sql = SchemaOp::CreateTable(users()).to_sql(&MysqlDialect::new());
        assert!(sql[0].starts_with("CREATE TABLE `users` (`id` INTEGER PRIMARY KEY AUTO_INCREMENT"));
        assert!(sql[0].contains("`active` TINYINT(1) DEFAULT 1"));
    }

    #[test]
    fn test_composite_primary_key() {
        let mut a = ColumnDef::new("a", ColumnType::Integer);
        a.options.primary_key = true;
        let mut b = ColumnDef::new("b", ColumnType::Integer);
        b.options.primary_key = true;
        let def = TableDefinition::new("pairs").column_def(a).column_def(b);
        assert_eq!(
            SchemaOp::CreateTable(def).to_sql(&GenericDialect::new()),
            vec!["CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b))"]
        );
    }

    #[test]
    fn test_reverse_operations() {
        assert_eq!(
            SchemaOp::CreateTable(users()).reverse(),
            Some(SchemaOp::drop_table("users"))
        );
        assert_eq!(
            SchemaOp::rename_table("a", "b").reverse(),
            Some(SchemaOp::rename_table("b", "a"))
        );
        let ops = AlterTable::new("users")
            .add_column(ColumnDef::new("age", ColumnType::Integer))
            .add_index(&["age"])
            .into_ops();
        assert_eq!(
            ops[0].reverse(),
            Some(SchemaOp::DropColumn {
                table: String::from("users"),
                column: String::from("age"),
            })
        );
        assert_eq!(
            ops[1].reverse(),
            Some(SchemaOp::DropIndex {
                table: String::from("users"),
                name: String::from("users_age_index"),
            })
        );
    }

    #[test]
    fn test_irreversible_operations() {
        assert!(SchemaOp::drop_table("users").reverse().is_none());
        assert!(SchemaOp::raw("UPDATE t SET x = 1", None).reverse().is_none());
        assert_eq!(
            SchemaOp::raw("CREATE VIEW v AS SELECT 1", Some("DROP VIEW v")).reverse(),
            Some(SchemaOp::raw("DROP VIEW v", Some("CREATE VIEW v AS SELECT 1")))
        );
    }

    #[test]
    fn test_alter_statements() {
        let d = GenericDialect::new();
        let ops = AlterTable::new("users")
            .rename_column("name", "full_name")
            .drop_column("legacy")
            .into_ops();
        assert_eq!(
            ops[0].to_sql(&d),
            vec!["ALTER TABLE users RENAME COLUMN name TO full_name"]
        );
        assert_eq!(ops[1].to_sql(&d), vec!["ALTER TABLE users DROP COLUMN legacy"]);
    }
}
