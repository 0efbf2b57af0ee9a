#![allow(dead_code)]

use tessera_core::{Dialect, GenericDialect, MysqlDialect, PostgresDialect, Query};

pub fn generic_sql(query: &Query) -> String {
    render(query, &GenericDialect::new())
}

pub fn postgres_sql(query: &Query) -> String {
    render(query, &PostgresDialect::new())
}

pub fn mysql_sql(query: &Query) -> String {
    render(query, &MysqlDialect::new())
}

pub fn render(query: &Query, dialect: &dyn Dialect) -> String {
    query
        .select_sql(dialect)
        .unwrap_or_else(|e| panic!("Failed to render {query:?}\nError: {e:?}"))
}
