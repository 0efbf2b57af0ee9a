#![allow(dead_code)]

use tessera_core::SqlValue;
use tessera_db::{ConnectOptions, Database, MockDriver, Row};
use tessera_orm::Model;

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub id: Option<i64>,
    pub name: String,
    pub label_id: Option<i64>,
}

impl Artist {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: String::from(name),
            label_id: None,
        }
    }
}

impl Model for Artist {
    const TABLE: &'static str = "artists";

    fn from_row(row: &Row) -> tessera_db::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            label_id: row.get("label_id")?,
        })
    }

    fn to_values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", SqlValue::Text(self.name.clone())),
            ("label_id", self.label_id.map_or(SqlValue::Null, SqlValue::Int)),
        ]
    }

    fn pk(&self) -> Option<i64> {
        self.id
    }

    fn set_pk(&mut self, pk: i64) {
        self.id = Some(pk);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: Option<i64>,
    pub title: String,
    pub artist_id: i64,
}

impl Model for Album {
    const TABLE: &'static str = "albums";

    fn from_row(row: &Row) -> tessera_db::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            artist_id: row.get("artist_id")?,
        })
    }

    fn to_values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("title", SqlValue::Text(self.title.clone())),
            ("artist_id", SqlValue::Int(self.artist_id)),
        ]
    }

    fn pk(&self) -> Option<i64> {
        self.id
    }

    fn set_pk(&mut self, pk: i64) {
        self.id = Some(pk);
    }
}

pub fn mock_db() -> (MockDriver, Database) {
    let driver = MockDriver::new();
    let db = driver.database(ConnectOptions::new("mock").with_max_connections(2));
    (driver, db)
}
