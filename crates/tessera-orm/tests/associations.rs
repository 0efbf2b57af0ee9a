//! Association datasets and the per-owner cache.

mod common;

use tessera_core::SqlValue;
use tessera_db::RawResult;
use tessera_orm::{Association, ModelClass, OrmError};

use common::{mock_db, Album, Artist};

fn saved_artist() -> Artist {
    Artist {
        id: Some(1),
        name: String::from("Nina"),
        label_id: Some(4),
    }
}

fn artists(db: tessera_db::Database) -> ModelClass<Artist> {
    let mut builder = ModelClass::<Artist>::builder(db);
    builder
        .associate(Association::many_to_one("label", "labels", "label_id"))
        .associate(Association::one_to_many("albums", "albums", "artist_id"))
        .associate(Association::many_to_many(
            "tags",
            "tags",
            "artist_tags",
            "artist_id",
            "tag_id",
        ));
    builder.build()
}

#[test]
fn test_association_datasets() {
    let (_driver, db) = mock_db();
    let artists = artists(db);
    let nina = saved_artist();

    let sql = |name: &str| {
        artists
            .association_dataset(name, &nina)
            .unwrap()
            .unwrap()
            .sql()
            .unwrap()
    };
    assert_eq!(sql("label"), "SELECT * FROM labels WHERE (id = 4)");
    assert_eq!(sql("albums"), "SELECT * FROM albums WHERE (artist_id = 1)");
    assert_eq!(
        sql("tags"),
        "SELECT * FROM tags WHERE (id IN (SELECT tag_id FROM artist_tags WHERE (artist_id = 1)))"
    );
}

#[tokio::test]
async fn test_null_foreign_key_loads_nothing() {
    let (driver, db) = mock_db();
    let artists = artists(db);
    let unsigned = Artist {
        label_id: None,
        ..saved_artist()
    };

    assert!(artists.load("label", &unsigned).await.unwrap().is_empty());
    assert!(driver.sqls().is_empty());
}

#[tokio::test]
async fn test_loads_are_cached_per_owner() {
    let (driver, db) = mock_db();
    driver.set_handler(|sql| {
        sql.starts_with("SELECT * FROM albums").then(|| {
            Ok(RawResult::rows(
                &["id", "title", "artist_id"],
                vec![vec![
                    SqlValue::Int(10),
                    SqlValue::Text(String::from("Pastel Blues")),
                    SqlValue::Int(1),
                ]],
            ))
        })
    });
    let artists = artists(db);
    let nina = saved_artist();

    let albums: Vec<Album> = artists.load_as("albums", &nina).await.unwrap();
    assert_eq!(albums[0].title, "Pastel Blues");
    artists.load("albums", &nina).await.unwrap();
    assert_eq!(driver.take_sqls().len(), 1);

    let other = Artist {
        id: Some(2),
        ..saved_artist()
    };
    artists.load("albums", &other).await.unwrap();
    assert_eq!(
        driver.take_sqls(),
        vec!["SELECT * FROM albums WHERE (artist_id = 2)"]
    );

    artists.clear_cache(1);
    artists.load("albums", &nina).await.unwrap();
    assert_eq!(driver.take_sqls().len(), 1);
}

#[tokio::test]
async fn test_association_errors() {
    let (_driver, db) = mock_db();
    let artists = artists(db);

    assert!(matches!(
        artists.load("producers", &saved_artist()).await.unwrap_err(),
        OrmError::UnknownAssociation(name) if name == "producers"
    ));
    assert!(matches!(
        artists.load("albums", &Artist::new("unsaved")).await.unwrap_err(),
        OrmError::MissingPrimaryKey("artists")
    ));

    let mut builder = ModelClass::<Artist>::builder(artists.database().clone());
    builder.associate(Association::many_to_one("studio", "studios", "studio_id"));
    assert!(matches!(
        builder.build().load("studio", &saved_artist()).await.unwrap_err(),
        OrmError::Database(tessera_db::Error::InvalidOperation(_))
    ));
}
