//! Models persisted in in-memory SQLite.

mod common;

use tessera_core::{ColumnDef, ColumnType, TableDefinition};
use tessera_db::{ConnectOptions, Database, Error};
use tessera_orm::{Association, HookAction, LifecycleEvent, ModelClass, OrmError};
use tessera_sqlite::SqliteDriver;

use common::{Album, Artist};

async fn music_db() -> Database {
    let db = Database::connect_with(
        ConnectOptions::new("sqlite").with_max_connections(1),
        &SqliteDriver::registry(),
    )
    .unwrap();
    db.create_table(
        TableDefinition::new("artists")
            .primary_key("id")
            .column_def(ColumnDef::new("name", ColumnType::String(Some(100))).not_null())
            .integer("label_id"),
    )
    .await
    .unwrap();
    db.create_table(
        TableDefinition::new("albums")
            .primary_key("id")
            .string("title")
            .integer("artist_id"),
    )
    .await
    .unwrap();
    db
}

#[tokio::test]
async fn test_round_trip() {
    let db = music_db().await;
    let mut builder = ModelClass::<Artist>::builder(db.clone());
    builder.associate(Association::one_to_many("albums", "albums", "artist_id"));
    let artists = builder.build();
    let albums = ModelClass::<Album>::builder(db).build();

    let mut nina = Artist::new("Nina");
    artists.save(&mut nina).await.unwrap();
    let id = nina.id.unwrap();
    for title in ["Pastel Blues", "Wild Is the Wind"] {
        let mut album = Album {
            id: None,
            title: String::from(title),
            artist_id: id,
        };
        albums.save(&mut album).await.unwrap();
    }

    nina.name = String::from("Nina Simone");
    artists.save(&mut nina).await.unwrap();
    assert_eq!(artists.get(id).await.unwrap(), nina);
    assert_eq!(artists.count().await.unwrap(), 1);

    let titles: Vec<String> = artists
        .load_as::<Album>("albums", &nina)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    assert_eq!(titles, vec!["Pastel Blues", "Wild Is the Wind"]);

    artists.destroy(&mut nina).await.unwrap();
    assert!(artists.find(id).await.unwrap().is_none());
    assert!(matches!(
        artists.refresh(&mut nina).await.unwrap_err(),
        OrmError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_stopped_save_inside_transaction_keeps_outer_work() {
    let db = music_db().await;
    let mut builder = ModelClass::<Artist>::builder(db.clone());
    builder.hook(LifecycleEvent::AfterCreate, |artist| {
        if artist.name == "Rejected" {
            HookAction::Stop
        } else {
            HookAction::Continue
        }
    });
    let artists = builder.build();

    let artists_ref = &artists;
    db.transaction(|_tx| async move {
        artists_ref
            .save(&mut Artist::new("Kept"))
            .await
            .map_err(|e| Error::InvalidOperation(e.to_string()))?;
        let stopped = artists_ref.save(&mut Artist::new("Rejected")).await;
        assert!(matches!(
            stopped,
            Err(OrmError::HookStopped(LifecycleEvent::AfterCreate))
        ));
        Ok(())
    })
    .await
    .unwrap();

    let names: Vec<String> = artists
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["Kept"]);
}
