//! Opening databases from connection strings.

use std::sync::Arc;

use tessera_db::{Database, DriverRegistry, Error, MockDriver};

#[tokio::test]
async fn test_connect_through_registry() {
    let driver = MockDriver::new();
    let registry = DriverRegistry::new().with(Arc::new(driver.clone()));

    let db = Database::connect("mock://app@localhost/shop?max_connections=2", &registry).unwrap();
    assert_eq!(db.pool().options().database.as_deref(), Some("shop"));
    assert_eq!(db.pool().stats().max_size, 2);

    db.from("items").all().await.unwrap();
    assert_eq!(driver.sqls(), vec!["SELECT * FROM items"]);
}

#[test]
fn test_unknown_adapter_is_a_config_error() {
    let registry = DriverRegistry::new();
    let err = Database::connect("oracle://db/x", &registry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_invalid_pool_option_is_rejected() {
    let registry = DriverRegistry::new().with(Arc::new(MockDriver::new()));
    let err = Database::connect("mock://localhost/x?max_connections=lots", &registry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
