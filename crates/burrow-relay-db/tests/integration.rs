//! Integration tests for burrow-relay-db
//!
//! Tests database operations with real SQLite in-memory database

use burrow_relay_db::{connect, entities::client_session, migrate};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

async fn setup_test_db() -> sea_orm::DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    migrate(&db).await.expect("Failed to run migrations");

    db
}

fn session_row(id: &str) -> client_session::ActiveModel {
    client_session::ActiveModel {
        id: Set(id.to_string()),
        name: Set("edge-router".to_string()),
        tags: Set(r#"["prod","eu"]"#.to_string()),
        os: Set("linux".to_string()),
        hostname: Set("edge-01".to_string()),
        version: Set("0.9.1".to_string()),
        ipv4: Set(r#"["10.0.0.5"]"#.to_string()),
        ipv6: Set("[]".to_string()),
        address: Set("203.0.113.7:51000".to_string()),
        user: Set(Some(r#"{"username":"admin","groups":[]}"#.to_string())),
        tunnels: Set("[]".to_string()),
        disconnected_at: Set(None),
        updated_at: Set(Utc::now()),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let db = connect("sqlite::memory:").await.expect("Failed to connect");

    let backend = db.get_database_backend();
    assert!(matches!(backend, sea_orm::DatabaseBackend::Sqlite));
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let db = setup_test_db().await;
    assert!(migrate(&db).await.is_ok());
}

#[tokio::test]
async fn test_insert_and_read_session() {
    let db = setup_test_db().await;

    session_row("sess-1").insert(&db).await.expect("Failed to insert");

    let found = client_session::Entity::find_by_id("sess-1")
        .one(&db)
        .await
        .expect("Failed to query")
        .expect("Session not found");

    assert_eq!(found.name, "edge-router");
    assert_eq!(found.tags, r#"["prod","eu"]"#);
    assert!(found.disconnected_at.is_none());
}

#[tokio::test]
async fn test_filter_lost_sessions() {
    let db = setup_test_db().await;

    session_row("live").insert(&db).await.unwrap();

    let mut lost = session_row("lost");
    lost.disconnected_at = Set(Some(Utc::now() - Duration::hours(2)));
    lost.insert(&db).await.unwrap();

    let lost_count = client_session::Entity::find()
        .filter(client_session::Column::DisconnectedAt.is_not_null())
        .count(&db)
        .await
        .unwrap();
    assert_eq!(lost_count, 1);

    let old = client_session::Entity::find()
        .filter(client_session::Column::DisconnectedAt.lt(Utc::now() - Duration::hours(1)))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].id, "lost");
}

#[tokio::test]
async fn test_delete_session() {
    let db = setup_test_db().await;

    session_row("gone").insert(&db).await.unwrap();
    let result = client_session::Entity::delete_by_id("gone")
        .exec(&db)
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    assert!(client_session::Entity::find_by_id("gone")
        .one(&db)
        .await
        .unwrap()
        .is_none());
}
