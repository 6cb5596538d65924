//! Durable session storage

use async_trait::async_trait;
use burrow_relay_db::entities::client_session;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::debug;

use crate::error::RepositoryError;
use crate::record::SessionRecord;

/// Backend that keeps session records across restarts
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the record with the same id
    async fn save(&self, record: &SessionRecord) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;

    async fn load_all(&self) -> Result<Vec<SessionRecord>, RepositoryError>;
}

/// SeaORM-backed store over the `client_sessions` table
#[derive(Debug, Clone)]
pub struct DbSessionStore {
    db: DatabaseConnection,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_active_model(record: &SessionRecord) -> Result<client_session::ActiveModel, RepositoryError> {
    let user = record
        .user
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    Ok(client_session::ActiveModel {
        id: Set(record.id.clone()),
        name: Set(record.name.clone()),
        tags: Set(serde_json::to_string(&record.tags)?),
        os: Set(record.os.clone()),
        hostname: Set(record.hostname.clone()),
        version: Set(record.version.clone()),
        ipv4: Set(serde_json::to_string(&record.ipv4)?),
        ipv6: Set(serde_json::to_string(&record.ipv6)?),
        address: Set(record.address.clone()),
        user: Set(user),
        tunnels: Set(serde_json::to_string(&record.tunnels)?),
        disconnected_at: Set(record.disconnected_at),
        updated_at: Set(Utc::now()),
    })
}

fn from_model(model: client_session::Model) -> Result<SessionRecord, RepositoryError> {
    Ok(SessionRecord {
        id: model.id,
        name: model.name,
        tags: serde_json::from_str(&model.tags)?,
        os: model.os,
        hostname: model.hostname,
        version: model.version,
        ipv4: serde_json::from_str(&model.ipv4)?,
        ipv6: serde_json::from_str(&model.ipv6)?,
        address: model.address,
        user: model
            .user
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        tunnels: serde_json::from_str(&model.tunnels)?,
        disconnected_at: model.disconnected_at,
    })
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        use client_session::Column;

        let model = to_active_model(record)?;
        client_session::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::Name,
                        Column::Tags,
                        Column::Os,
                        Column::Hostname,
                        Column::Version,
                        Column::Ipv4,
                        Column::Ipv6,
                        Column::Address,
                        Column::User,
                        Column::Tunnels,
                        Column::DisconnectedAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(session_id = %record.id, "Stored session record");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        client_session::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        debug!(session_id = %id, "Deleted session record");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        client_session::Entity::find()
            .order_by_asc(client_session::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }
}
