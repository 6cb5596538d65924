//! ClientSession entity: one row per connected or retained client session

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client_sessions")]
pub struct Model {
    /// Session identifier assigned by the transport
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    /// JSON-encoded tags: Vec<String>
    #[sea_orm(column_type = "Text")]
    pub tags: String,

    pub os: String,
    pub hostname: String,
    pub version: String,

    /// JSON-encoded addresses: Vec<String>
    #[sea_orm(column_type = "Text")]
    pub ipv4: String,

    /// JSON-encoded addresses: Vec<String>
    #[sea_orm(column_type = "Text")]
    pub ipv6: String,

    /// Transport-level remote address
    pub address: String,

    /// JSON-encoded user that established the session
    #[sea_orm(column_type = "Text", nullable)]
    pub user: Option<String>,

    /// JSON-encoded tunnel list
    #[sea_orm(column_type = "Text")]
    pub tunnels: String,

    /// Set once the client is lost; null while connected
    pub disconnected_at: Option<ChronoDateTimeUtc>,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
