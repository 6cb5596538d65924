//! Create the client_sessions table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClientSessions::Table)
                    .if_not_exists()
                    .col(string_len(ClientSessions::Id, 255).primary_key())
                    .col(string_len(ClientSessions::Name, 255).not_null().default(""))
                    .col(text(ClientSessions::Tags).not_null())
                    .col(string_len(ClientSessions::Os, 255).not_null().default(""))
                    .col(string_len(ClientSessions::Hostname, 255).not_null().default(""))
                    .col(string_len(ClientSessions::Version, 64).not_null().default(""))
                    .col(text(ClientSessions::Ipv4).not_null())
                    .col(text(ClientSessions::Ipv6).not_null())
                    .col(string_len(ClientSessions::Address, 255).not_null())
                    .col(text_null(ClientSessions::User))
                    .col(text(ClientSessions::Tunnels).not_null())
                    .col(timestamp_with_time_zone_null(ClientSessions::DisconnectedAt))
                    .col(
                        timestamp_with_time_zone(ClientSessions::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Sweeping obsolete lost sessions filters on this column
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_client_sessions_disconnected_at")
                    .table(ClientSessions::Table)
                    .col(ClientSessions::DisconnectedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClientSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClientSessions {
    #[sea_orm(iden = "client_sessions")]
    Table,
    Id,
    Name,
    Tags,
    Os,
    Hostname,
    Version,
    Ipv4,
    Ipv6,
    Address,
    User,
    Tunnels,
    DisconnectedAt,
    UpdatedAt,
}
