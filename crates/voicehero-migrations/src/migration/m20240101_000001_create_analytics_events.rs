use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnalyticsEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AnalyticsEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AnalyticsEvents::SessionId).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::EventType).string().not_null())
                    .col(
                        ColumnDef::new(AnalyticsEvents::EventTimestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AnalyticsEvents::ProjectId).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::SegmentType).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::SegmentId).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::AudioVersion).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::ScriptVersion).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::AudioUrl).text().null())
                    .col(ColumnDef::new(AnalyticsEvents::CompletionRate).double().null())
                    .col(ColumnDef::new(AnalyticsEvents::Metadata).json().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::UserContext).json().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::IpAddress).string().null())
                    .col(ColumnDef::new(AnalyticsEvents::ServerUserAgent).text().null())
                    .col(
                        ColumnDef::new(AnalyticsEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_analytics_events_project_type")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::ProjectId)
                    .col(AnalyticsEvents::EventType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_analytics_events_session")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::SessionId)
                    .col(AnalyticsEvents::EventTimestamp)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AnalyticsEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AnalyticsEvents {
    Table,
    Id,
    SessionId,
    EventType,
    EventTimestamp,
    ProjectId,
    SegmentType,
    SegmentId,
    AudioVersion,
    ScriptVersion,
    AudioUrl,
    CompletionRate,
    Metadata,
    UserContext,
    IpAddress,
    ServerUserAgent,
    ReceivedAt,
}
