use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20240601_000001_create_users::User;
use super::m20240601_000002_create_jobs::Job;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(TrackingStatus::Enum)
                    .values([
                        TrackingStatus::Available,
                        TrackingStatus::PickedUp,
                        TrackingStatus::InTransit,
                        TrackingStatus::NearDelivery,
                        TrackingStatus::Delivered,
                        TrackingStatus::Offline,
                    ])
                    .to_owned(),
            )
            .await?;

        // One row per driver, overwritten by each position report
        manager
            .create_table(
                Table::create()
                    .table(DriverLocation::Table)
                    .if_not_exists()
                    .col(uuid(DriverLocation::Id).primary_key())
                    .col(uuid(DriverLocation::DriverId).not_null().unique_key())
                    .col(uuid_null(DriverLocation::JobId))
                    .col(double(DriverLocation::Lat).not_null())
                    .col(double(DriverLocation::Lng).not_null())
                    .col(double(DriverLocation::Heading).not_null().default(0.0))
                    .col(double(DriverLocation::SpeedMph).not_null().default(0.0))
                    .col(
                        ColumnDef::new(DriverLocation::Status)
                            .custom(TrackingStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(DriverLocation::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_location_driver")
                            .from(DriverLocation::Table, DriverLocation::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_location_job")
                            .from(DriverLocation::Table, DriverLocation::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DriverLocation::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TrackingStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DriverLocation {
    Table,
    Id,
    DriverId,
    JobId,
    Lat,
    Lng,
    Heading,
    SpeedMph,
    Status,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum TrackingStatus {
    #[sea_orm(iden = "tracking_status")]
    Enum,
    #[sea_orm(iden = "available")]
    Available,
    #[sea_orm(iden = "picked-up")]
    PickedUp,
    #[sea_orm(iden = "in-transit")]
    InTransit,
    #[sea_orm(iden = "near-delivery")]
    NearDelivery,
    #[sea_orm(iden = "delivered")]
    Delivered,
    #[sea_orm(iden = "offline")]
    Offline,
}
