use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20240601_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(JobStatus::Enum)
                    .values([
                        JobStatus::Draft,
                        JobStatus::Available,
                        JobStatus::Assigned,
                        JobStatus::InProgress,
                        JobStatus::Completed,
                        JobStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(VehicleType::Enum)
                    .values([VehicleType::SmallVan, VehicleType::LargeVan, VehicleType::LutonVan])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(uuid(Job::Id).primary_key())
                    .col(ColumnDef::new(Job::Status).custom(JobStatus::Enum).not_null())
                    .col(string_len(Job::CustomerName, 100).not_null())
                    .col(string_len(Job::CustomerEmail, 255).not_null())
                    .col(string_len(Job::CustomerPhone, 32).not_null())
                    .col(date(Job::ScheduledDate).not_null())
                    .col(string_len_null(Job::TimeSlot, 50))
                    .col(double(Job::PickupLat).not_null())
                    .col(double(Job::PickupLng).not_null())
                    .col(text_null(Job::PickupAddress))
                    .col(string_len_null(Job::PickupPostcode, 16))
                    .col(double(Job::DeliveryLat).not_null())
                    .col(double(Job::DeliveryLng).not_null())
                    .col(text_null(Job::DeliveryAddress))
                    .col(string_len_null(Job::DeliveryPostcode, 16))
                    .col(double(Job::DistanceMiles).not_null())
                    .col(double(Job::DurationMinutes).not_null())
                    .col(double(Job::TotalVolume).not_null())
                    .col(double(Job::CustomerPrice).not_null())
                    .col(double(Job::DriverPrice).not_null())
                    .col(text_null(Job::PriceOverrideReason))
                    .col(json_binary(Job::Items).not_null())
                    .col(ColumnDef::new(Job::VehicleType).custom(VehicleType::Enum).not_null())
                    .col(text_null(Job::Notes))
                    .col(uuid_null(Job::DriverId))
                    .col(
                        timestamp_with_time_zone(Job::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_driver")
                            .from(Job::Table, Job::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_status")
                    .table(Job::Table)
                    .col(Job::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(VehicleType::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(JobStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Job {
    Table,
    Id,
    Status,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    ScheduledDate,
    TimeSlot,
    PickupLat,
    PickupLng,
    PickupAddress,
    PickupPostcode,
    DeliveryLat,
    DeliveryLng,
    DeliveryAddress,
    DeliveryPostcode,
    DistanceMiles,
    DurationMinutes,
    TotalVolume,
    CustomerPrice,
    DriverPrice,
    PriceOverrideReason,
    Items,
    VehicleType,
    Notes,
    DriverId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum JobStatus {
    #[sea_orm(iden = "job_status")]
    Enum,
    #[sea_orm(iden = "draft")]
    Draft,
    #[sea_orm(iden = "available")]
    Available,
    #[sea_orm(iden = "assigned")]
    Assigned,
    #[sea_orm(iden = "in_progress")]
    InProgress,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
}

#[derive(DeriveIden)]
pub enum VehicleType {
    #[sea_orm(iden = "vehicle_type")]
    Enum,
    #[sea_orm(iden = "small_van")]
    SmallVan,
    #[sea_orm(iden = "large_van")]
    LargeVan,
    #[sea_orm(iden = "luton_van")]
    LutonVan,
}
