use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::utils::geo::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_status")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "assigned")]
    Assigned,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "vehicle_type")]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    #[sea_orm(string_value = "small_van")]
    SmallVan,
    #[sea_orm(string_value = "large_van")]
    LargeVan,
    #[sea_orm(string_value = "luton_van")]
    LutonVan,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: JobStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub scheduled_date: Date,
    pub time_slot: Option<String>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_address: Option<String>,
    pub pickup_postcode: Option<String>,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub delivery_address: Option<String>,
    pub delivery_postcode: Option<String>,
    pub distance_miles: f64,
    pub duration_minutes: f64,
    pub total_volume: f64,
    pub customer_price: f64,
    pub driver_price: f64,
    pub price_override_reason: Option<String>,
    pub items: Json,
    pub vehicle_type: VehicleType,
    pub notes: Option<String>,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn pickup(&self) -> Location {
        Location {
            lat: self.pickup_lat,
            lng: self.pickup_lng,
            address: self.pickup_address.clone(),
            postcode: self.pickup_postcode.clone(),
        }
    }

    pub fn delivery(&self) -> Location {
        Location {
            lat: self.delivery_lat,
            lng: self.delivery_lng,
            address: self.delivery_address.clone(),
            postcode: self.delivery_postcode.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id"
    )]
    Driver,
    #[sea_orm(has_many = "super::driver_location::Entity")]
    Locations,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl Related<super::driver_location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Locations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
