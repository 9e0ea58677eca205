//! Drivers' own position reports, one row per driver.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entities::driver_location::{self, TrackingStatus};
use crate::error::AppResult;

/// A position report to store as the driver's latest location
#[derive(Debug, Clone)]
pub struct PositionReport {
    pub driver_id: Uuid,
    pub job_id: Option<Uuid>,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed_mph: f64,
    pub status: TrackingStatus,
}

/// Keep one row per driver holding the most recent report
pub async fn record_position(
    db: &DatabaseConnection,
    report: PositionReport,
) -> AppResult<driver_location::Model> {
    let existing = driver_location::Entity::find()
        .filter(driver_location::Column::DriverId.eq(report.driver_id))
        .one(db)
        .await?;

    let mut active: driver_location::ActiveModel = match existing {
        Some(row) => row.into(),
        None => driver_location::ActiveModel {
            id: Set(Uuid::new_v4()),
            driver_id: Set(report.driver_id),
            ..Default::default()
        },
    };

    active.job_id = Set(report.job_id);
    active.lat = Set(report.lat);
    active.lng = Set(report.lng);
    active.heading = Set(report.heading);
    active.speed_mph = Set(report.speed_mph);
    active.status = Set(report.status);
    active.updated_at = Set(Utc::now().into());

    let saved = if active.id.is_unchanged() {
        active.update(db).await?
    } else {
        active.insert(db).await?
    };
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn report(driver_id: Uuid) -> PositionReport {
        PositionReport {
            driver_id,
            job_id: None,
            lat: 51.5,
            lng: -0.12,
            heading: 90.0,
            speed_mph: 0.0,
            status: TrackingStatus::Available,
        }
    }

    fn row(driver_id: Uuid, status: TrackingStatus) -> driver_location::Model {
        driver_location::Model {
            id: Uuid::new_v4(),
            driver_id,
            job_id: None,
            lat: 51.5,
            lng: -0.12,
            heading: 90.0,
            speed_mph: 0.0,
            status,
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_first_report_inserts_row() {
        let driver_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<driver_location::Model>::new()])
            .append_query_results([vec![row(driver_id, TrackingStatus::Available)]])
            .into_connection();

        let saved = record_position(&db, report(driver_id)).await.unwrap();
        assert_eq!(saved.driver_id, driver_id);

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let insert = format!("{:?}", log[1]);
        assert!(insert.contains("INSERT INTO") && insert.contains("driver_location"));
    }

    #[tokio::test]
    async fn test_later_report_updates_same_row() {
        let driver_id = Uuid::new_v4();
        let existing = row(driver_id, TrackingStatus::Offline);
        let mut updated = existing.clone();
        updated.status = TrackingStatus::Available;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .append_query_results([vec![updated]])
            .into_connection();

        let saved = record_position(&db, report(driver_id)).await.unwrap();
        assert_eq!(saved.id, existing.id);
        assert_eq!(saved.status, TrackingStatus::Available);

        let log = db.into_transaction_log();
        let update = format!("{:?}", log[1]);
        assert!(update.contains("UPDATE") && update.contains("driver_location"));
    }
}
