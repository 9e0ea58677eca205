use axum::{extract::State, Extension, Json};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::job;
use crate::error::AppResult;
use crate::utils::jwt::Claims;
use crate::AppState;

async fn jobs_for_customer(db: &DatabaseConnection, email: &str) -> AppResult<Vec<job::Model>> {
    Ok(job::Entity::find()
        .filter(job::Column::CustomerEmail.eq(email))
        .order_by_desc(job::Column::ScheduledDate)
        .all(db)
        .await?)
}

/// Bookings made under the logged-in customer's email, latest first
pub async fn my_jobs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<job::Model>>> {
    Ok(Json(jobs_for_customer(&state.db, &claims.email).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_jobs_are_filtered_by_customer_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<job::Model>::new()])
            .into_connection();

        let jobs = jobs_for_customer(&db, "ada@example.com").await.unwrap();
        assert!(jobs.is_empty());

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("customer_email"));
        assert!(log.contains("ada@example.com"));
    }
}
