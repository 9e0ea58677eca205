use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn require_role(request: &Request, allowed: &[UserRole], label: &str) -> AppResult<()> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if !allowed.contains(&claims.role) {
        return Err(AppError::Forbidden(format!("{} access required", label)));
    }

    Ok(())
}

/// Require admin role
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, &[UserRole::Admin], "Admin")?;
    Ok(next.run(request).await)
}

/// Require driver role
pub async fn require_driver(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, &[UserRole::Driver], "Driver")?;
    Ok(next.run(request).await)
}

/// Require customer role
pub async fn require_customer(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, &[UserRole::Customer], "Customer")?;
    Ok(next.run(request).await)
}

/// Operations console: admins and drivers
pub async fn require_staff(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, &[UserRole::Admin, UserRole::Driver], "Staff")?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use uuid::Uuid;

    fn request_as(role: UserRole) -> Request {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(Claims {
            sub: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role,
            exp: 0,
            iat: 0,
        });
        request
    }

    #[test]
    fn test_customer_routes_admit_only_customers() {
        let customer_only = [UserRole::Customer];
        assert!(require_role(&request_as(UserRole::Customer), &customer_only, "Customer").is_ok());
        for role in [UserRole::Admin, UserRole::Driver] {
            let err = require_role(&request_as(role), &customer_only, "Customer").unwrap_err();
            assert!(matches!(err, AppError::Forbidden(ref msg) if msg == "Customer access required"));
        }
    }

    #[test]
    fn test_customers_are_kept_off_the_console() {
        let staff = [UserRole::Admin, UserRole::Driver];
        assert!(require_role(&request_as(UserRole::Customer), &staff, "Staff").is_err());
        assert!(require_role(&request_as(UserRole::Driver), &staff, "Staff").is_ok());
    }

    #[test]
    fn test_missing_claims_is_unauthorized() {
        let request = Request::new(Body::empty());
        let err = require_role(&request, &[UserRole::Customer], "Customer").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
