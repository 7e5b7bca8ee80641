//! Customer identity extracted from the request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CustomerId;

use crate::error::ApiError;

/// Header carrying the authenticated customer id, set by the identity layer.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// The customer a request acts for.
#[derive(Debug, Clone)]
pub struct Customer(pub CustomerId);

impl<S: Send + Sync> FromRequestParts<S> for Customer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CUSTOMER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {CUSTOMER_HEADER} header")))?;
        let id = value
            .to_str()
            .map(str::trim)
            .map_err(|_| ApiError::BadRequest(format!("invalid {CUSTOMER_HEADER} header")))?;
        if id.is_empty() {
            return Err(ApiError::Unauthorized(format!(
                "empty {CUSTOMER_HEADER} header"
            )));
        }
        Ok(Customer(CustomerId::from(id)))
    }
}
