//! HTTP route handlers.

pub mod addresses;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod params;
pub mod products;
pub mod users;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Body returned by every successful DELETE.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: String,
}

impl DeletedResponse {
    fn new(kind: common::EntityKind) -> Self {
        Self {
            message: format!("{} deleted successfully", kind.title()),
        }
    }
}

fn parse_id<T: From<Uuid>>(id: &str) -> Result<T, ApiError> {
    let uuid =
        Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(T::from(uuid))
}
