//! Address endpoints nested under users.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AddressId, EntityKind, UserId};
use serde::{Deserialize, Serialize};
use store::{Address, NewAddress, Store};

use super::{DeletedResponse, parse_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateAddressRequest {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    pub country: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub id: String,
    pub user_id: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Address> for AddressResponse {
    fn from(address: Address) -> Self {
        Self {
            id: address.id.to_string(),
            user_id: address.user_id.to_string(),
            street: address.street,
            city: address.city,
            state: address.state,
            zip_code: address.zip_code,
            country: address.country,
            is_primary: address.is_primary,
            created_at: address.created_at,
            updated_at: address.updated_at,
        }
    }
}

/// GET /users/{id}/addresses
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AddressResponse>>, ApiError> {
    let user_id: UserId = parse_id(&id)?;
    let addresses = state.users.list_addresses(user_id).await?;

    Ok(Json(
        addresses.into_iter().map(AddressResponse::from).collect(),
    ))
}

/// POST /users/{id}/addresses
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<CreateAddressRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddressResponse>), ApiError> {
    let user_id: UserId = parse_id(&id)?;
    let Json(req) = body?;
    let address = state
        .users
        .add_address(NewAddress {
            user_id,
            street: req.street,
            city: req.city,
            state: req.state,
            zip_code: req.zip_code,
            country: req.country,
            is_primary: req.is_primary,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(address.into())))
}

/// DELETE /addresses/{id}: orders that used the address keep no address.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let address_id: AddressId = parse_id(&id)?;
    state.users.delete_address(address_id).await?;

    Ok(Json(DeletedResponse::new(EntityKind::Address)))
}
