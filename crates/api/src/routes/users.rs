//! User CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{EntityKind, UserId};
use serde::{Deserialize, Serialize};
use store::{NewUser, Store, User, UserPatch};

use super::params::UserQuery;
use super::{DeletedResponse, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            description: user.description,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// -- Handlers --

/// GET /users: list users with pagination and username/email filters.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let Query(query) = query?;
    let users = state
        .users
        .list_users(&query.filter(), query.page()?)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id: UserId = parse_id(&id)?;
    let user = state.users.get_user(user_id).await?;

    Ok(Json(user.into()))
}

/// POST /users
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(req) = body?;
    let user = state
        .users
        .create_user(NewUser {
            username: req.username,
            email: req.email,
            description: req.description,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /users/{id}: overwrite only the fields present in the body.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id: UserId = parse_id(&id)?;
    let Json(req) = body?;
    let user = state
        .users
        .update_user(
            user_id,
            UserPatch {
                username: req.username,
                email: req.email,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(user.into()))
}

/// DELETE /users/{id}: also removes the user's orders and addresses.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let user_id: UserId = parse_id(&id)?;
    state.users.delete_user(user_id).await?;

    Ok(Json(DeletedResponse::new(EntityKind::User)))
}
