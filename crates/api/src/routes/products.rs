//! Product CRUD endpoints. Prices travel as integer cents.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{EntityKind, Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{NewProduct, Product, ProductPatch, Store};

use super::params::ProductQuery;
use super::{DeletedResponse, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub stock_quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub description: Option<String>,
    pub stock_quantity: Option<i32>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub description: Option<String>,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name,
            price_cents: product.price.cents(),
            description: product.description,
            stock_quantity: product.stock_quantity,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

// -- Handlers --

/// GET /products: list products with pagination, name and price filters.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let Query(query) = query?;
    let products = state
        .products
        .list_products(&query.filter()?, query.page()?)
        .await?;

    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    let product = state.products.get_product(product_id).await?;

    Ok(Json(product.into()))
}

/// POST /products
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let Json(req) = body?;
    let product = state
        .products
        .create_product(NewProduct {
            name: req.name,
            price: Money::from_cents(req.price_cents),
            description: req.description,
            stock_quantity: req.stock_quantity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /products/{id}: overwrite only the fields present in the body.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    let Json(req) = body?;
    let product = state
        .products
        .update_product(
            product_id,
            ProductPatch {
                name: req.name,
                price: req.price_cents.map(Money::from_cents),
                description: req.description,
                stock_quantity: req.stock_quantity,
            },
        )
        .await?;

    Ok(Json(product.into()))
}

/// DELETE /products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    state.products.delete_product(product_id).await?;

    Ok(Json(DeletedResponse::new(EntityKind::Product)))
}
