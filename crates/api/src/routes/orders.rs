//! Order CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AddressId, EntityKind, Money, OrderId, OrderStatus, ProductId, UserId};
use domain::CreateOrder;
use serde::{Deserialize, Serialize};
use store::{Order, OrderLine, OrderPatch, Store};

use super::params::OrderQuery;
use super::{DeletedResponse, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub address_id: Option<AddressId>,
    pub items: Vec<OrderItemRequest>,
    /// Not an override. The stored total is always the sum of the line
    /// prices; a differing value is logged and ignored. Set a different
    /// total afterwards with `PUT /orders/{id}`.
    pub total_price_cents: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub user_id: Option<UserId>,
    pub address_id: Option<AddressId>,
    pub total_price_cents: Option<i64>,
    pub status: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub address_id: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub total_price_cents: i64,
    pub status: String,
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: i32,
    pub price_at_order_cents: i64,
}

impl From<OrderLine> for OrderItemResponse {
    fn from(line: OrderLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            quantity: line.quantity,
            price_at_order_cents: line.price_at_order.cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            address_id: order.address_id.map(|id| id.to_string()),
            items: order
                .lines
                .into_iter()
                .map(OrderItemResponse::from)
                .collect(),
            total_price_cents: order.total_price.cents(),
            status: order.status.to_string(),
            order_date: order.order_date,
        }
    }
}

fn parse_status(status: Option<&str>) -> Result<Option<OrderStatus>, ApiError> {
    status
        .map(|s| {
            s.parse::<OrderStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))
        })
        .transpose()
}

// -- Handlers --

/// GET /orders: list orders with pagination, user and status filters.
///
/// `status` must name a known status; anything else is a 400 rather than an
/// empty list.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let Query(query) = query?;
    let orders = state
        .orders
        .list_orders(&query.filter()?, query.page()?)
        .await?;

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: load an order with its line items.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let order = state.orders.get_order(order_id).await?;

    Ok(Json(order.into()))
}

/// POST /orders: place an order, reserving stock for every item.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = body?;

    let mut cmd = CreateOrder::new(req.user_id);
    for item in &req.items {
        cmd = cmd.with_item(item.product_id, item.quantity);
    }
    if let Some(address_id) = req.address_id {
        cmd = cmd.with_address(address_id);
    }
    if let Some(cents) = req.total_price_cents {
        cmd = cmd.with_declared_total(Money::from_cents(cents));
    }
    if let Some(status) = parse_status(req.status.as_deref())? {
        cmd = cmd.with_status(status);
    }

    let order = state.orders.create_order(cmd).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// PUT /orders/{id}: overwrite only the fields present in the body.
///
/// Stock is not touched; a status change must follow the order lifecycle.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let Json(req) = body?;

    let patch = OrderPatch {
        user_id: req.user_id,
        address_id: req.address_id,
        total_price: req.total_price_cents.map(Money::from_cents),
        status: parse_status(req.status.as_deref())?,
    };
    let order = state.orders.update_order(order_id, patch).await?;

    Ok(Json(order.into()))
}

/// DELETE /orders/{id}: stock is not restored.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    state.orders.delete_order(order_id).await?;

    Ok(Json(DeletedResponse::new(EntityKind::Order)))
}
