//! HTTP API server for the shop.
//!
//! Provides REST endpoints for users (with their addresses), products and
//! orders, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};
use domain::{OrderService, ProductService, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub users: UserService<S>,
    pub products: ProductService<S>,
    pub orders: OrderService<S>,
}

/// Builds the services over one store handle.
pub fn create_state<S: Store>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        users: UserService::new(store.clone()),
        products: ProductService::new(store.clone()),
        orders: OrderService::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/users",
            get(routes::users::list::<S>).post(routes::users::create::<S>),
        )
        .route(
            "/users/{id}",
            get(routes::users::get::<S>)
                .put(routes::users::update::<S>)
                .delete(routes::users::delete::<S>),
        )
        .route(
            "/users/{id}/addresses",
            get(routes::addresses::list::<S>).post(routes::addresses::create::<S>),
        )
        .route("/addresses/{id}", delete(routes::addresses::delete::<S>))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .put(routes::products::update::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>)
                .put(routes::orders::update::<S>)
                .delete(routes::orders::delete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
