//! Domain error types.

use common::{EntityKind, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced entity does not exist.
    #[error("{} with ID {id} not found", kind.title())]
    NotFound { kind: EntityKind, id: String },

    /// An order asked for more units than a product has in stock.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// A field failed validation before reaching the store.
    #[error("Invalid {field}: {constraint}")]
    Validation {
        field: &'static str,
        constraint: String,
    },

    /// The store rejected a write (duplicate value, dangling reference).
    #[error("{0}")]
    ConstraintViolation(String),

    /// The order lifecycle does not allow this status change.
    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(field: &'static str, constraint: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            constraint: constraint.into(),
        }
    }

    /// Short machine-readable label, used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::Validation { .. } => "validation",
            DomainError::ConstraintViolation(_) => "constraint_violation",
            DomainError::InvalidStatusTransition { .. } => "invalid_status_transition",
            DomainError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => DomainError::NotFound { kind, id },
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => DomainError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StoreError::TotalOverflow => {
                DomainError::validation("total_price", "order total is too large to represent")
            }
            StoreError::InvalidStatusTransition { from, to } => {
                DomainError::InvalidStatusTransition { from, to }
            }
            StoreError::ConstraintViolation {
                constraint,
                message,
            } => DomainError::ConstraintViolation(constraint_message(&constraint, message)),
            other => DomainError::Store(other),
        }
    }
}

/// Human-readable message for a named schema constraint.
fn constraint_message(constraint: &str, fallback: String) -> String {
    match constraint {
        "users_username_key" => "Username already exists".to_string(),
        "users_email_key" => "Email already exists".to_string(),
        "products_name_key" => "Product name already exists".to_string(),
        "orders_user_id_fkey" => "Referenced user does not exist".to_string(),
        "orders_address_id_fkey" => "Referenced address does not exist".to_string(),
        "addresses_user_id_fkey" => "Referenced user does not exist".to_string(),
        "order_lines_product_id_fkey" => {
            "Product is referenced by existing orders and cannot be deleted".to_string()
        }
        _ => fallback,
    }
}
