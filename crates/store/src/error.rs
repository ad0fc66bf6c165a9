use common::{EntityKind, OrderStatus, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row addressed by an update was not found.
    #[error("{} with ID {id} not found", kind.title())]
    NotFound { kind: EntityKind, id: String },

    /// An order asked for more units of a product than are in stock.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// The order total does not fit in the money representation.
    #[error("Order total is too large to represent")]
    TotalOverflow,

    /// The order lifecycle does not allow this status change.
    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A uniqueness, foreign key or check constraint rejected the write.
    #[error("Constraint violation ({constraint}): {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn constraint(constraint: &str, message: impl Into<String>) -> Self {
        StoreError::ConstraintViolation {
            constraint: constraint.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
