//! Domain layer for the shop API.
//!
//! This crate provides the services that sit between the HTTP layer and the
//! entity store:
//! - [`UserService`] for users and their addresses
//! - [`ProductService`] for the catalogue
//! - [`OrderService`] for atomic order placement and the order lifecycle
//!
//! Every service validates its input before touching the store and maps
//! store failures into [`DomainError`].

pub mod error;
pub mod order;
pub mod product;
pub mod user;
pub mod validation;

pub use error::DomainError;
pub use order::{CreateOrder, OrderService};
pub use product::ProductService;
pub use user::UserService;
pub use validation::MAX_USERNAME_LEN;
