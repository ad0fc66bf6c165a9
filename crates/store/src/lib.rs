//! Entity store for the shop API.
//!
//! Typed CRUD plus filtered, paginated listing for users, addresses,
//! products and orders, with two interchangeable backends:
//! - [`InMemoryStore`] guarded by a single async lock, used by tests and
//!   by the server when no database is configured
//! - [`PostgresStore`] on top of a `sqlx` connection pool
//!
//! The store enforces schema constraints (uniqueness, foreign keys,
//! non-negative stock) but no business rules.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Address, LineRequest, NewAddress, NewOrder, NewProduct, NewUser, Order, OrderLine, OrderPatch,
    Product, ProductPatch, User, UserPatch, aggregate_demand, checked_order_total,
};
pub use postgres::PostgresStore;
pub use query::{OrderFilter, Page, PageError, ProductFilter, UserFilter};
pub use store::{AddressStore, OrderStore, ProductStore, Store, StoreExt, UserStore};
