//! Shared types for the shop API.
//!
//! Identifiers, money and order status live here so that the store, the
//! domain services and the HTTP layer agree on a single representation.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, ParseOrderStatusError};
pub use types::{AddressId, EntityKind, OrderId, ProductId, UserId};
