//! Order placement and lifecycle.

mod commands;
mod service;

pub use commands::CreateOrder;
pub use service::OrderService;
