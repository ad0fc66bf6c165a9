//! Persisted records and the inputs used to create or patch them.

use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, OrderStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub description: Option<String>,
}

/// Partial update for a user. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

impl UserPatch {
    /// Returns true if the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.description.is_none()
    }
}

/// A postal address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub user_id: UserId,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_primary: bool,
}

/// A product in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub description: Option<String>,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub description: Option<String>,
    pub stock_quantity: i32,
}

/// Partial update for a product. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub description: Option<String>,
    pub stock_quantity: Option<i32>,
}

impl ProductPatch {
    /// Returns true if the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.stock_quantity.is_none()
    }
}

/// One line of a placed order, with the unit price captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price_at_order: Money,
}

impl OrderLine {
    /// Returns the total for this line (quantity * price_at_order).
    pub fn line_total(&self) -> Money {
        self.price_at_order.multiply(self.quantity)
    }
}

/// Sums line totals, returning `None` if any step overflows.
pub fn checked_order_total(lines: &[OrderLine]) -> Option<Money> {
    lines.iter().try_fold(Money::zero(), |total, line| {
        total.checked_add(line.price_at_order.checked_multiply(line.quantity)?)
    })
}

/// A placed order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: Option<AddressId>,
    pub lines: Vec<OrderLine>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Sums the captured line prices.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}

/// A requested line: which product and how many units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Everything needed to place an order atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub address_id: Option<AddressId>,
    pub lines: Vec<LineRequest>,
    pub status: OrderStatus,
}

/// Partial update for an order. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub user_id: Option<UserId>,
    pub address_id: Option<AddressId>,
    pub total_price: Option<Money>,
    pub status: Option<OrderStatus>,
}

impl OrderPatch {
    /// Returns true if the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.address_id.is_none()
            && self.total_price.is_none()
            && self.status.is_none()
    }
}

/// Sums requested quantities per product, keeping first-appearance order.
///
/// Stock checks run against the aggregate demand so that an order listing
/// the same product twice cannot exceed its stock.
pub fn aggregate_demand(lines: &[LineRequest]) -> Vec<(ProductId, i64)> {
    let mut demand: Vec<(ProductId, i64)> = Vec::with_capacity(lines.len());
    for line in lines {
        match demand.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, total)) => *total += i64::from(line.quantity),
            None => demand.push((line.product_id, i64::from(line.quantity))),
        }
    }
    demand
}
