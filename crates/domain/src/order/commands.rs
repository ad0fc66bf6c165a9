//! Order commands.

use common::{AddressId, Money, OrderStatus, ProductId, UserId};
use store::{LineRequest, NewOrder};

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The user placing the order.
    pub user_id: UserId,

    /// Optional shipping address.
    pub address_id: Option<AddressId>,

    /// Requested products and quantities.
    pub items: Vec<LineRequest>,

    /// Total the caller believes the order comes to.
    ///
    /// Only compared against the computed total; never stored.
    pub declared_total: Option<Money>,

    /// Initial status.
    pub status: OrderStatus,
}

impl CreateOrder {
    /// Creates a pending order for `user_id` with no items yet.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            address_id: None,
            items: Vec::new(),
            declared_total: None,
            status: OrderStatus::Pending,
        }
    }

    /// Adds a requested line.
    pub fn with_item(mut self, product_id: ProductId, quantity: i32) -> Self {
        self.items.push(LineRequest::new(product_id, quantity));
        self
    }

    /// Ships the order to `address_id`.
    pub fn with_address(mut self, address_id: AddressId) -> Self {
        self.address_id = Some(address_id);
        self
    }

    /// Records the total the caller expects.
    pub fn with_declared_total(mut self, total: Money) -> Self {
        self.declared_total = Some(total);
        self
    }

    /// Sets the initial status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn into_new_order(self) -> NewOrder {
        NewOrder {
            user_id: self.user_id,
            address_id: self.address_id,
            lines: self.items,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_items_in_order() {
        let user_id = UserId::new();
        let a = ProductId::new();
        let b = ProductId::new();

        let cmd = CreateOrder::new(user_id)
            .with_item(a, 2)
            .with_item(b, 1)
            .with_status(OrderStatus::Shipped);

        assert_eq!(cmd.items, vec![LineRequest::new(a, 2), LineRequest::new(b, 1)]);
        assert_eq!(cmd.status, OrderStatus::Shipped);
        assert!(cmd.address_id.is_none());

        let new = cmd.into_new_order();
        assert_eq!(new.user_id, user_id);
        assert_eq!(new.lines.len(), 2);
    }
}
