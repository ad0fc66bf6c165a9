//! Order service: the only workflow that spans several entities.

use common::{EntityKind, OrderId};
use store::{
    Order, OrderFilter, OrderLine, OrderPatch, Page, Store, StoreExt, aggregate_demand,
    checked_order_total,
};

use crate::error::DomainError;
use crate::validation;

use super::CreateOrder;

/// Service for placing and managing orders.
///
/// Order creation checks every reference and every product's stock up front
/// for precise errors, then hands the order to
/// [`OrderStore::place_order`](store::OrderStore::place_order), which repeats
/// the stock check inside its own critical section. Two concurrent orders can
/// both pass the first check, but only one can win the second.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, DomainError> {
        Ok(self.store.require_order(id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Vec<Order>, DomainError> {
        Ok(self.store.list_orders(filter, page).await?)
    }

    /// Places an order, decrementing stock for every line.
    ///
    /// Either the whole order is written or nothing is. The stored total is
    /// always the sum of the captured line prices; a differing declared total
    /// is only logged.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, items = cmd.items.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let start = std::time::Instant::now();
        let result = self.place(cmd).await;
        let duration = start.elapsed().as_secs_f64();
        metrics::histogram!("order_creation_duration_seconds").record(duration);

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_price,
                    duration,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "order rejected");
            }
        }
        result
    }

    async fn place(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        validation::order_lines(&cmd.items)?;
        if let Some(total) = cmd.declared_total {
            validation::total_price(total)?;
        }

        self.store.require_user(cmd.user_id).await?;
        if let Some(address_id) = cmd.address_id {
            let address = self.store.require_address(address_id).await?;
            if address.user_id != cmd.user_id {
                return Err(DomainError::not_found(EntityKind::Address, address_id));
            }
        }

        // Every product must exist before any stock is looked at
        let demand = aggregate_demand(&cmd.items);
        let mut products = Vec::with_capacity(demand.len());
        for (product_id, requested) in demand {
            let product = self.store.require_product(product_id).await?;
            products.push((product, requested));
        }
        for (product, requested) in &products {
            let available = i64::from(product.stock_quantity);
            if available < *requested {
                return Err(DomainError::InsufficientStock {
                    product_id: product.id,
                    available,
                    requested: *requested,
                });
            }
        }

        // The total must fit before any stock is reserved
        let priced = cmd
            .items
            .iter()
            .map(|item| {
                products
                    .iter()
                    .find(|(p, _)| p.id == item.product_id)
                    .map(|(p, _)| OrderLine {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        price_at_order: p.price,
                    })
                    .ok_or_else(|| DomainError::not_found(EntityKind::Product, item.product_id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if checked_order_total(&priced).is_none() {
            return Err(DomainError::validation(
                "total_price",
                "order total is too large to represent",
            ));
        }

        let declared_total = cmd.declared_total;
        let order = self.store.place_order(cmd.into_new_order()).await?;

        if let Some(declared) = declared_total
            && declared != order.total_price
        {
            tracing::warn!(
                order_id = %order.id,
                %declared,
                computed = %order.total_price,
                "declared total differs from computed total; keeping computed"
            );
        }
        Ok(order)
    }

    /// Overwrites the fields present in `patch`.
    ///
    /// Stock is never touched. A status change must follow the order
    /// lifecycle (pending, shipped, completed or cancelled).
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Order, DomainError> {
        if let Some(total) = patch.total_price {
            validation::total_price(total)?;
        }

        // The store checks the status transition against the row it locks
        let order = self.store.update_order(id, patch).await?;
        tracing::info!(order_id = %order.id, status = %order.status, "order updated");
        Ok(order)
    }

    /// Deletes an order and its lines. Stock is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), DomainError> {
        if !self.store.delete_order(id).await? {
            return Err(DomainError::not_found(EntityKind::Order, id));
        }

        tracing::info!(order_id = %id, "order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderStatus, ProductId, UserId};
    use store::{InMemoryStore, NewProduct, NewUser, ProductStore, UserStore};

    async fn setup() -> (OrderService<InMemoryStore>, InMemoryStore, UserId, ProductId) {
        let store = InMemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let product = store
            .create_product(NewProduct {
                name: "Widget".to_string(),
                price: Money::from_cents(1000),
                description: None,
                stock_quantity: 5,
            })
            .await
            .unwrap();
        (OrderService::new(store.clone()), store, user.id, product.id)
    }

    #[tokio::test]
    async fn test_empty_order_is_rejected() {
        let (service, _, user_id, _) = setup().await;
        let result = service.create_order(CreateOrder::new(user_id)).await;
        assert!(matches!(
            result,
            Err(DomainError::Validation { field: "items", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let (service, _, _, product_id) = setup().await;
        let result = service
            .create_order(CreateOrder::new(UserId::new()).with_item(product_id, 1))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                kind: EntityKind::User,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let (service, store, user_id, product_id) = setup().await;
        let result = service
            .create_order(
                CreateOrder::new(user_id)
                    .with_item(product_id, 1)
                    .with_item(ProductId::new(), 1),
            )
            .await;

        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                kind: EntityKind::Product,
                ..
            })
        ));
        assert_eq!(store.require_product(product_id).await.unwrap().stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_declared_total_is_not_trusted() {
        let (service, _, user_id, product_id) = setup().await;
        let order = service
            .create_order(
                CreateOrder::new(user_id)
                    .with_item(product_id, 2)
                    .with_declared_total(Money::from_cents(1)),
            )
            .await
            .unwrap();

        assert_eq!(order.total_price, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn test_total_override_through_update() {
        let (service, _, user_id, product_id) = setup().await;
        let order = service
            .create_order(CreateOrder::new(user_id).with_item(product_id, 1))
            .await
            .unwrap();

        let updated = service
            .update_order(
                order.id,
                OrderPatch {
                    total_price: Some(Money::from_cents(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total_price, Money::from_cents(500));
        assert_eq!(updated.lines, order.lines);
    }

    #[tokio::test]
    async fn test_status_transitions_are_enforced() {
        let (service, _, user_id, product_id) = setup().await;
        let order = service
            .create_order(CreateOrder::new(user_id).with_item(product_id, 1))
            .await
            .unwrap();

        let cancel = OrderPatch {
            status: Some(OrderStatus::Cancelled),
            ..Default::default()
        };
        let cancelled = service.update_order(order.id, cancel).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let ship = OrderPatch {
            status: Some(OrderStatus::Shipped),
            ..Default::default()
        };
        let result = service.update_order(order.id, ship).await;
        assert!(matches!(
            result,
            Err(DomainError::InvalidStatusTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Shipped,
            })
        ));
    }

    #[tokio::test]
    async fn test_update_missing_order_is_not_found() {
        let (service, _, _, _) = setup().await;
        let result = service
            .update_order(
                OrderId::new(),
                OrderPatch {
                    status: Some(OrderStatus::Shipped),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound {
                kind: EntityKind::Order,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_does_not_restock() {
        let (service, store, user_id, product_id) = setup().await;
        let order = service
            .create_order(CreateOrder::new(user_id).with_item(product_id, 3))
            .await
            .unwrap();

        service.delete_order(order.id).await.unwrap();
        assert_eq!(store.require_product(product_id).await.unwrap().stock_quantity, 2);
        assert!(matches!(
            service.get_order(order.id).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
