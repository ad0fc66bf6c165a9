use async_trait::async_trait;
use common::{AddressId, EntityKind, OrderId, ProductId, UserId};

use crate::{
    Address, NewAddress, NewOrder, NewProduct, NewUser, Order, OrderFilter, OrderPatch, Page,
    Product, ProductFilter, ProductPatch, Result, StoreError, User, UserFilter, UserPatch,
};

/// Persistence for users.
///
/// Deleting a user removes the user's orders and addresses with it.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetches a user. Returns `None` if absent.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Lists users matching `filter`, in creation order.
    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>>;

    /// Inserts a user. Duplicate usernames or emails are a constraint violation.
    async fn create_user(&self, new: NewUser) -> Result<User>;

    /// Overwrites the fields present in `patch`.
    ///
    /// Fails with `NotFound` if the user does not exist.
    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User>;

    /// Deletes a user and everything the user owns.
    ///
    /// Returns whether a row existed.
    async fn delete_user(&self, id: UserId) -> Result<bool>;
}

/// Persistence for user addresses.
///
/// Deleting an address clears it from any order that referenced it.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn get_address(&self, id: AddressId) -> Result<Option<Address>>;

    /// Lists a user's addresses in creation order.
    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>>;

    async fn create_address(&self, new: NewAddress) -> Result<Address>;

    async fn delete_address(&self, id: AddressId) -> Result<bool>;
}

/// Persistence for products.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fetches a product. Returns `None` if absent.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists products matching `filter`, in creation order.
    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Vec<Product>>;

    /// Inserts a product. Duplicate names are a constraint violation.
    async fn create_product(&self, new: NewProduct) -> Result<Product>;

    /// Overwrites the fields present in `patch`.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product>;

    /// Deletes a product. Products referenced by order lines cannot be deleted.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetches an order with its lines. Returns `None` if absent.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders matching `filter`, in creation order.
    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>>;

    /// Places an order atomically.
    ///
    /// Within a single critical section this verifies the user, the address
    /// and every product, checks stock for all lines before writing anything,
    /// then decrements stock, captures each product's current price on its
    /// line and stores the order with `total_price` equal to the sum of the
    /// line totals. On any failure nothing is written.
    async fn place_order(&self, new: NewOrder) -> Result<Order>;

    /// Overwrites the fields present in `patch` without touching stock.
    ///
    /// Fails with `NotFound` if the order does not exist.
    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Order>;

    /// Deletes an order and its lines. Stock is not restored.
    async fn delete_order(&self, id: OrderId) -> Result<bool>;
}

/// A complete store backend.
pub trait Store: UserStore + AddressStore + ProductStore + OrderStore + Clone + 'static {}

// Blanket implementation for anything that provides every entity store
impl<T> Store for T where T: UserStore + AddressStore + ProductStore + OrderStore + Clone + 'static {}

/// Extension trait turning absent rows into `NotFound` errors.
#[async_trait]
pub trait StoreExt: Store {
    /// Fetches a user or fails with `NotFound`.
    async fn require_user(&self, id: UserId) -> Result<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::User, id))
    }

    /// Fetches a product or fails with `NotFound`.
    async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Product, id))
    }

    /// Fetches an address or fails with `NotFound`.
    async fn require_address(&self, id: AddressId) -> Result<Address> {
        self.get_address(id)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Address, id))
    }

    /// Fetches an order or fails with `NotFound`.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, id))
    }
}

impl<T: Store> StoreExt for T {}
