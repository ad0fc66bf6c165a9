use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AddressId, EntityKind, Money, OrderId, ProductId, UserId};
use tokio::sync::RwLock;

use crate::query::contains_ignore_case;
use crate::{
    Address, AddressStore, NewAddress, NewOrder, NewProduct, NewUser, Order, OrderFilter,
    OrderLine, OrderPatch, OrderStore, Page, Product, ProductFilter, ProductPatch, ProductStore,
    Result, StoreError, User, UserFilter, UserPatch, UserStore, aggregate_demand,
    checked_order_total,
};

/// Rows kept in insertion order, one vector per table.
#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    addresses: Vec<Address>,
    products: Vec<Product>,
    orders: Vec<Order>,
}

impl Tables {
    fn user_exists(&self, id: UserId) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    fn address_exists(&self, id: AddressId) -> bool {
        self.addresses.iter().any(|a| a.id == id)
    }

    fn address_belongs_to(&self, id: AddressId, user_id: UserId) -> bool {
        self.addresses
            .iter()
            .any(|a| a.id == id && a.user_id == user_id)
    }

    fn product_index(&self, id: ProductId) -> Option<usize> {
        self.products.iter().position(|p| p.id == id)
    }

    fn check_user_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<UserId>,
    ) -> Result<()> {
        let others = self.users.iter().filter(|u| Some(u.id) != except);
        for user in others {
            if username == Some(user.username.as_str()) {
                return Err(StoreError::constraint(
                    "users_username_key",
                    format!("username '{}' is already taken", user.username),
                ));
            }
            if email == Some(user.email.as_str()) {
                return Err(StoreError::constraint(
                    "users_email_key",
                    format!("email '{}' is already registered", user.email),
                ));
            }
        }
        Ok(())
    }

    fn check_product_unique(&self, name: &str, except: Option<ProductId>) -> Result<()> {
        if self
            .products
            .iter()
            .any(|p| Some(p.id) != except && p.name == name)
        {
            return Err(StoreError::constraint(
                "products_name_key",
                format!("product name '{name}' is already taken"),
            ));
        }
        Ok(())
    }

    fn check_order_refs(&self, user_id: Option<UserId>, address_id: Option<AddressId>) -> Result<()> {
        if let Some(user_id) = user_id
            && !self.user_exists(user_id)
        {
            return Err(StoreError::constraint(
                "orders_user_id_fkey",
                format!("user {user_id} does not exist"),
            ));
        }
        if let Some(address_id) = address_id
            && !self.address_exists(address_id)
        {
            return Err(StoreError::constraint(
                "orders_address_id_fkey",
                format!("address {address_id} does not exist"),
            ));
        }
        Ok(())
    }
}

fn check_stock_quantity(stock_quantity: i32) -> Result<()> {
    if stock_quantity < 0 {
        return Err(StoreError::constraint(
            "products_stock_quantity_check",
            format!("stock_quantity must not be negative, got {stock_quantity}"),
        ));
    }
    Ok(())
}

fn check_price(price: Money) -> Result<()> {
    if !price.is_positive() {
        return Err(StoreError::constraint(
            "products_price_cents_check",
            format!("price must be positive, got {price}"),
        ));
    }
    Ok(())
}

/// In-memory store implementation.
///
/// All tables sit behind one lock, so every operation (including
/// [`OrderStore::place_order`]) is serialised with respect to every other.
/// Cloning yields another handle to the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let matching = tables.users.iter().filter(|u| {
            if let Some(ref username) = filter.username
                && !contains_ignore_case(&u.username, username)
            {
                return false;
            }
            if let Some(ref email) = filter.email
                && !contains_ignore_case(&u.email, email)
            {
                return false;
            }
            true
        });
        Ok(page.apply(matching.cloned()))
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        tables.check_user_unique(Some(&new.username), Some(&new.email), None)?;

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            username: new.username,
            email: new.email,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
        let mut tables = self.tables.write().await;
        let index = tables
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::User, id))?;
        if patch.is_empty() {
            return Ok(tables.users[index].clone());
        }
        tables.check_user_unique(patch.username.as_deref(), patch.email.as_deref(), Some(id))?;

        let user = &mut tables.users[index];
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(description) = patch.description {
            user.description = Some(description);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }

        // Cascade to everything the user owns
        tables.orders.retain(|o| o.user_id != id);
        tables.addresses.retain(|a| a.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl AddressStore for InMemoryStore {
    async fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        let tables = self.tables.read().await;
        Ok(tables.addresses.iter().find(|a| a.id == id).cloned())
    }

    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>> {
        let tables = self.tables.read().await;
        Ok(tables
            .addresses
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_address(&self, new: NewAddress) -> Result<Address> {
        let mut tables = self.tables.write().await;
        if !tables.user_exists(new.user_id) {
            return Err(StoreError::constraint(
                "addresses_user_id_fkey",
                format!("user {} does not exist", new.user_id),
            ));
        }

        let now = Utc::now();
        let address = Address {
            id: AddressId::new(),
            user_id: new.user_id,
            street: new.street,
            city: new.city,
            state: new.state,
            zip_code: new.zip_code,
            country: new.country,
            is_primary: new.is_primary,
            created_at: now,
            updated_at: now,
        };
        tables.addresses.push(address.clone());
        Ok(address)
    }

    async fn delete_address(&self, id: AddressId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.addresses.len();
        tables.addresses.retain(|a| a.id != id);
        if tables.addresses.len() == before {
            return Ok(false);
        }

        for order in tables.orders.iter_mut() {
            if order.address_id == Some(id) {
                order.address_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let matching = tables.products.iter().filter(|p| {
            if let Some(ref name) = filter.name
                && !contains_ignore_case(&p.name, name)
            {
                return false;
            }
            if let Some(min) = filter.min_price
                && p.price < min
            {
                return false;
            }
            if let Some(max) = filter.max_price
                && p.price > max
            {
                return false;
            }
            true
        });
        Ok(page.apply(matching.cloned()))
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let mut tables = self.tables.write().await;
        tables.check_product_unique(&new.name, None)?;
        check_price(new.price)?;
        check_stock_quantity(new.stock_quantity)?;

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: new.name,
            price: new.price,
            description: new.description,
            stock_quantity: new.stock_quantity,
            created_at: now,
            updated_at: now,
        };
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        let mut tables = self.tables.write().await;
        let index = tables
            .product_index(id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Product, id))?;
        if patch.is_empty() {
            return Ok(tables.products[index].clone());
        }
        if let Some(ref name) = patch.name {
            tables.check_product_unique(name, Some(id))?;
        }
        if let Some(price) = patch.price {
            check_price(price)?;
        }
        if let Some(stock_quantity) = patch.stock_quantity {
            check_stock_quantity(stock_quantity)?;
        }

        let product = &mut tables.products[index];
        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(description) = patch.description {
            product.description = Some(description);
        }
        if let Some(stock_quantity) = patch.stock_quantity {
            product.stock_quantity = stock_quantity;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(index) = tables.product_index(id) else {
            return Ok(false);
        };

        let referenced = tables
            .orders
            .iter()
            .any(|o| o.lines.iter().any(|l| l.product_id == id));
        if referenced {
            return Err(StoreError::constraint(
                "order_lines_product_id_fkey",
                format!("product {id} is referenced by existing orders"),
            ));
        }

        tables.products.remove(index);
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let matching = tables.orders.iter().filter(|o| {
            if let Some(user_id) = filter.user_id
                && o.user_id != user_id
            {
                return false;
            }
            if let Some(status) = filter.status
                && o.status != status
            {
                return false;
            }
            true
        });
        Ok(page.apply(matching.cloned()))
    }

    async fn place_order(&self, new: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;

        if !tables.user_exists(new.user_id) {
            return Err(StoreError::not_found(EntityKind::User, new.user_id));
        }
        if let Some(address_id) = new.address_id
            && !tables.address_belongs_to(address_id, new.user_id)
        {
            return Err(StoreError::not_found(EntityKind::Address, address_id));
        }
        if let Some(line) = new.lines.iter().find(|l| l.quantity <= 0) {
            return Err(StoreError::constraint(
                "order_lines_quantity_check",
                format!("quantity must be positive, got {}", line.quantity),
            ));
        }

        // Resolve every product before checking any stock
        let demand = aggregate_demand(&new.lines);
        let mut staged: HashMap<ProductId, usize> = HashMap::with_capacity(demand.len());
        for (product_id, _) in &demand {
            let index = tables
                .product_index(*product_id)
                .ok_or_else(|| StoreError::not_found(EntityKind::Product, product_id))?;
            staged.insert(*product_id, index);
        }

        for (product_id, requested) in &demand {
            let product = &tables.products[staged[product_id]];
            let available = i64::from(product.stock_quantity);
            if available < *requested {
                return Err(StoreError::InsufficientStock {
                    product_id: *product_id,
                    available,
                    requested: *requested,
                });
            }
        }

        let lines: Vec<OrderLine> = new
            .lines
            .iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_order: tables.products[staged[&line.product_id]].price,
            })
            .collect();
        let total_price = checked_order_total(&lines).ok_or(StoreError::TotalOverflow)?;

        // Every check passed; nothing below can fail
        let now = Utc::now();
        for line in &new.lines {
            let product = &mut tables.products[staged[&line.product_id]];
            product.stock_quantity -= line.quantity;
            product.updated_at = now;
        }

        let order = Order {
            id: OrderId::new(),
            user_id: new.user_id,
            address_id: new.address_id,
            lines,
            total_price,
            status: new.status,
            order_date: now,
        };
        tables.orders.push(order.clone());

        metrics::counter!("store_stock_units_reserved")
            .increment(new.lines.iter().map(|l| l.quantity as u64).sum());
        Ok(order)
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let index = tables
            .orders
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Order, id))?;
        if patch.is_empty() {
            return Ok(tables.orders[index].clone());
        }
        tables.check_order_refs(patch.user_id, patch.address_id)?;
        if let Some(total) = patch.total_price
            && total.cents() < 0
        {
            return Err(StoreError::constraint(
                "orders_total_price_cents_check",
                format!("total price must not be negative, got {total}"),
            ));
        }
        let current = tables.orders[index].status;
        if let Some(next) = patch.status
            && !current.can_transition_to(next)
        {
            return Err(StoreError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }

        let order = &mut tables.orders[index];
        if let Some(user_id) = patch.user_id {
            order.user_id = user_id;
        }
        if let Some(address_id) = patch.address_id {
            order.address_id = Some(address_id);
        }
        if let Some(total_price) = patch.total_price {
            order.total_price = total_price;
        }
        if let Some(status) = patch.status {
            order.status = status;
        }
        Ok(order.clone())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.orders.len();
        tables.orders.retain(|o| o.id != id);
        Ok(tables.orders.len() != before)
    }
}
