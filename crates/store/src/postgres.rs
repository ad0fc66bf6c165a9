use std::collections::HashMap;

use async_trait::async_trait;
use common::{AddressId, EntityKind, Money, OrderId, OrderStatus, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::query::like_pattern;
use crate::{
    Address, AddressStore, NewAddress, NewOrder, NewProduct, NewUser, Order, OrderFilter,
    OrderLine, OrderPatch, OrderStore, Page, Product, ProductFilter, ProductPatch, ProductStore,
    Result, StoreError, User, UserFilter, UserPatch, UserStore, aggregate_demand,
    checked_order_total,
};

const USER_COLUMNS: &str = "id, username, email, description, created_at, updated_at";
const ADDRESS_COLUMNS: &str =
    "id, user_id, street, city, state, zip_code, country, is_primary, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, description, stock_quantity, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, address_id, total_price_cents, status, order_date";

/// PostgreSQL-backed store implementation.
///
/// Cascades and uniqueness are enforced by the schema in `migrations/`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_address(row: &PgRow) -> Result<Address> {
        Ok(Address {
            id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            is_primary: row.try_get("is_primary")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            description: row.try_get("description")?,
            stock_quantity: row.try_get("stock_quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: row.try_get("quantity")?,
            price_at_order: Money::from_cents(row.try_get("price_at_order_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            address_id: row
                .try_get::<Option<Uuid>, _>("address_id")?
                .map(AddressId::from_uuid),
            lines,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status,
            order_date: row.try_get("order_date")?,
        })
    }

    async fn fetch_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, price_at_order_cents
            FROM order_lines
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_line).collect()
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let lines = self.fetch_lines(id).await?;
                Ok(Some(Self::row_to_order(&row, lines)?))
            }
            None => Ok(None),
        }
    }

    /// Locks the user (and address) rows so they cannot be deleted mid-order.
    ///
    /// The address must belong to the ordering user.
    async fn lock_order_refs(tx: &mut Transaction<'_, Postgres>, new: &NewOrder) -> Result<()> {
        let user: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR SHARE")
            .bind(new.user_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        if user.is_none() {
            return Err(StoreError::not_found(EntityKind::User, new.user_id));
        }

        if let Some(address_id) = new.address_id {
            let address: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM addresses WHERE id = $1 AND user_id = $2 FOR SHARE",
            )
            .bind(address_id.as_uuid())
            .bind(new.user_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
            if address.is_none() {
                return Err(StoreError::not_found(EntityKind::Address, address_id));
            }
        }
        Ok(())
    }
}

/// Turns constraint failures into [`StoreError::ConstraintViolation`].
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation())
    {
        return StoreError::ConstraintViolation {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            message: db_err.message().to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>> {
        let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
        let mut param_count = 0;

        if filter.username.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND username ILIKE ${param_count}"));
        }
        if filter.email.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND email ILIKE ${param_count}"));
        }
        sql.push_str(&format!(
            " ORDER BY seq ASC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut query = sqlx::query(&sql);
        if let Some(ref username) = filter.username {
            query = query.bind(like_pattern(username));
        }
        if let Some(ref email) = filter.email {
            query = query.bind(like_pattern(email));
        }
        let rows = query
            .bind(page.count())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_user).collect()
    }

    async fn create_user(&self, new: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, description) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(UserId::new().as_uuid())
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        Self::row_to_user(&row)
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User> {
        if patch.is_empty() {
            return self
                .get_user(id)
                .await?
                .ok_or_else(|| StoreError::not_found(EntityKind::User, id));
        }

        let sql = format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                description = COALESCE($4, description),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.username)
            .bind(&patch.email)
            .bind(&patch.description)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        match row {
            Some(row) => Self::row_to_user(&row),
            None => Err(StoreError::not_found(EntityKind::User, id)),
        }
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AddressStore for PostgresStore {
    async fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_address).transpose()
    }

    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>> {
        let sql =
            format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE user_id = $1 ORDER BY seq ASC");
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_address).collect()
    }

    async fn create_address(&self, new: NewAddress) -> Result<Address> {
        let sql = format!(
            r#"
            INSERT INTO addresses (id, user_id, street, city, state, zip_code, country, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ADDRESS_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(AddressId::new().as_uuid())
            .bind(new.user_id.as_uuid())
            .bind(&new.street)
            .bind(&new.city)
            .bind(&new.state)
            .bind(&new.zip_code)
            .bind(&new.country)
            .bind(new.is_primary)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        Self::row_to_address(&row)
    }

    async fn delete_address(&self, id: AddressId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Vec<Product>> {
        let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1");
        let mut param_count = 0;

        if filter.name.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND name ILIKE ${param_count}"));
        }
        if filter.min_price.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents >= ${param_count}"));
        }
        if filter.max_price.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND price_cents <= ${param_count}"));
        }
        sql.push_str(&format!(
            " ORDER BY seq ASC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut query = sqlx::query(&sql);
        if let Some(ref name) = filter.name {
            query = query.bind(like_pattern(name));
        }
        if let Some(min) = filter.min_price {
            query = query.bind(min.cents());
        }
        if let Some(max) = filter.max_price {
            query = query.bind(max.cents());
        }
        let rows = query
            .bind(page.count())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let sql = format!(
            r#"
            INSERT INTO products (id, name, price_cents, description, stock_quantity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(ProductId::new().as_uuid())
            .bind(&new.name)
            .bind(new.price.cents())
            .bind(&new.description)
            .bind(new.stock_quantity)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        Self::row_to_product(&row)
    }

    async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        if patch.is_empty() {
            return self
                .get_product(id)
                .await?
                .ok_or_else(|| StoreError::not_found(EntityKind::Product, id));
        }

        let sql = format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                price_cents = COALESCE($3, price_cents),
                description = COALESCE($4, description),
                stock_quantity = COALESCE($5, stock_quantity),
                updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(&patch.name)
            .bind(patch.price.map(|p| p.cents()))
            .bind(&patch.description)
            .bind(patch.stock_quantity)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        match row {
            Some(row) => Self::row_to_product(&row),
            None => Err(StoreError::not_found(EntityKind::Product, id)),
        }
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(id).await
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if filter.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        sql.push_str(&format!(
            " ORDER BY seq ASC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(page.count())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let line_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, price_at_order_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines_by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &line_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            lines_by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_line(row)?);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                let lines = lines_by_order.remove(&id).unwrap_or_default();
                Self::row_to_order(row, lines)
            })
            .collect()
    }

    async fn place_order(&self, new: NewOrder) -> Result<Order> {
        if let Some(line) = new.lines.iter().find(|l| l.quantity <= 0) {
            return Err(StoreError::constraint(
                "order_lines_quantity_check",
                format!("quantity must be positive, got {}", line.quantity),
            ));
        }

        let mut tx = self.pool.begin().await?;

        Self::lock_order_refs(&mut tx, &new).await?;

        // Lock every product row up front, in a stable order, before any check
        let demand = aggregate_demand(&new.lines);
        let ids: Vec<Uuid> = demand.iter().map(|(id, _)| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, price_cents, stock_quantity
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut locked: HashMap<Uuid, (Money, i32)> = HashMap::with_capacity(rows.len());
        for row in &rows {
            locked.insert(
                row.try_get("id")?,
                (
                    Money::from_cents(row.try_get("price_cents")?),
                    row.try_get("stock_quantity")?,
                ),
            );
        }

        for (product_id, _) in &demand {
            if !locked.contains_key(&product_id.as_uuid()) {
                return Err(StoreError::not_found(EntityKind::Product, product_id));
            }
        }
        for (product_id, requested) in &demand {
            let available = locked
                .get(&product_id.as_uuid())
                .map(|(_, stock)| i64::from(*stock))
                .unwrap_or(0);
            if available < *requested {
                return Err(StoreError::InsufficientStock {
                    product_id: *product_id,
                    available,
                    requested: *requested,
                });
            }
        }

        let mut lines = Vec::with_capacity(new.lines.len());
        for line in &new.lines {
            let (price_at_order, _) = locked
                .get(&line.product_id.as_uuid())
                .copied()
                .ok_or_else(|| StoreError::not_found(EntityKind::Product, line.product_id))?;
            lines.push(OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_order,
            });
        }
        let total_price = checked_order_total(&lines).ok_or(StoreError::TotalOverflow)?;

        for line in &new.lines {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $2, updated_at = now()
                WHERE id = $1 AND stock_quantity >= $2
                "#,
            )
            .bind(line.product_id.as_uuid())
            .bind(line.quantity)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

            if result.rows_affected() != 1 {
                let available = locked
                    .get(&line.product_id.as_uuid())
                    .map(|(_, stock)| i64::from(*stock))
                    .unwrap_or(0);
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    available,
                    requested: i64::from(line.quantity),
                });
            }
        }

        let order_id = OrderId::new();
        let sql = format!(
            r#"
            INSERT INTO orders (id, user_id, address_id, total_price_cents, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order_row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(new.user_id.as_uuid())
            .bind(new.address_id.map(|id| id.as_uuid()))
            .bind(total_price.cents())
            .bind(new.status.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, position, product_id, quantity, price_at_order_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(position as i32)
            .bind(line.product_id.as_uuid())
            .bind(line.quantity)
            .bind(line.price_at_order.cents())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        tx.commit().await?;

        let units: i64 = new.lines.iter().map(|l| i64::from(l.quantity)).sum();
        metrics::counter!("store_stock_units_reserved").increment(units as u64);
        Self::row_to_order(&order_row, lines)
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch) -> Result<Order> {
        if patch.is_empty() {
            return self
                .fetch_order(id)
                .await?
                .ok_or_else(|| StoreError::not_found(EntityKind::Order, id));
        }

        let mut tx = self.pool.begin().await?;

        // Hold the row so concurrent status changes are checked one at a time
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(StoreError::not_found(EntityKind::Order, id));
        };
        let current: OrderStatus = current
            .parse()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        if let Some(next) = patch.status
            && !current.can_transition_to(next)
        {
            return Err(StoreError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }

        let sql = format!(
            r#"
            UPDATE orders SET
                user_id = COALESCE($2, user_id),
                address_id = COALESCE($3, address_id),
                total_price_cents = COALESCE($4, total_price_cents),
                status = COALESCE($5, status)
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.user_id.map(|u| u.as_uuid()))
            .bind(patch.address_id.map(|a| a.as_uuid()))
            .bind(patch.total_price.map(|t| t.cents()))
            .bind(patch.status.map(|s| s.as_str()))
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await?;

        let lines = self.fetch_lines(id).await?;
        Self::row_to_order(&row, lines)
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
