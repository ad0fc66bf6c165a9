//! Product service.

use common::{EntityKind, ProductId};
use store::{NewProduct, Page, Product, ProductFilter, ProductPatch, Store, StoreExt};

use crate::error::DomainError;
use crate::validation;

/// Service for managing the product catalogue.
#[derive(Clone)]
pub struct ProductService<S: Store> {
    store: S,
}

impl<S: Store> ProductService<S> {
    /// Creates a new product service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads a product by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, DomainError> {
        Ok(self.store.require_product(id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Vec<Product>, DomainError> {
        Ok(self.store.list_products(filter, page).await?)
    }

    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, DomainError> {
        validation::new_product(&new)?;
        let product = self.store.create_product(new).await?;

        metrics::counter!("products_created").increment(1);
        tracing::info!(product_id = %product.id, price = %product.price, "product created");
        Ok(product)
    }

    /// Overwrites the fields present in `patch`.
    ///
    /// Repricing a product never changes the price captured on existing orders.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, DomainError> {
        validation::product_patch(&patch)?;
        let product = self.store.update_product(id, patch).await?;

        tracing::info!(product_id = %product.id, "product updated");
        Ok(product)
    }

    /// Deletes a product that no order references.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), DomainError> {
        if !self.store.delete_product(id).await? {
            return Err(DomainError::not_found(EntityKind::Product, id));
        }

        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }
}
