//! User service, including the addresses a user owns.

use common::{AddressId, EntityKind, UserId};
use store::{Address, NewAddress, NewUser, Page, Store, StoreExt, User, UserFilter, UserPatch};

use crate::error::DomainError;
use crate::validation;

/// Service for managing users and their addresses.
#[derive(Clone)]
pub struct UserService<S: Store> {
    store: S,
}

impl<S: Store> UserService<S> {
    /// Creates a new user service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads a user by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, id: UserId) -> Result<User, DomainError> {
        Ok(self.store.require_user(id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_users(&self, filter: &UserFilter, page: Page) -> Result<Vec<User>, DomainError> {
        Ok(self.store.list_users(filter, page).await?)
    }

    /// Creates a user after checking the username and email shape.
    #[tracing::instrument(skip(self, new), fields(username = %new.username))]
    pub async fn create_user(&self, new: NewUser) -> Result<User, DomainError> {
        validation::new_user(&new)?;
        let user = self.store.create_user(new).await?;

        metrics::counter!("users_created").increment(1);
        tracing::info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Overwrites the fields present in `patch`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, DomainError> {
        validation::user_patch(&patch)?;
        let user = self.store.update_user(id, patch).await?;

        tracing::info!(user_id = %user.id, "user updated");
        Ok(user)
    }

    /// Deletes a user together with the user's orders and addresses.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<(), DomainError> {
        if !self.store.delete_user(id).await? {
            return Err(DomainError::not_found(EntityKind::User, id));
        }

        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Adds an address to an existing user.
    #[tracing::instrument(skip(self, new), fields(user_id = %new.user_id))]
    pub async fn add_address(&self, new: NewAddress) -> Result<Address, DomainError> {
        validation::new_address(&new)?;
        self.store.require_user(new.user_id).await?;
        let address = self.store.create_address(new).await?;

        tracing::info!(address_id = %address.id, "address added");
        Ok(address)
    }

    /// Lists the addresses of an existing user.
    #[tracing::instrument(skip(self))]
    pub async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, DomainError> {
        self.store.require_user(user_id).await?;
        Ok(self.store.list_addresses(user_id).await?)
    }

    /// Deletes an address. Orders that shipped to it keep no address.
    #[tracing::instrument(skip(self))]
    pub async fn delete_address(&self, id: AddressId) -> Result<(), DomainError> {
        if !self.store.delete_address(id).await? {
            return Err(DomainError::not_found(EntityKind::Address, id));
        }

        tracing::info!(address_id = %id, "address deleted");
        Ok(())
    }
}
