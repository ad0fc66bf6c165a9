//! Field checks applied before anything reaches the store.

use common::Money;
use store::{LineRequest, NewAddress, NewProduct, NewUser, ProductPatch, UserPatch};

use crate::error::DomainError;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 50;

type Result<T> = std::result::Result<T, DomainError>;

fn non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn username(value: &str) -> Result<()> {
    non_empty("username", value)?;
    if value.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    Ok(())
}

fn email(value: &str) -> Result<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(DomainError::validation(
            "email",
            "must be a valid email address",
        ));
    }
    Ok(())
}

fn price(value: Money) -> Result<()> {
    if !value.is_positive() {
        return Err(DomainError::validation("price", "must be greater than 0"));
    }
    Ok(())
}

fn stock_quantity(value: i32) -> Result<()> {
    if value < 0 {
        return Err(DomainError::validation(
            "stock_quantity",
            "must not be negative",
        ));
    }
    Ok(())
}

pub(crate) fn new_user(new: &NewUser) -> Result<()> {
    username(&new.username)?;
    email(&new.email)
}

pub(crate) fn user_patch(patch: &UserPatch) -> Result<()> {
    if let Some(ref value) = patch.username {
        username(value)?;
    }
    if let Some(ref value) = patch.email {
        email(value)?;
    }
    Ok(())
}

pub(crate) fn new_address(new: &NewAddress) -> Result<()> {
    non_empty("street", &new.street)?;
    non_empty("city", &new.city)?;
    non_empty("country", &new.country)
}

pub(crate) fn new_product(new: &NewProduct) -> Result<()> {
    non_empty("name", &new.name)?;
    price(new.price)?;
    stock_quantity(new.stock_quantity)
}

pub(crate) fn product_patch(patch: &ProductPatch) -> Result<()> {
    if let Some(ref value) = patch.name {
        non_empty("name", value)?;
    }
    if let Some(value) = patch.price {
        price(value)?;
    }
    if let Some(value) = patch.stock_quantity {
        stock_quantity(value)?;
    }
    Ok(())
}

pub(crate) fn order_lines(lines: &[LineRequest]) -> Result<()> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "items",
            "an order needs at least one item",
        ));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(DomainError::validation(
            "quantity",
            format!("must be greater than 0, got {}", line.quantity),
        ));
    }
    Ok(())
}

pub(crate) fn total_price(value: Money) -> Result<()> {
    if value.cents() < 0 {
        return Err(DomainError::validation(
            "total_price",
            "must not be negative",
        ));
    }
    Ok(())
}
