//! Query-string parsing shared by the list endpoints.
//!
//! Every parameter arrives as an optional string. Empty values mean "not
//! supplied"; anything else must parse or the request is rejected with the
//! parameter's name in the message.

use std::str::FromStr;

use common::{Money, OrderStatus, UserId};
use serde::{Deserialize, Deserializer};
use store::{OrderFilter, Page, ProductFilter, UserFilter};

use crate::error::ApiError;

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn parse_field<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError> {
    value
        .map(|v| {
            v.parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid value for {name}: {v:?}")))
        })
        .transpose()
}

fn page_from(page: Option<&str>, count: Option<&str>) -> Result<Page, ApiError> {
    let page = parse_field("page", page)?.unwrap_or(1);
    let count = parse_field("count", count)?.unwrap_or(Page::DEFAULT_COUNT);
    Ok(Page::new(page, count)?)
}

/// Query parameters for `GET /users`.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub count: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub email: Option<String>,
}

impl UserQuery {
    pub fn page(&self) -> Result<Page, ApiError> {
        page_from(self.page.as_deref(), self.count.as_deref())
    }

    pub fn filter(&self) -> UserFilter {
        UserFilter {
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Query parameters for `GET /products`. Prices are in cents.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub count: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub min_price: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub max_price: Option<String>,
}

impl ProductQuery {
    pub fn page(&self) -> Result<Page, ApiError> {
        page_from(self.page.as_deref(), self.count.as_deref())
    }

    pub fn filter(&self) -> Result<ProductFilter, ApiError> {
        let min_price: Option<i64> = parse_field("min_price", self.min_price.as_deref())?;
        let max_price: Option<i64> = parse_field("max_price", self.max_price.as_deref())?;
        Ok(ProductFilter {
            name: self.name.clone(),
            min_price: min_price.map(Money::from_cents),
            max_price: max_price.map(Money::from_cents),
        })
    }
}

/// Query parameters for `GET /orders`. `status` is one of the known order
/// statuses.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub count: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub status: Option<String>,
}

impl OrderQuery {
    pub fn page(&self) -> Result<Page, ApiError> {
        page_from(self.page.as_deref(), self.count.as_deref())
    }

    pub fn filter(&self) -> Result<OrderFilter, ApiError> {
        let user_id: Option<uuid::Uuid> = parse_field("user_id", self.user_id.as_deref())?;
        let status: Option<OrderStatus> = parse_field("status", self.status.as_deref())?;
        Ok(OrderFilter {
            user_id: user_id.map(UserId::from_uuid),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_defaults_to_first_page_of_ten() {
        let page = UserQuery::default().page().unwrap();
        assert_eq!(page, Page::default());
        assert_eq!(page.count(), 10);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_count_out_of_range_is_rejected() {
        for count in ["0", "101", "-3"] {
            let query = UserQuery {
                count: some(count),
                ..Default::default()
            };
            assert!(query.page().is_err(), "count={count} should be rejected");
        }
    }

    #[test]
    fn test_malformed_number_names_the_field() {
        let query = ProductQuery {
            min_price: some("cheap"),
            ..Default::default()
        };
        match query.filter() {
            Err(ApiError::BadRequest(msg)) => assert!(msg.contains("min_price")),
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn test_order_filter_parses_status_and_user() {
        let user_id = UserId::new();
        let query = OrderQuery {
            user_id: Some(user_id.to_string()),
            status: some("Shipped"),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.user_id, Some(user_id));
        assert_eq!(filter.status, Some(OrderStatus::Shipped));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let query = OrderQuery {
            status: some("processing"),
            ..Default::default()
        };
        match query.filter() {
            Err(ApiError::BadRequest(msg)) => assert!(msg.contains("status")),
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_values_deserialize_as_none() {
        let query: UserQuery =
            serde_json::from_value(serde_json::json!({ "username": "", "page": " 2 " })).unwrap();
        assert!(query.username.is_none());
        assert_eq!(query.page().unwrap().page(), 2);
    }
}
