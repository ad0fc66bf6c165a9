use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user.
    UserId
);

entity_id!(
    /// Unique identifier for a postal address owned by a user.
    AddressId
);

entity_id!(
    /// Unique identifier for a product.
    ProductId
);

entity_id!(
    /// Unique identifier for an order.
    OrderId
);

/// The kind of entity a lookup or reference was about.
///
/// Carried by "not found" errors so callers can tell a missing user from a
/// missing product without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Address,
    Product,
    Order,
}

impl EntityKind {
    /// Returns the lowercase noun for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Address => "address",
            EntityKind::Product => "product",
            EntityKind::Order => "order",
        }
    }

    /// Returns the capitalised noun, for the start of a sentence.
    pub fn title(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Address => "Address",
            EntityKind::Product => "Product",
            EntityKind::Order => "Order",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
