use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque list-entry identifier. Locally persisted entries carry a decimal
/// integer assigned by the store; replicated entries carry a server-assigned
/// push key. Callers never interpret the contents, and the two key spaces
/// are never compared or merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub quantity: String,
}

/// Validated input for a new entry. Construction through [`NewItem::parse`]
/// is the only path into a store, so persisted titles and quantities are
/// always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    title: String,
    quantity: String,
}

impl NewItem {
    pub fn parse(title: &str, quantity: &str) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let quantity = quantity.trim();
        if quantity.is_empty() {
            return Err(ValidationError::EmptyQuantity);
        }
        Ok(Self {
            title: title.to_string(),
            quantity: quantity.to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn quantity(&self) -> &str {
        &self.quantity
    }
}
