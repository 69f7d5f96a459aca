//! Products as stored in the shared catalog.
//!
//! [`ProductRow`] mirrors the `products` relation on the wire. [`Product`] is the
//! validated in-memory form held by the catalog snapshot, and [`NewProduct`] is
//! the insert payload (no `id` or `created_at`: the backend assigns those).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ProductId, UserId};
use super::price::{Price, PriceError};

/// A row of the `products` relation exactly as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub image_url: String,
    pub owner_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A row that violates the product invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductRowError {
    #[error("product {0} has an empty name")]
    EmptyName(String),
    #[error("product {id} has an invalid price: {source}")]
    InvalidPrice {
        id: String,
        #[source]
        source: PriceError,
    },
}

/// A persisted product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// Public URL of the uploaded product photo.
    pub image_url: String,
    pub owner_id: UserId,
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Whether `user` created this product.
    ///
    /// This only drives what the UI offers (e.g. a delete button); the backend
    /// makes the authoritative decision.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_id == user
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = ProductRowError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        if row.name.trim().is_empty() {
            return Err(ProductRowError::EmptyName(row.id));
        }
        let price = Price::try_from(row.price).map_err(|source| ProductRowError::InvalidPrice {
            id: row.id.clone(),
            source,
        })?;

        Ok(Self {
            id: ProductId::from(row.id),
            name: row.name,
            price,
            image_url: row.image_url,
            owner_id: UserId::from(row.owner_id),
            created_at: row.created_at,
        })
    }
}

/// Insert payload for a new product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    pub image_url: String,
    pub owner_id: UserId,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn row() -> ProductRow {
        ProductRow {
            id: "p1".to_string(),
            name: "Mug".to_string(),
            price: 9.99,
            image_url: "https://cdn.test/u1/a.jpg".to_string(),
            owner_id: "u1".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_row_deserializes_from_wire() {
        let json = r#"{
            "id": "7d3c",
            "name": "Lamp",
            "price": 25,
            "image_url": "https://cdn.test/x.png",
            "owner_id": "u9",
            "created_at": "2024-05-01T10:00:00+00:00"
        }"#;
        let row: ProductRow = serde_json::from_str(json).unwrap();
        let product = Product::try_from(row).unwrap();
        assert_eq!(product.id, ProductId::new("7d3c"));
        assert_eq!(product.price.amount(), Decimal::new(25, 0));
        assert!(product.created_at.is_some());
    }

    #[test]
    fn test_row_rejects_bad_price_and_name() {
        let mut bad_price = row();
        bad_price.price = 0.0;
        assert!(matches!(
            Product::try_from(bad_price),
            Err(ProductRowError::InvalidPrice { .. })
        ));

        let mut bad_name = row();
        bad_name.name = "  ".to_string();
        assert_eq!(
            Product::try_from(bad_name),
            Err(ProductRowError::EmptyName("p1".to_string()))
        );
    }

    #[test]
    fn test_new_product_serializes_insert_columns() {
        let new = NewProduct {
            name: "Mug".to_string(),
            price: Price::parse("9.99").unwrap(),
            image_url: "https://cdn.test/u1/a.jpg".to_string(),
            owner_id: UserId::new("u1"),
        };
        let value = serde_json::to_value(&new).unwrap();
        assert_eq!(value["owner_id"], "u1");
        assert_eq!(value["price"], 9.99);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_is_owned_by() {
        let product = Product::try_from(row()).unwrap();
        assert!(product.is_owned_by(&UserId::new("u1")));
        assert!(!product.is_owned_by(&UserId::new("u2")));
    }
}
