//! Product records and the command that creates them.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::error::ValidationError;

/// A product as stored on the write side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

/// Rejects text the stores cannot hold.
pub(crate) fn check_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::NulCharacter { field });
    }
    Ok(())
}

/// Command to create a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price: Money,
    pub stock: i32,
}

impl CreateProduct {
    /// Creates a new command.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
        stock: i32,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price,
            stock,
        }
    }

    /// Checks the command before anything is written.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        check_text("name", &self.name)?;
        check_text("category", &self.category)?;
        if self.price.is_negative() {
            return Err(ValidationError::NegativePrice { price: self.price });
        }
        if self.stock < 0 {
            return Err(ValidationError::NegativeStock { stock: self.stock });
        }
        Ok(())
    }

    /// Builds the stored record once the store has assigned an id.
    pub fn into_product(self, id: ProductId, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            category: self.category,
            price: self.price,
            stock: self.stock,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_product_passes() {
        let cmd = CreateProduct::new("Widget", "tools", Money::from_cents(999), 10);
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let cmd = CreateProduct::new("  ", "tools", Money::from_cents(999), 10);
        assert_eq!(
            cmd.validate(),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn negative_price_and_stock_are_rejected() {
        let cmd = CreateProduct::new("Widget", "", Money::from_cents(-1), 10);
        assert!(matches!(
            cmd.validate(),
            Err(ValidationError::NegativePrice { .. })
        ));

        let cmd = CreateProduct::new("Widget", "", Money::from_cents(1), -1);
        assert_eq!(
            cmd.validate(),
            Err(ValidationError::NegativeStock { stock: -1 })
        );
    }

    #[test]
    fn nul_in_text_is_rejected() {
        let cmd = CreateProduct::new("Wid\0get", "tools", Money::from_cents(1), 1);
        assert_eq!(
            cmd.validate(),
            Err(ValidationError::NulCharacter { field: "name" })
        );

        let cmd = CreateProduct::new("Widget", "to\0ols", Money::from_cents(1), 1);
        assert_eq!(
            cmd.validate(),
            Err(ValidationError::NulCharacter { field: "category" })
        );
    }

    #[test]
    fn deserializes_from_request_body() {
        let cmd: CreateProduct = serde_json::from_value(serde_json::json!({
            "name": "Widget",
            "category": "tools",
            "price": 10.0,
            "stock": 3
        }))
        .unwrap();
        assert_eq!(cmd.price, Money::from_cents(1000));
    }
}
