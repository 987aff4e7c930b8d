use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{AggregateRoot, DomainError, DomainResult, Money, ProductId};

/// Pricing attached to a product.
///
/// All amounts are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price charged on direct orders.
    pub base_price: Money,
    /// Negotiated business price, when one is published.
    pub b2b_price: Option<Money>,
    /// Landed cost, for margin reporting.
    pub cost_price: Option<Money>,
}

impl Pricing {
    pub fn base(base_price: Money) -> Self {
        Self {
            base_price,
            b2b_price: None,
            cost_price: None,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.base_price.is_negative() {
            return Err(DomainError::validation("base_price cannot be negative"));
        }
        if self.b2b_price.is_some_and(Money::is_negative) {
            return Err(DomainError::validation("b2b_price cannot be negative"));
        }
        if self.cost_price.is_some_and(Money::is_negative) {
            return Err(DomainError::validation("cost_price cannot be negative"));
        }
        Ok(())
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: Product.
///
/// Referenced by id from order, PO and contract lines. Pricing is read-only
/// from the workflow's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    pricing: Pricing,
    is_active: bool,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Product {
    pub fn create(cmd: CreateProduct) -> DomainResult<Self> {
        let sku = cmd.sku.trim();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        cmd.pricing.validate()?;

        Ok(Self {
            id: cmd.product_id,
            sku: sku.to_string(),
            name: cmd.name,
            pricing: cmd.pricing,
            is_active: true,
            created_at: cmd.occurred_at,
            version: 1,
        })
    }

    /// Rebuild from persisted columns.
    pub fn restore(
        id: ProductId,
        sku: String,
        name: String,
        pricing: Pricing,
        is_active: bool,
        created_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            sku,
            name,
            pricing,
            is_active,
            created_at,
            version,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn base_price(&self) -> Money {
        self.pricing.base_price
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Inactive products stay resolvable by id but cannot be ordered.
    pub fn ensure_sellable(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::validation(format!(
                "product {} is not available for sale",
                self.sku
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_cmd(sku: &str, price: i64) -> CreateProduct {
        CreateProduct {
            product_id: ProductId::new(),
            sku: sku.to_string(),
            name: "Widget".to_string(),
            pricing: Pricing::base(Money::from_minor(price)),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn create_trims_sku_and_starts_active() {
        let product = Product::create(create_cmd("  WID-1 ", 1299)).unwrap();
        assert_eq!(product.sku(), "WID-1");
        assert!(product.is_active());
        assert_eq!(product.base_price(), Money::from_minor(1299));
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn empty_sku_is_rejected() {
        let err = Product::create(create_cmd("   ", 100)).unwrap_err();
        assert_eq!(err, DomainError::validation("sku cannot be empty"));
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(Product::create(create_cmd("WID-1", -1)).is_err());

        let mut cmd = create_cmd("WID-2", 100);
        cmd.pricing.b2b_price = Some(Money::from_minor(-5));
        assert!(Product::create(cmd).is_err());
    }

    #[test]
    fn inactive_products_cannot_be_sold() {
        let product = Product::create(create_cmd("WID-1", 100)).unwrap();
        assert!(product.ensure_sellable().is_ok());

        let retired = Product::restore(
            product.id_typed(),
            product.sku().to_string(),
            product.name().to_string(),
            product.pricing().clone(),
            false,
            product.created_at(),
            product.version(),
        );
        assert!(matches!(retired.ensure_sellable(), Err(DomainError::Validation(_))));
    }
}
