use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricefeed_core::{DomainError, DomainResult, ProductId};

/// A catalog product.
///
/// Invariants:
/// - `id` is assigned once by [`Product::create`] and never changes.
/// - `price_update_count` starts at 0 and grows by exactly one per
///   [`Product::reprice`].
/// - `updated_at` is set at creation and refreshed on every reprice.
///
/// `name` is the lookup key; uniqueness is enforced by the store, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: ProductId,
    name: String,
    price: f64,
    updated_at: DateTime<Utc>,
    price_update_count: u32,
}

impl Product {
    /// Create a brand-new product with a fresh identifier.
    pub fn create(name: impl Into<String>, price: f64, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_finite(price)?;
        Ok(Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            updated_at: at,
            price_update_count: 0,
        })
    }

    /// Rebuild a product from persisted state (no invariant checks beyond the
    /// ones storage already enforced).
    pub fn restore(
        id: ProductId,
        name: String,
        price: f64,
        updated_at: DateTime<Utc>,
        price_update_count: u32,
    ) -> Self {
        Self {
            id,
            name,
            price,
            updated_at,
            price_update_count,
        }
    }

    /// Apply a price change: new price, refreshed timestamp, counter + 1.
    pub fn reprice(&mut self, new_price: f64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_finite(new_price)?;
        self.price_update_count = self
            .price_update_count
            .checked_add(1)
            .ok_or_else(|| DomainError::conflict("price update counter exhausted"))?;
        self.price = new_price;
        self.updated_at = at;
        Ok(())
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn price_update_count(&self) -> u32 {
        self.price_update_count
    }

    /// Exact price comparison; no tolerance is applied.
    pub fn has_price(&self, price: f64) -> bool {
        self.price == price
    }
}

fn ensure_finite(price: f64) -> DomainResult<()> {
    if price.is_finite() {
        Ok(())
    } else {
        Err(DomainError::validation(format!("price must be finite, got {price}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn create_starts_with_zero_updates() {
        let now = Utc::now();
        let p = Product::create("Gadget", 5.50, now).unwrap();
        assert_eq!(p.name(), "Gadget");
        assert_eq!(p.price(), 5.50);
        assert_eq!(p.price_update_count(), 0);
        assert_eq!(p.updated_at(), now);
    }

    #[test]
    fn create_rejects_non_finite_price() {
        assert!(Product::create("x", f64::NAN, Utc::now()).is_err());
        assert!(Product::create("x", f64::INFINITY, Utc::now()).is_err());
    }

    #[test]
    fn reprice_bumps_counter_and_keeps_identity() {
        let t0 = Utc::now();
        let mut p = Product::restore(ProductId::new(), "Widget".into(), 9.0, t0, 3);
        let id = p.id_typed();

        let t1 = t0 + Duration::seconds(1);
        p.reprice(10.0, t1).unwrap();

        assert_eq!(p.id_typed(), id);
        assert_eq!(p.price(), 10.0);
        assert_eq!(p.price_update_count(), 4);
        assert_eq!(p.updated_at(), t1);
    }

    #[test]
    fn reprice_refuses_to_wrap_counter() {
        let mut p = Product::restore(ProductId::new(), "w".into(), 1.0, Utc::now(), u32::MAX);
        let err = p.reprice(2.0, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(p.price(), 1.0);
    }

    #[test]
    fn json_shape_uses_external_field_names() {
        let p = Product::create("Widget", 1.25, Utc::now()).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["id", "name", "price", "updatedAt", "priceUpdateCount"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 5);
    }
}
