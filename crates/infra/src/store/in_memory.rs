use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use pricefeed_core::ProductId;
use pricefeed_products::{ListQuery, Product};

use super::r#trait::{InsertOutcome, PriceSwap, ProductStore, StoreError};

#[derive(Debug, Default)]
struct Catalog {
    by_id: HashMap<ProductId, Product>,
    by_name: HashMap<String, ProductId>,
}

/// In-memory product store.
///
/// Intended for tests/dev. Every write holds the lock for the whole
/// check-and-write, which gives the same atomicity as the Postgres statements.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    catalog: RwLock<Catalog>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product as-is (test/dev seeding). Any product
    /// already holding the same id or name is removed first.
    pub fn seed(&self, product: Product) -> Result<(), StoreError> {
        let mut catalog = self.write()?;
        if let Some(previous) = catalog.by_id.remove(&product.id_typed()) {
            catalog.by_name.remove(previous.name());
        }
        if let Some(holder) = catalog.by_name.remove(product.name()) {
            catalog.by_id.remove(&holder);
        }
        catalog
            .by_name
            .insert(product.name().to_string(), product.id_typed());
        catalog.by_id.insert(product.id_typed(), product);
        Ok(())
    }

    pub fn get(&self, id: ProductId) -> Option<Product> {
        self.catalog.read().ok()?.by_id.get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Product> {
        let catalog = self.catalog.read().ok()?;
        let id = catalog.by_name.get(name)?;
        catalog.by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.catalog.read().map(|c| c.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Catalog>, StoreError> {
        self.catalog
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Catalog>, StoreError> {
        self.catalog
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let catalog = self.read()?;
        Ok(catalog
            .by_name
            .get(name)
            .and_then(|id| catalog.by_id.get(id))
            .cloned())
    }

    async fn insert_if_absent(&self, product: Product) -> Result<InsertOutcome, StoreError> {
        let mut catalog = self.write()?;
        if let Some(existing) = catalog
            .by_name
            .get(product.name())
            .and_then(|id| catalog.by_id.get(id))
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        if catalog.by_id.contains_key(&product.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "product id {} already taken",
                product.id_typed()
            )));
        }

        catalog
            .by_name
            .insert(product.name().to_string(), product.id_typed());
        catalog.by_id.insert(product.id_typed(), product.clone());
        Ok(InsertOutcome::Inserted(product))
    }

    async fn swap_price(
        &self,
        id: ProductId,
        expected: f64,
        new_price: f64,
        at: DateTime<Utc>,
    ) -> Result<PriceSwap, StoreError> {
        let mut catalog = self.write()?;
        let Some(product) = catalog.by_id.get_mut(&id) else {
            return Ok(PriceSwap::Missing);
        };
        if !product.has_price(expected) {
            return Ok(PriceSwap::Stale(product.price()));
        }
        product
            .reprice(new_price, at)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        Ok(PriceSwap::Swapped(product.clone()))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Product>, StoreError> {
        let catalog = self.read()?;
        let mut items: Vec<Product> = catalog.by_id.values().cloned().collect();
        drop(catalog);

        items.sort_by(|a, b| query.compare(a, b));
        let skip = usize::try_from(query.skip()).unwrap_or(usize::MAX);
        Ok(items
            .into_iter()
            .skip(skip)
            .take(query.limit() as usize)
            .collect())
    }
}
