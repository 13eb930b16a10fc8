use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::product::{Product, ProductId};
use crate::errors::CatalogError;

#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Product>, CatalogError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, id: &ProductId) -> Result<Product, CatalogError>;
}

/// Candidate list for a product picker. Search failures surface as an empty
/// list.
pub async fn search_or_empty<S>(search: &S, query: &str, limit: usize) -> Vec<Product>
where
    S: ProductSearch + ?Sized,
{
    match search.search(query, limit).await {
        Ok(products) => products,
        Err(error) => {
            tracing::warn!(
                event_name = "catalog.search.failed",
                query,
                error = %error,
                "product search failed; returning no candidates"
            );
            Vec::new()
        }
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: RwLock::new(products) }
    }

    pub async fn upsert(&self, product: Product) {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|existing| existing.id == product.id) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
    }
}

#[async_trait]
impl ProductSearch for InMemoryCatalog {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Product>, CatalogError> {
        let needle = query.trim().to_lowercase();
        let products = self.products.read().await;

        Ok(products
            .iter()
            .filter(|product| {
                needle.is_empty()
                    || product.name.to_lowercase().contains(&needle)
                    || product.code.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get(&self, id: &ProductId) -> Result<Product, CatalogError> {
        let products = self.products.read().await;
        products
            .iter()
            .find(|product| &product.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::{search_or_empty, InMemoryCatalog, ProductCatalog, ProductSearch};
    use crate::domain::product::{Product, ProductId};
    use crate::domain::unit::UnitCode;
    use crate::errors::CatalogError;

    fn product(id: &str, code: &str, name: &str) -> Product {
        Product {
            id: ProductId(id.to_string()),
            code: code.to_string(),
            name: name.to_string(),
            unit: UnitCode::Kilogram,
            vat_rate: dec!(20),
            price: Some(dec!(75)),
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            product("1", "FRT-ROAD", "Road freight"),
            product("2", "FRT-SEA", "Sea freight"),
            product("3", "INS", "Cargo insurance"),
        ])
    }

    #[tokio::test]
    async fn search_matches_name_or_code_case_insensitively() {
        let catalog = catalog();

        let by_name = catalog.search("FREIGHT", 10).await.expect("search");
        assert_eq!(by_name.len(), 2);

        let by_code = catalog.search("ins", 10).await.expect("search");
        assert_eq!(by_code[0].id, ProductId("3".to_string()));
    }

    #[tokio::test]
    async fn search_respects_limit_and_order() {
        let found = catalog().search("", 2).await.expect("search");
        let ids: Vec<_> = found.iter().map(|product| product.id.0.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn get_reports_missing_product() {
        let error = catalog().get(&ProductId("99".to_string())).await.expect_err("missing");
        assert_eq!(error, CatalogError::NotFound(ProductId("99".to_string())));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_entry() {
        let catalog = catalog();
        catalog.upsert(product("2", "FRT-SEA", "Sea freight (LCL)")).await;

        let updated = catalog.get(&ProductId("2".to_string())).await.expect("get");
        assert_eq!(updated.name, "Sea freight (LCL)");
        assert_eq!(catalog.search("", 10).await.expect("search").len(), 3);
    }

    #[tokio::test]
    async fn failed_search_yields_no_candidates() {
        struct Offline;

        #[async_trait]
        impl ProductSearch for Offline {
            async fn search(
                &self,
                _query: &str,
                _limit: usize,
            ) -> Result<Vec<Product>, CatalogError> {
                Err(CatalogError::Unavailable("timeout".to_string()))
            }
        }

        assert!(search_or_empty(&Offline, "road", 10).await.is_empty());
        assert_eq!(search_or_empty(&catalog(), "road", 10).await.len(), 1);
    }
}
