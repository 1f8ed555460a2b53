//! Product catalog administration and browsing.

use std::sync::Arc;

use chrono::Utc;
use common::{Page, PageRequest, ProductId, UserId};
use domain::{
    Product, ProductDraft, ProductImage, ProductPatch, ReferenceType, StockAdjustment, StockChange,
};
use store::{ProductQuery, Store};

use crate::error::{Result, WorkflowError};
use crate::services::AssetStore;

/// Largest image accepted for upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// An image upload as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
    pub alt: Option<String>,
}

impl ImageUpload {
    fn validate(&self) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(WorkflowError::invalid("image", "is empty"));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(WorkflowError::invalid("image", "cannot exceed 5 MB"));
        }
        if !self.content_type.starts_with("image/") {
            return Err(WorkflowError::invalid("image", "only image files are allowed"));
        }
        Ok(())
    }
}

/// Catalog operations.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    assets: Arc<dyn AssetStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, assets: Arc<dyn AssetStore>) -> Self {
        Self { store, assets }
    }

    /// Lists products matching `query`, one page at a time.
    pub async fn list_products(
        &self,
        query: ProductQuery,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        let (items, total) = self.store.list_products(&query.page(page)).await?;
        Ok(Page::new(items, page, total))
    }

    /// Newest active featured products.
    pub async fn featured_products(&self, limit: u32) -> Result<Vec<Product>> {
        let query = ProductQuery::storefront()
            .featured_only(true)
            .page(PageRequest::new(1, limit));
        let (items, _) = self.store.list_products(&query).await?;
        Ok(items)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("product", id))
    }

    /// Creates a product. Opening stock is recorded as a restock.
    #[tracing::instrument(skip(self, draft), fields(sku = %draft.sku))]
    pub async fn create_product(
        &self,
        draft: ProductDraft,
        performed_by: Option<UserId>,
    ) -> Result<Product> {
        draft.validate()?;
        let opening = draft.stock;
        let product = draft.into_product(Utc::now());

        let opening_stock = (opening > 0).then(|| {
            StockChange::new(StockAdjustment::In(opening), "Initial stock")
                .reference(ReferenceType::Restock, product.id.to_string())
                .performed_by(performed_by)
        });

        let product = self.store.insert_product(product, opening_stock).await?;
        metrics::counter!("products_created_total").increment(1);
        tracing::info!(product_id = %product.id, stock = product.stock, "product created");
        Ok(product)
    }

    /// Updates every field except stock.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;
        let mut product = self.get_product(id).await?;
        patch.apply(&mut product, Utc::now());
        Ok(self.store.update_product(product).await?)
    }

    /// Deletes a product and, best effort, its images.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        let product = self.get_product(id).await?;
        self.store.delete_product(id).await?;

        for image in &product.images {
            self.discard_asset(&image.asset_id).await;
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Uploads an image and appends it to the product.
    #[tracing::instrument(skip(self, upload), fields(filename = %upload.filename))]
    pub async fn upload_image(&self, id: ProductId, upload: ImageUpload) -> Result<Product> {
        upload.validate()?;
        let mut product = self.get_product(id).await?;

        let asset = self
            .assets
            .upload(upload.bytes, &upload.filename, &upload.content_type)
            .await?;

        product.images.push(ProductImage {
            asset_id: asset.asset_id.clone(),
            url: asset.url,
            alt: upload.alt,
        });
        product.updated_at = Utc::now();

        match self.store.update_product(product).await {
            Ok(product) => Ok(product),
            Err(e) => {
                self.discard_asset(&asset.asset_id).await;
                Err(e.into())
            }
        }
    }

    /// Detaches an image from the product and deletes it from the asset store.
    #[tracing::instrument(skip(self))]
    pub async fn remove_image(&self, id: ProductId, asset_id: &str) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        let before = product.images.len();
        product.images.retain(|img| img.asset_id != asset_id);
        if product.images.len() == before {
            return Err(WorkflowError::not_found("image", asset_id));
        }
        product.updated_at = Utc::now();

        let product = self.store.update_product(product).await?;
        self.discard_asset(asset_id).await;
        Ok(product)
    }

    /// Asset deletion never blocks catalog operations.
    async fn discard_asset(&self, asset_id: &str) {
        if let Err(e) = self.assets.delete(asset_id).await {
            tracing::warn!(asset_id, error = %e, "failed to delete asset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryAssetStore;
    use common::Money;
    use store::{InMemoryStore, InventoryLogQuery};

    fn service() -> (CatalogService, InMemoryStore, InMemoryAssetStore) {
        let store = InMemoryStore::new();
        let assets = InMemoryAssetStore::default();
        (
            CatalogService::new(Arc::new(store.clone()), Arc::new(assets.clone())),
            store,
            assets,
        )
    }

    fn draft(sku: &str, stock: u32) -> ProductDraft {
        ProductDraft {
            name: "Desk Lamp".into(),
            sku: sku.into(),
            description: String::new(),
            category: "lighting".into(),
            tags: vec![],
            price: Money::from_cents(2500),
            compare_at_price: None,
            stock,
            low_stock_threshold: None,
            is_active: None,
            is_featured: false,
        }
    }

    fn png() -> ImageUpload {
        ImageUpload {
            bytes: vec![0x89, b'P', b'N', b'G'],
            filename: "lamp.png".into(),
            content_type: "image/png".into(),
            alt: Some("Desk lamp".into()),
        }
    }

    #[tokio::test]
    async fn opening_stock_is_a_restock_entry() {
        let (catalog, store, _) = service();
        let product = catalog.create_product(draft("lamp-1", 5), None).await.unwrap();
        assert_eq!(product.sku, "LAMP-1");
        assert_eq!(product.stock, 5);

        let (logs, _) = store
            .list_inventory_logs(&InventoryLogQuery::for_product(product.id))
            .await
            .unwrap();
        assert_eq!(logs[0].reference_type, ReferenceType::Restock);
        assert_eq!(logs[0].reason, "Initial stock");
    }

    #[tokio::test]
    async fn featured_listing_skips_plain_and_inactive_products() {
        let (catalog, _, _) = service();
        let featured = catalog
            .create_product(
                ProductDraft {
                    is_featured: true,
                    ..draft("F-1", 1)
                },
                None,
            )
            .await
            .unwrap();
        catalog.create_product(draft("P-1", 1), None).await.unwrap();
        catalog
            .create_product(
                ProductDraft {
                    is_featured: true,
                    is_active: Some(false),
                    ..draft("F-2", 1)
                },
                None,
            )
            .await
            .unwrap();

        let listed = catalog.featured_products(8).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, featured.id);
    }

    #[tokio::test]
    async fn zero_opening_stock_writes_no_ledger() {
        let (catalog, store, _) = service();
        catalog.create_product(draft("lamp-1", 0), None).await.unwrap();
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let (catalog, _, _) = service();
        catalog.create_product(draft("lamp-1", 0), None).await.unwrap();
        let err = catalog
            .create_product(draft("LAMP-1", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_draft_reports_fields() {
        let (catalog, _, _) = service();
        let mut bad = draft("", 0);
        bad.price = Money::from_cents(-1);
        match catalog.create_product(bad, None).await.unwrap_err() {
            WorkflowError::ValidationFailed(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["sku", "price"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn update_leaves_stock_alone() {
        let (catalog, _, _) = service();
        let product = catalog.create_product(draft("lamp-1", 5), None).await.unwrap();
        let updated = catalog
            .update_product(
                product.id,
                ProductPatch {
                    price: Some(Money::from_cents(1999)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, Money::from_cents(1999));
        assert_eq!(updated.stock, 5);
    }

    #[tokio::test]
    async fn upload_then_remove_image() {
        let (catalog, _, assets) = service();
        let product = catalog.create_product(draft("lamp-1", 0), None).await.unwrap();

        let product = catalog.upload_image(product.id, png()).await.unwrap();
        assert_eq!(product.images.len(), 1);
        let asset_id = product.images[0].asset_id.clone();
        assert!(assets.has_asset(&asset_id));

        let product = catalog.remove_image(product.id, &asset_id).await.unwrap();
        assert!(product.images.is_empty());
        assert!(!assets.has_asset(&asset_id));
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let (catalog, _, assets) = service();
        let product = catalog.create_product(draft("lamp-1", 0), None).await.unwrap();
        let mut upload = png();
        upload.content_type = "application/pdf".into();

        let err = catalog.upload_image(product.id, upload).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationFailed(_)));
        assert_eq!(assets.asset_count(), 0);
    }

    #[tokio::test]
    async fn asset_delete_failure_does_not_block_removal() {
        let (catalog, _, assets) = service();
        let product = catalog.create_product(draft("lamp-1", 0), None).await.unwrap();
        let product = catalog.upload_image(product.id, png()).await.unwrap();
        let asset_id = product.images[0].asset_id.clone();

        assets.set_fail_on_delete(true);
        let product = catalog.remove_image(product.id, &asset_id).await.unwrap();
        assert!(product.images.is_empty());

        catalog.delete_product(product.id).await.unwrap();
        assert!(matches!(
            catalog.get_product(product.id).await,
            Err(WorkflowError::NotFound { .. })
        ));
    }
}
