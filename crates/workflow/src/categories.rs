//! Category administration and browsing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{CategoryId, Page, PageRequest};
use domain::{Category, CategoryDraft, CategoryPatch, Product};
use serde::Serialize;
use store::{ProductQuery, ProductSort, Store};

use crate::error::{Result, WorkflowError};

/// Name and slug of a subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
}

/// A category with its direct subcategories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: Category,
    pub subcategories: Vec<CategoryRef>,
}

/// A category and one page of its active products.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryProducts {
    pub category: Category,
    pub products: Page<Product>,
}

fn with_children(category: Category, all: &[Category]) -> CategoryDetail {
    let subcategories = all
        .iter()
        .filter(|c| c.parent_id == Some(category.id))
        .map(|c| CategoryRef {
            id: c.id,
            name: c.name.clone(),
            slug: c.slug.clone(),
        })
        .collect();
    CategoryDetail {
        category,
        subcategories,
    }
}

/// Category operations.
#[derive(Clone)]
pub struct CategoryService {
    store: Arc<dyn Store>,
}

impl CategoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Categories in listing order. The public listing hides inactive ones.
    pub async fn list_categories(&self, active_only: bool) -> Result<Vec<CategoryDetail>> {
        let all = self.store.list_categories(active_only).await?;
        Ok(all
            .iter()
            .cloned()
            .map(|c| with_children(c, &all))
            .collect())
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<CategoryDetail> {
        let category = self
            .store
            .get_category(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("category", id))?;
        let all = self.store.list_categories(false).await?;
        Ok(with_children(category, &all))
    }

    /// Active products filed under `slug`.
    pub async fn category_products(
        &self,
        slug: &str,
        sort: ProductSort,
        page: PageRequest,
    ) -> Result<CategoryProducts> {
        let category = self
            .store
            .find_category_by_slug(slug)
            .await?
            .ok_or_else(|| WorkflowError::not_found("category", slug))?;

        let query = ProductQuery::storefront()
            .category(category.slug.clone())
            .sort(sort)
            .page(page);
        let (items, total) = self.store.list_products(&query).await?;
        Ok(CategoryProducts {
            category,
            products: Page::new(items, page, total),
        })
    }

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_category(&self, draft: CategoryDraft) -> Result<CategoryDetail> {
        draft.validate()?;
        if let Some(parent_id) = draft.parent_id {
            self.require_parent(parent_id).await?;
        }

        let category = self
            .store
            .insert_category(draft.into_category(Utc::now()))
            .await?;
        tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
        Ok(with_children(category, &[]))
    }

    /// Renaming also renames the slug and moves the category's products.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<CategoryDetail> {
        patch.validate()?;
        let all = self.store.list_categories(false).await?;
        let mut category = all
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("category", id))?;

        if let Some(parent_id) = patch.parent_id {
            check_parent(id, parent_id, &all)?;
        }

        let previous_slug = category.slug.clone();
        patch.apply(&mut category, Utc::now());
        let category = self.store.update_category(category).await?;
        if category.slug != previous_slug {
            tracing::info!(
                category_id = %id,
                from = %previous_slug,
                to = %category.slug,
                "category renamed"
            );
        }
        Ok(with_children(category, &all))
    }

    /// Refused while products are filed under the category.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.store.delete_category(id).await?;
        tracing::info!(category_id = %id, "category deleted");
        Ok(())
    }

    async fn require_parent(&self, parent_id: CategoryId) -> Result<()> {
        match self.store.get_category(parent_id).await? {
            Some(_) => Ok(()),
            None => Err(WorkflowError::invalid("parent_id", "category does not exist")),
        }
    }
}

/// A parent must exist and must not be the category itself or one of its
/// descendants.
fn check_parent(id: CategoryId, parent_id: CategoryId, all: &[Category]) -> Result<()> {
    let parents: HashMap<CategoryId, Option<CategoryId>> =
        all.iter().map(|c| (c.id, c.parent_id)).collect();
    if !parents.contains_key(&parent_id) {
        return Err(WorkflowError::invalid("parent_id", "category does not exist"));
    }

    let mut cursor = Some(parent_id);
    while let Some(current) = cursor {
        if current == id {
            return Err(WorkflowError::invalid(
                "parent_id",
                "cannot be the category or one of its subcategories",
            ));
        }
        cursor = parents.get(&current).copied().flatten();
    }
    Ok(())
}
