//! Catalog categories.
//!
//! Products refer to a category by its slug, so renaming a category moves
//! its products along with it.

use chrono::{DateTime, Utc};
use common::CategoryId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Validator};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Derived from the name; unique.
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub is_active: bool,
    /// Listing position, lowest first.
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// URL-safe form of a name: lower-case ASCII letters, digits and single
/// dashes.
///
/// ```
/// assert_eq!(domain::slugify("  Home & Garden_Tools "), "home-garden-tools");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.trim().is_empty(), "name", "is required")
        .check(
            name.chars().count() <= MAX_NAME_LEN,
            "name",
            "cannot exceed 100 characters",
        )
        .check(
            name.trim().is_empty() || !slugify(name).is_empty(),
            "name",
            "must contain a letter or digit",
        );
}

/// Input for creating a category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub sort_order: i32,
}

impl CategoryDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut v = Validator::default();
        validate_name(&mut v, &self.name);
        v.check(
            self.description.chars().count() <= MAX_DESCRIPTION_LEN,
            "description",
            "cannot exceed 500 characters",
        )
        .finish()
    }

    pub fn into_category(self, now: DateTime<Utc>) -> Category {
        let name = self.name.trim().to_string();
        Category {
            id: CategoryId::new(),
            slug: slugify(&name),
            name,
            description: self.description,
            image: self.image,
            parent_id: self.parent_id,
            is_active: self.is_active.unwrap_or(true),
            sort_order: self.sort_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. A new name also produces a new slug.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

impl CategoryPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut v = Validator::default();
        if let Some(name) = &self.name {
            validate_name(&mut v, name);
        }
        v.check(
            self.description
                .as_ref()
                .is_none_or(|d| d.chars().count() <= MAX_DESCRIPTION_LEN),
            "description",
            "cannot exceed 500 characters",
        )
        .finish()
    }

    pub fn apply(self, category: &mut Category, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            category.name = name.trim().to_string();
            category.slug = slugify(&category.name);
        }
        if let Some(description) = self.description {
            category.description = description;
        }
        if let Some(image) = self.image {
            category.image = Some(image);
        }
        if let Some(parent_id) = self.parent_id {
            category.parent_id = Some(parent_id);
        }
        if let Some(active) = self.is_active {
            category.is_active = active;
        }
        if let Some(sort_order) = self.sort_order {
            category.sort_order = sort_order;
        }
        category.updated_at = now;
    }
}
