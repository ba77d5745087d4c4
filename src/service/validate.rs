//! Input validation. Nothing here touches the store.

use crate::error::{CatalogError, Result};
use crate::types::{NewProduct, ProductDraft, ProductPatch};

/// Highest rating a product can hold.
pub const MAX_RATING: f64 = 5.0;

/// Lowest rating a product can hold.
pub const MIN_RATING: f64 = 0.0;

/// Turn a draft into a complete insert, rejecting missing or malformed fields.
pub fn validate_new(draft: ProductDraft) -> Result<NewProduct> {
    let name = draft.name.ok_or_else(|| missing("name"))?;
    let price = draft.price.ok_or_else(|| missing("price"))?;
    let category = draft.category.ok_or_else(|| missing("type"))?;
    let rating = draft.rating.ok_or_else(|| missing("rating"))?;
    let warranty_years = draft.warranty_years.ok_or_else(|| missing("warranty_years"))?;

    Ok(NewProduct {
        name: check_name(name)?,
        price: check_price(price)?,
        category,
        rating: clamp_rating(rating)?,
        warranty_years: check_warranty(warranty_years)?,
        available: draft.available,
    })
}

/// Turn a draft into a partial update. At least one field must be present.
pub fn validate_patch(draft: ProductDraft) -> Result<ProductPatch> {
    let patch = ProductPatch {
        name: draft.name.map(check_name).transpose()?,
        price: draft.price.map(check_price).transpose()?,
        category: draft.category,
        rating: draft.rating.map(clamp_rating).transpose()?,
        warranty_years: draft.warranty_years.map(check_warranty).transpose()?,
        available: draft.available,
    };

    if patch.is_empty() {
        return Err(CatalogError::Validation("update has no fields".into()));
    }
    Ok(patch)
}

/// Clamp a rating into `[0, 5]`. Only non-finite input is an error.
pub fn clamp_rating(rating: f64) -> Result<f64> {
    if !rating.is_finite() {
        return Err(CatalogError::Validation(format!("rating must be a number, got {}", rating)));
    }
    Ok(rating.clamp(MIN_RATING, MAX_RATING))
}

fn check_name(name: String) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation("name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn check_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::Validation(format!(
            "price must be a non-negative number, got {}",
            price
        )));
    }
    Ok(price)
}

fn check_warranty(years: i64) -> Result<u32> {
    u32::try_from(years).map_err(|_| {
        CatalogError::Validation(format!(
            "warranty_years must be a non-negative integer, got {}",
            years
        ))
    })
}

fn missing(field: &str) -> CatalogError {
    CatalogError::Validation(format!("missing required field: {}", field))
}
