//! Core types for the catalog.

use crate::error::CatalogError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Store-assigned product identifier.
///
/// Twelve bytes rendered as 24 hex characters: four bytes of big-endian
/// creation seconds followed by the eight-byte big-endian store counter.
/// The counter never repeats within a store's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductId([u8; 12]);

impl ProductId {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 24;

    pub fn new(created_secs: u32, counter: u64) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&created_secs.to_be_bytes());
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        ProductId(bytes)
    }

    /// Store counter component.
    pub fn counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.0[4..]);
        u64::from_be_bytes(counter)
    }

    /// Creation time component, seconds since the Unix epoch.
    pub fn created_secs(&self) -> u32 {
        let mut secs = [0u8; 4];
        secs.copy_from_slice(&self.0[..4]);
        u32::from_be_bytes(secs)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a well-formed identifier: exactly 24 ASCII hex digits.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CatalogError::InvalidIdentifier(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| CatalogError::InvalidIdentifier(s.to_string()))?;
        Ok(ProductId(bytes))
    }

    /// Whether `s` is well-formed for this identifier scheme.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }
}

impl FromStr for ProductId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductId({})", self.to_hex())
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ProductId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProductId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Store-wide commit position. Advances by one per successful mutation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Seconds since the Unix epoch, saturating into `u32`.
pub(crate) fn unix_secs() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// A product as stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    #[serde(rename = "type")]
    pub category: String,
    pub rating: f64,
    pub warranty_years: u32,
    pub available: bool,
    /// Per-record revision: 1 on insert, +1 per update.
    pub revision: u64,
}

impl Product {
    /// Keep only the projected fields. Identifier and revision always survive.
    pub fn project(&self, projection: &Projection) -> ProductView {
        ProductView {
            id: self.id,
            revision: self.revision,
            name: projection
                .contains(Field::Name)
                .then(|| self.name.clone()),
            price: projection.contains(Field::Price).then_some(self.price),
            category: projection
                .contains(Field::Category)
                .then(|| self.category.clone()),
            rating: projection.contains(Field::Rating).then_some(self.rating),
            warranty_years: projection
                .contains(Field::WarrantyYears)
                .then_some(self.warranty_years),
            available: projection
                .contains(Field::Available)
                .then_some(self.available),
        }
    }
}

/// Unvalidated field set as received from a client.
///
/// Used for both creation (all required fields must be present) and partial
/// updates (any subset).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warranty_years: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Validated input for an insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub category: String,
    pub rating: f64,
    pub warranty_years: u32,
    /// Left to the store default when absent.
    pub available: Option<bool>,
}

/// Validated partial update. Absent fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub warranty_years: Option<u32>,
    pub available: Option<bool>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.rating.is_none()
            && self.warranty_years.is_none()
            && self.available.is_none()
    }

    /// Merge into `product`. Does not touch identifier or revision.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(ref name) = self.name {
            product.name = name.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(ref category) = self.category {
            product.category = category.clone();
        }
        if let Some(rating) = self.rating {
            product.rating = rating;
        }
        if let Some(warranty_years) = self.warranty_years {
            product.warranty_years = warranty_years;
        }
        if let Some(available) = self.available {
            product.available = available;
        }
    }
}

/// Product fields that can be projected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Price,
    Category,
    Rating,
    WarrantyYears,
    Available,
}

impl Field {
    const fn bit(self) -> u8 {
        match self {
            Field::Name => 1 << 0,
            Field::Price => 1 << 1,
            Field::Category => 1 << 2,
            Field::Rating => 1 << 3,
            Field::WarrantyYears => 1 << 4,
            Field::Available => 1 << 5,
        }
    }
}

/// Subset of fields returned by a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Projection(u8);

impl Projection {
    /// Projection used by the catalog listing.
    pub const LISTING: Projection = Projection::all();

    pub const fn all() -> Self {
        Projection(0b0011_1111)
    }

    /// Identifier and revision only.
    pub const fn none() -> Self {
        Projection(0)
    }

    pub fn only(fields: &[Field]) -> Self {
        Projection(fields.iter().fold(0, |acc, f| acc | f.bit()))
    }

    pub fn with(self, field: Field) -> Self {
        Projection(self.0 | field.bit())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0 & field.bit() != 0
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::all()
    }
}

/// A product restricted to a projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warranty_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        product.project(&Projection::all())
    }
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        ProductView::from(&product)
    }
}

/// Result of a successful insert or update.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    /// Store sequence assigned to this change.
    pub sequence: Sequence,
    /// The record as read back from the store after the change.
    pub product: Product,
}

/// Full enumeration of the store at one sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last sequence reflected in `records`.
    pub as_of: Sequence,
    pub records: Vec<ProductView>,
}
