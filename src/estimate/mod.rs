//! Line-item assembly for a bid estimate.
//!
//! The assembler owns the editable, ordered list of [`LineItem`]s for one
//! estimate in progress. Controller-suggested items and manual entries are
//! merged here; the running total is always derived, never cached.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default wall pricing, dollars per square foot of wall area.
pub const DEFAULT_RATE_PER_SQ_FT: f64 = 2.50;

/// Synthetic key for the recomputable wall-area line.
pub const WALL_AREA_KEY: &str = "wall-area";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("description cannot be empty")]
    EmptyDescription,
    #[error("unit price is not a valid number: {input}")]
    InvalidUnitPrice { input: String },
    #[error("unit price cannot be negative")]
    NegativeUnitPrice,
    #[error("quantity must be positive")]
    NonPositiveQuantity,
}

/// A single priced entry on an estimate. The total is always
/// `quantity * unit_price`; it is never stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        quantity: f64,
        unit_price: f64,
    ) -> Result<Self, ValidationError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ValidationError::NonPositiveQuantity);
        }
        if !unit_price.is_finite() || unit_price < 0.0 {
            return Err(ValidationError::NegativeUnitPrice);
        }
        Ok(Self {
            description,
            quantity,
            unit_price,
        })
    }

    pub fn total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Interior room dimensions in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl RoomDimensions {
    pub fn perimeter(&self) -> f64 {
        2.0 * (self.length + self.width)
    }

    /// Paintable wall area: perimeter times wall height.
    pub fn wall_area(&self) -> f64 {
        self.perimeter() * self.height
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: Option<String>,
    item: LineItem,
}

/// Editable list of line items with a derived total.
#[derive(Debug, Default)]
pub struct EstimateAssembler {
    entries: Vec<Entry>,
}

impl EstimateAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends controller-suggested items as-is. Items whose description
    /// matches an existing entry are still appended, never merged.
    pub fn add_suggested(&mut self, items: Vec<LineItem>) {
        self.entries
            .extend(items.into_iter().map(|item| Entry { key: None, item }));
    }

    /// Validates and appends a manually entered item with quantity 1.
    pub fn add_manual(
        &mut self,
        description: &str,
        unit_price: &str,
    ) -> Result<LineItem, ValidationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        let parsed: f64 =
            unit_price
                .trim()
                .parse()
                .map_err(|_| ValidationError::InvalidUnitPrice {
                    input: unit_price.to_string(),
                })?;
        if !parsed.is_finite() {
            return Err(ValidationError::InvalidUnitPrice {
                input: unit_price.to_string(),
            });
        }
        if parsed < 0.0 {
            return Err(ValidationError::NegativeUnitPrice);
        }

        let item = LineItem {
            description: description.to_string(),
            quantity: 1.0,
            unit_price: parsed,
        };
        self.entries.push(Entry {
            key: None,
            item: item.clone(),
        });
        Ok(item)
    }

    /// Replaces the entry carrying `key` in place, or appends if absent.
    /// The resulting list never holds two entries with the same key.
    pub fn replace_computed_item(&mut self, key: &str, item: LineItem) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.key.as_deref() == Some(key))
        {
            Some(entry) => entry.item = item,
            None => self.entries.push(Entry {
                key: Some(key.to_string()),
                item,
            }),
        }
    }

    /// Builds the wall-area line from room dimensions at the given rate.
    pub fn wall_area_item(dims: RoomDimensions, rate: f64) -> LineItem {
        let area = dims.wall_area();
        LineItem {
            description: format!("Wall Painting ({area:.0} sq ft)"),
            quantity: area,
            unit_price: rate,
        }
    }

    /// Recomputes the wall-area line and swaps it in under its stable key.
    pub fn set_wall_area(&mut self, dims: RoomDimensions, rate: f64) {
        self.replace_computed_item(WALL_AREA_KEY, Self::wall_area_item(dims, rate));
    }

    pub fn remove(&mut self, index: usize) -> Option<LineItem> {
        if index < self.entries.len() {
            Some(self.entries.remove(index).item)
        } else {
            None
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.entries.iter().map(|entry| &entry.item)
    }

    pub fn to_items(&self) -> Vec<LineItem> {
        self.items().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry totals, recomputed on every call.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|entry| entry.item.total()).sum()
    }
}
