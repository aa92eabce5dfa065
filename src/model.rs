use serde::{Deserialize, Serialize};

/// Normalizes a user-supplied number before it enters the invoice.
/// NaN and infinities are stored as zero; negative values pass through.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// One row of the invoice: a quantity of a described good or service
/// at a unit price.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LineItem {
    pub id: u64,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl LineItem {
    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// One line-item field, replaced whole on update.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemField {
    Description(String),
    Quantity(f64),
    UnitPrice(f64),
}

/// The whole editing session: ordered line items plus the scalar form
/// fields. Lives only in memory; discarded when the session ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invoice {
    items: Vec<LineItem>,
    pub client_name: String,
    pub company_name: String,
    pub address: String,
    pub notes: String,
    tax_rate: f64,
    adjustment: f64,
    // Session-local monotonic counter; ids are never reused.
    next_item_id: u64,
}

impl Invoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in insertion order, which is also display order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Appends an empty item and returns its id.
    pub fn add_item(&mut self) -> u64 {
        self.next_item_id += 1;
        let id = self.next_item_id;
        self.items.push(LineItem {
            id,
            description: String::new(),
            quantity: 0.0,
            unit_price: 0.0,
        });
        id
    }

    /// Removes the item with the given id. Unknown ids are a no-op;
    /// remaining items keep their positions.
    pub fn remove_item(&mut self, id: u64) {
        self.items.retain(|item| item.id != id);
    }

    /// Replaces one field on the item with the given id. Unknown ids
    /// are a no-op. Numeric fields are sanitized before storage.
    pub fn update_item(&mut self, id: u64, field: ItemField) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            match field {
                ItemField::Description(text) => item.description = text,
                ItemField::Quantity(quantity) => item.quantity = sanitize(quantity),
                ItemField::UnitPrice(price) => item.unit_price = sanitize(price),
            }
        }
    }

    /// Tax rate as a percentage, e.g. 8.875 for 8.875%.
    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn set_tax_rate(&mut self, rate: f64) {
        self.tax_rate = sanitize(rate);
    }

    /// Flat amount subtracted from the post-tax total.
    pub fn adjustment(&self) -> f64 {
        self.adjustment
    }

    pub fn set_adjustment(&mut self, amount: f64) {
        self.adjustment = sanitize(amount);
    }

    /// Sum of quantity times unit price over all items. Recomputed on
    /// every read; nothing is cached or rounded here. Two-decimal
    /// rounding happens only at display time.
    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(LineItem::amount).sum()
    }

    pub fn tax_amount(&self) -> f64 {
        self.subtotal() * self.tax_rate / 100.0
    }

    /// Subtotal plus tax minus adjustment. May go negative when the
    /// adjustment exceeds subtotal plus tax; not clamped.
    pub fn total(&self) -> f64 {
        self.subtotal() + self.tax_amount() - self.adjustment
    }
}
