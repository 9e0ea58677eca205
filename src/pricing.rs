//! Quote pricing for removal jobs.
//!
//! Formula: `price = vehicle_base + distance_miles * PER_MILE_RATE + total_volume * PER_CUBIC_METRE_RATE`,
//! rounded to the nearest whole pound.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::job::VehicleType;

/// Per-mile rate in pounds.
pub const PER_MILE_RATE: f64 = 1.5;

/// Per-cubic-metre rate in pounds.
pub const PER_CUBIC_METRE_RATE: f64 = 20.0;

/// Share of the customer price paid out to the driver.
pub const DRIVER_SHARE: f64 = 0.7;

impl VehicleType {
    /// Fixed call-out fee for the vehicle tier.
    pub fn base_fee(&self) -> f64 {
        match self {
            VehicleType::LutonVan => 60.0,
            VehicleType::SmallVan | VehicleType::LargeVan => 40.0,
        }
    }
}

/// Coarse size bucket an operator picks for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSize {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl ItemSize {
    /// Volume in m³ for one unit of this size.
    pub fn volume(&self) -> f64 {
        match self {
            ItemSize::Small => 0.25,
            ItemSize::Medium => 0.5,
            ItemSize::Large => 1.0,
            ItemSize::ExtraLarge => 2.0,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ItemSize::Small => "Sm",
            ItemSize::Medium => "Med",
            ItemSize::Large => "Lg",
            ItemSize::ExtraLarge => "XL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub size: ItemSize,
}

impl JobItem {
    pub fn new(name: impl Into<String>, quantity: u32, size: ItemSize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            quantity,
            size,
        }
    }

    pub fn volume(&self) -> f64 {
        self.quantity as f64 * self.size.volume()
    }

    /// Summary stored on the job record, e.g. `2x Sofa (Lg)`
    pub fn label(&self) -> String {
        format!("{}x {} ({})", self.quantity, self.name, self.size.label())
    }
}

pub fn total_volume(items: &[JobItem]) -> f64 {
    items.iter().map(JobItem::volume).sum()
}

/// Compute the automatic quote in whole pounds.
pub fn quote_price(vehicle: VehicleType, distance_miles: f64, items: &[JobItem]) -> f64 {
    (vehicle.base_fee() + distance_miles * PER_MILE_RATE + total_volume(items) * PER_CUBIC_METRE_RATE)
        .round()
}

/// Driver payout for a given customer price.
pub fn driver_price(customer_price: f64) -> f64 {
    (customer_price * DRIVER_SHARE).round()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub auto_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<PriceOverride>,
}

impl PriceQuote {
    pub fn new(vehicle: VehicleType, distance_miles: f64, items: &[JobItem]) -> Self {
        Self {
            auto_price: quote_price(vehicle, distance_miles, items),
            manual_override: None,
        }
    }

    /// The override replaces the computed price as-is; no bounds are enforced.
    pub fn with_override(mut self, amount: f64, reason: impl Into<String>) -> Self {
        self.manual_override = Some(PriceOverride {
            amount,
            reason: reason.into(),
        });
        self
    }

    pub fn customer_price(&self) -> f64 {
        self.manual_override
            .as_ref()
            .map(|o| o.amount)
            .unwrap_or(self.auto_price)
    }

    pub fn driver_price(&self) -> f64 {
        driver_price(self.customer_price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_cubic_metre() -> Vec<JobItem> {
        vec![JobItem::new("Wardrobe", 1, ItemSize::Large)]
    }

    #[test]
    fn test_large_van_twelve_miles() {
        let price = quote_price(VehicleType::LargeVan, 12.0, &one_cubic_metre());
        assert_eq!(price, 78.0);
    }

    #[test]
    fn test_luton_van_has_higher_base() {
        let items = one_cubic_metre();
        let large = quote_price(VehicleType::LargeVan, 12.0, &items);
        let luton = quote_price(VehicleType::LutonVan, 12.0, &items);
        assert_eq!(luton - large, 20.0);
        assert_eq!(
            quote_price(VehicleType::SmallVan, 12.0, &items),
            quote_price(VehicleType::LargeVan, 12.0, &items)
        );
    }

    #[test]
    fn test_price_rounds_to_whole_pounds() {
        // 40 + 0.3 * 1.5 = 40.45
        assert_eq!(quote_price(VehicleType::SmallVan, 0.3, &[]), 40.0);
        // 40 + 0.5 * 1.5 = 40.75
        assert_eq!(quote_price(VehicleType::SmallVan, 0.5, &[]), 41.0);
    }

    #[test]
    fn test_price_monotonic_in_distance_and_volume() {
        for vehicle in [VehicleType::SmallVan, VehicleType::LargeVan, VehicleType::LutonVan] {
            let mut last = f64::MIN;
            for step in 0..200 {
                let price = quote_price(vehicle, step as f64 * 0.37, &one_cubic_metre());
                assert!(price >= last);
                last = price;
            }

            let mut last = f64::MIN;
            for qty in 0..30 {
                let items = vec![JobItem::new("Box", qty, ItemSize::Small)];
                let price = quote_price(vehicle, 5.0, &items);
                assert!(price >= last);
                last = price;
            }
        }
    }

    #[test]
    fn test_total_volume_weights_quantity() {
        let items = vec![
            JobItem::new("Box", 4, ItemSize::Small),
            JobItem::new("Sofa", 1, ItemSize::ExtraLarge),
        ];
        assert_eq!(total_volume(&items), 3.0);
    }

    #[test]
    fn test_override_replaces_auto_price() {
        let quote = PriceQuote::new(VehicleType::LargeVan, 12.0, &one_cubic_metre())
            .with_override(999.99, "VIP");
        assert_eq!(quote.auto_price, 78.0);
        assert_eq!(quote.customer_price(), 999.99);
        assert_eq!(quote.driver_price(), 700.0);
    }

    #[test]
    fn test_driver_share_is_seventy_percent_rounded() {
        for price in [0.0, 1.0, 78.0, 99.5, 123.45, 999.99, 10_000.0] {
            assert_eq!(driver_price(price), (price * 0.7).round());
        }
        assert_eq!(driver_price(78.0), 55.0);
    }

    #[test]
    fn test_item_label() {
        let item = JobItem::new("Sofa", 2, ItemSize::Large);
        assert_eq!(item.label(), "2x Sofa (Lg)");
    }
}
