// Catalog records as they come back from the remote store, plus the derived
// shapes the views and the JSON API hand out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transmission {
    Manual,
    Automatic,
}

impl Transmission {
    pub const ALL: [Transmission; 2] = [Transmission::Automatic, Transmission::Manual];

    pub fn as_str(self) -> &'static str {
        match self {
            Transmission::Manual => "manual",
            Transmission::Automatic => "automatic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    // Labels shown to visitors (Indonesian, like the rest of the site)
    pub fn label(self) -> &'static str {
        match self {
            Transmission::Manual => "Manual",
            Transmission::Automatic => "Otomatis",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
    Hybrid,
}

impl FuelType {
    pub const ALL: [FuelType; 4] = [
        FuelType::Gasoline,
        FuelType::Diesel,
        FuelType::Electric,
        FuelType::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FuelType::Gasoline => "gasoline",
            FuelType::Diesel => "diesel",
            FuelType::Electric => "electric",
            FuelType::Hybrid => "hybrid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            FuelType::Gasoline => "Bensin",
            FuelType::Diesel => "Solar",
            FuelType::Electric => "Listrik",
            FuelType::Hybrid => "Hybrid",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Excellent,
    Good,
    Fair,
}

impl Condition {
    pub fn label(self) -> &'static str {
        match self {
            Condition::Excellent => "Sempurna",
            Condition::Good => "Baik",
            Condition::Fair => "Cukup Baik",
        }
    }
}

// One row of the `cars` table. Column names match the store, so no renames.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Car {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub transmission: Transmission,
    pub fuel_type: FuelType,
    pub mileage: i64,
    pub price: i64,
    pub market_price: Option<i64>,
    #[serde(default)]
    pub features: Vec<String>,
    pub description: String,
    pub vin: String,
    pub engine_size: f64,
    pub power: i32,
    pub seats: i32,
    pub doors: i32,
    pub condition: Condition,
    #[serde(default)]
    pub sold: bool,
    pub sold_at: Option<DateTime<Utc>>,
    pub title_image: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub slug: String,
}

/// Savings against the market price, only present when the market price is
/// strictly above our price.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub amount: i64,
    pub percent: i64,
}

impl Discount {
    pub fn between(price: i64, market_price: Option<i64>) -> Option<Self> {
        let market_price = market_price?;
        if market_price <= price || market_price <= 0 {
            return None;
        }
        let amount = market_price - price;
        // Whole percent, rounded half up like toFixed(0)
        let percent = (amount * 100 + market_price / 2) / market_price;
        Some(Discount { amount, percent })
    }
}

impl Car {
    pub fn title(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }

    pub fn discount(&self) -> Option<Discount> {
        Discount::between(self.price, self.market_price)
    }

    // Gallery images in display order. Cars without a gallery still show
    // their title image.
    pub fn gallery_images(&self) -> Vec<String> {
        if self.images.is_empty() {
            vec![self.title_image.clone()]
        } else {
            self.images.clone()
        }
    }
}

// One row of the `testimonials` table
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Testimonial {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_location: String,
    pub rating: u8,
    pub content: String,
    pub image: Option<String>,
    pub car_id: Option<String>,
}

impl Testimonial {
    // Ratings outside 1..=5 are clamped for display
    pub fn stars(&self) -> u8 {
        self.rating.clamp(1, 5)
    }
}

/// One page of a paginated query.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page_size: u64) -> Self {
        PageResult {
            items,
            total_count,
            total_pages: total_pages(total_count, page_size),
        }
    }

    pub fn empty() -> Self {
        PageResult {
            items: Vec::new(),
            total_count: 0,
            total_pages: 0,
        }
    }
}

impl<T> Default for PageResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// `ceil(total_count / page_size)`; a zero page size yields zero pages.
pub fn total_pages(total_count: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(page_size)
}

// Options for the filter form, built once from a single aggregate fetch
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub makes: Vec<String>,
    pub years: Vec<i32>,
    pub models_by_make: BTreeMap<String, Vec<String>>,
}

impl FilterOptions {
    pub fn models_for(&self, make: &str) -> &[String] {
        self.models_by_make
            .get(make)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_is_whole_percent_of_market_price() {
        let discount = Discount::between(150_000_000, Some(200_000_000)).unwrap();
        assert_eq!(discount.amount, 50_000_000);
        assert_eq!(discount.percent, 25);
    }

    #[test]
    fn no_discount_when_market_price_is_not_higher() {
        assert_eq!(Discount::between(150_000_000, Some(150_000_000)), None);
        assert_eq!(Discount::between(150_000_000, Some(90_000_000)), None);
        assert_eq!(Discount::between(150_000_000, None), None);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(20, 9), 3);
        assert_eq!(total_pages(18, 9), 2);
        assert_eq!(total_pages(0, 9), 0);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn enum_values_match_store_strings() {
        let car_json = serde_json::json!("automatic");
        let parsed: Transmission = serde_json::from_value(car_json).unwrap();
        assert_eq!(parsed, Transmission::Automatic);
        assert_eq!(FuelType::parse("diesel"), Some(FuelType::Diesel));
        assert_eq!(FuelType::parse("steam"), None);
    }
}
