// Data access functions over the catalog tables. Every store failure comes
// back as a `CatalogError` value; nothing here panics or lets a transport
// error escape untyped.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::models::{Car, FilterOptions, PageResult, Testimonial};
use crate::query::{build_car_query, FilterValue, Filters, Page, Scalar, Sort, StoreQuery};
use crate::store::{StoreError, StoreHandle, TableStore};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog store is not configured")]
    NotConfigured,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct Catalog {
    store: StoreHandle,
}

impl Catalog {
    pub fn new(store: StoreHandle) -> Self {
        Catalog { store }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_configured()
    }

    fn store(&self) -> Result<&dyn TableStore, CatalogError> {
        match &self.store {
            StoreHandle::Configured(store) => Ok(store.as_ref()),
            StoreHandle::Unconfigured => Err(CatalogError::NotConfigured),
        }
    }

    /// One page of cars. Errors stay visible so the listing can tell a
    /// failed fetch from an empty result.
    pub async fn list_cars(
        &self,
        page: Page,
        filters: &Filters,
        sort: &Sort,
    ) -> Result<PageResult<Car>, CatalogError> {
        let query = build_car_query(filters, sort, page);
        let rows = self.store()?.select(&query).await?;
        let fetched = rows.rows.len() as u64;
        let items: Vec<Car> = decode_rows(rows.rows, "cars");
        // Without an exact count, what came back is all there is to know
        let total_count = rows.total_count.unwrap_or(page.index * page.size + fetched);
        tracing::debug!(page = page.index, size = page.size, total_count, "Listed cars");
        Ok(PageResult::new(items, total_count, page.size))
    }

    /// Detail lookup: slug first, then id. `Ok(None)` means not found.
    pub async fn get_car_by_slug_or_id(&self, key: &str) -> Result<Option<Car>, CatalogError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }
        let store = self.store()?;

        let by_slug = StoreQuery::table("cars")
            .filter(&Filters::new().eq("slug", key))
            .limit(1);
        if let Some(car) = decode_rows::<Car>(store.select(&by_slug).await?.rows, "cars").into_iter().next() {
            return Ok(Some(car));
        }

        // Ids are UUIDs; anything else cannot match and the store would
        // reject the comparison outright.
        if uuid::Uuid::parse_str(key).is_err() {
            return Ok(None);
        }
        let by_id = StoreQuery::table("cars")
            .filter(&Filters::new().eq("id", key))
            .limit(1);
        Ok(decode_rows::<Car>(store.select(&by_id).await?.rows, "cars").into_iter().next())
    }

    /// Newest testimonials first.
    pub async fn list_testimonials(&self, limit: u64) -> Result<Vec<Testimonial>, CatalogError> {
        let query = StoreQuery::table("testimonials")
            .order(&Sort::default())
            .limit(limit);
        let rows = self.store()?.select(&query).await?;
        Ok(decode_rows(rows.rows, "testimonials"))
    }

    /// Distinct values of one `cars` column, in ascending order.
    pub async fn list_distinct(
        &self,
        field: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<String>, CatalogError> {
        let mut query = StoreQuery::table("cars").select(field).order(&Sort::asc(field));
        if let Some(filters) = filters {
            query = query.filter(filters);
        }
        let rows = self.store()?.select(&query).await?;

        let mut seen = BTreeSet::new();
        let mut values = Vec::new();
        for row in &rows.rows {
            if let Some(value) = row.get(field).and_then(scalar_text) {
                if seen.insert(value.clone()) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    /// Makes, years and every make's models out of one fetch of the three
    /// columns, so the filter form never queries per keystroke.
    pub async fn filter_options(&self) -> Result<FilterOptions, CatalogError> {
        let query = StoreQuery::table("cars")
            .select("make,model,year")
            .order(&Sort::asc("make"));
        let rows = self.store()?.select(&query).await?;

        let mut makes = BTreeSet::new();
        let mut years = BTreeSet::new();
        let mut models: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in &rows.rows {
            let make = row.get("make").and_then(Value::as_str).map(str::trim).filter(|m| !m.is_empty());
            let model = row.get("model").and_then(Value::as_str).map(str::trim).filter(|m| !m.is_empty());
            if let Some(year) = row.get("year").and_then(Value::as_i64).and_then(|y| i32::try_from(y).ok()) {
                years.insert(year);
            }
            if let Some(make) = make {
                makes.insert(make.to_string());
                let entry = models.entry(make.to_string()).or_default();
                if let Some(model) = model {
                    entry.insert(model.to_string());
                }
            }
        }

        Ok(FilterOptions {
            makes: makes.into_iter().collect(),
            years: years.into_iter().rev().collect(),
            models_by_make: models
                .into_iter()
                .map(|(make, models)| (make, models.into_iter().collect()))
                .collect(),
        })
    }

    /// Unsold cars of the same make, excluding the car itself at query level.
    pub async fn similar_cars(&self, car: &Car, limit: u64) -> Result<Vec<Car>, CatalogError> {
        let filters = Filters::new()
            .eq("make", car.make.as_str())
            .eq("sold", false)
            .with("id", FilterValue::NotEq(Scalar::from(car.id.as_str())));
        let page = self.list_cars(Page::first(limit), &filters, &Sort::default()).await?;
        Ok(page.items)
    }
}

/// Filters for the home page showcase: the newest unsold cars.
pub fn available_cars() -> Filters {
    Filters::new().eq("sold", false)
}

// Collapses a failed read into the neutral empty value once rendering takes
// over; the failure is logged, never shown as an exception.
pub fn or_empty<T: Default>(result: Result<T, String>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to load {}, showing nothing instead: {}", what, e);
            T::default()
        }
    }
}

// Rows that do not match the expected shape are skipped with an error log
fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, table: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!("Skipping malformed row from '{}': {}", table, e);
                None
            }
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    use crate::store::{MemoryStore, StoreHandle};

    // A full `cars` row; `overrides` replaces individual columns
    pub fn car_row(id: &str, make: &str, model: &str, year: i32, price: i64, overrides: Value) -> Value {
        let mut row = json!({
            "id": id,
            "created_at": format!("2024-01-{:02}T08:00:00Z", (year % 28) + 1),
            "updated_at": "2024-06-01T08:00:00Z",
            "make": make,
            "model": model,
            "year": year,
            "color": "Putih",
            "transmission": "automatic",
            "fuel_type": "gasoline",
            "mileage": 45000,
            "price": price,
            "market_price": null,
            "features": ["ABS", "Airbag"],
            "description": "Terawat.\nServis rutin.",
            "vin": format!("VIN{}", id),
            "engine_size": 1.5,
            "power": 105,
            "seats": 5,
            "doors": 4,
            "condition": "good",
            "sold": false,
            "sold_at": null,
            "title_image": format!("https://cdn.example.com/{}.jpg", id),
            "images": [],
            "slug": format!("{}-{}-{}", make.to_lowercase(), model.to_lowercase(), id),
        });
        if let (Some(row), Some(overrides)) = (row.as_object_mut(), overrides.as_object()) {
            for (k, v) in overrides {
                row.insert(k.clone(), v.clone());
            }
        }
        row
    }

    pub fn testimonial_row(id: &str, name: &str, day: u32) -> Value {
        json!({
            "id": id,
            "created_at": format!("2024-05-{:02}T10:00:00Z", day),
            "customer_name": name,
            "customer_location": "Tangerang",
            "rating": 5,
            "content": "Pelayanan ramah, mobil sesuai deskripsi.",
            "image": null,
            "car_id": null,
        })
    }

    pub fn cars() -> Vec<Value> {
        vec![
            car_row("c1", "Toyota", "Avanza", 2018, 150_000_000, json!({"market_price": 200_000_000})),
            car_row("c2", "Toyota", "Fortuner", 2020, 450_000_000, json!({"fuel_type": "diesel"})),
            car_row("c3", "Honda", "Jazz", 2017, 120_000_000, json!({"transmission": "manual"})),
            car_row("c4", "Toyota", "Yaris", 2021, 95_000_000, json!({"sold": true, "sold_at": "2024-06-02T08:00:00Z"})),
            car_row("c5", "Suzuki", "XL7", 2021, 230_000_000, json!({"fuel_type": "hybrid"})),
            car_row("c6", "Honda", "HR-V", 2019, 260_000_000, json!({})),
            car_row("c7", "Toyota", "Avanza", 2015, 99_000_000, json!({"transmission": "manual"})),
        ]
    }

    pub fn memory_store() -> MemoryStore {
        MemoryStore::new().with_table("cars", cars()).with_table(
            "testimonials",
            vec![
                testimonial_row("t1", "Budi", 1),
                testimonial_row("t2", "Sari", 3),
                testimonial_row("t3", "Andi", 2),
            ],
        )
    }

    pub fn handle() -> StoreHandle {
        StoreHandle::new(memory_store())
    }
}
