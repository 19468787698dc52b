// Filter state for the listing page. The URL query string is the committed
// state; the form is a draft that gets edited and then committed back.

use serde::Serialize;
use url::form_urlencoded;

use crate::models::{FuelType, Transmission};
use crate::query::{FilterValue, Filters};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: Copy> Bounds<T> {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// User-selected constraints on the public listing. Unsold cars only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Bounds<i32>,
    pub price: Bounds<i64>,
    pub transmission: Option<Transmission>,
    pub fuel_type: Option<FuelType>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    /// Query-builder mapping, including the implicit `sold = false`.
    pub fn to_filters(&self) -> Filters {
        let mut filters = Filters::new().eq("sold", false);
        if let Some(make) = &self.make {
            filters.insert("make", FilterValue::Eq(make.as_str().into()));
        }
        if let Some(model) = &self.model {
            filters.insert("model", FilterValue::Eq(model.as_str().into()));
        }
        if !self.year.is_empty() {
            filters.insert("year", FilterValue::range(self.year.min, self.year.max));
        }
        if !self.price.is_empty() {
            filters.insert("price", FilterValue::range(self.price.min, self.price.max));
        }
        if let Some(transmission) = self.transmission {
            filters.insert("transmission", FilterValue::Eq(transmission.as_str().into()));
        }
        if let Some(fuel_type) = self.fuel_type {
            filters.insert("fuel_type", FilterValue::Eq(fuel_type.as_str().into()));
        }
        filters
    }
}

/// One editable field of the filter form, with its query-parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Make,
    Model,
    YearMin,
    YearMax,
    PriceMin,
    PriceMax,
    Transmission,
    FuelType,
}

impl FilterField {
    // Make comes first: applying it resets the model
    pub const ALL: [FilterField; 8] = [
        FilterField::Make,
        FilterField::Model,
        FilterField::YearMin,
        FilterField::YearMax,
        FilterField::PriceMin,
        FilterField::PriceMax,
        FilterField::Transmission,
        FilterField::FuelType,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FilterField::Make => "make",
            FilterField::Model => "model",
            FilterField::YearMin => "yearMin",
            FilterField::YearMax => "yearMax",
            FilterField::PriceMin => "priceMin",
            FilterField::PriceMax => "priceMax",
            FilterField::Transmission => "transmission",
            FilterField::FuelType => "fuelType",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Result of committing or resetting: the new query string and the page to
/// show, which is always the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub query: String,
    pub page: u64,
}

impl Committed {
    pub fn location(&self, path: &str) -> String {
        if self.query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.query)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    criteria: FilterCriteria,
}

impl FilterState {
    /// Reads the committed criteria out of query parameters. Unknown keys
    /// and malformed values are ignored.
    pub fn hydrate<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = FilterState::default();
        for (key, value) in pairs {
            if let Some(field) = FilterField::from_key(key.as_ref()) {
                state.set(field, value.as_ref());
            }
        }
        state
    }

    pub fn from_query(query: &str) -> Self {
        Self::hydrate(form_urlencoded::parse(query.as_bytes()))
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Uncommitted change of one field. A new make always clears the model,
    /// since models are scoped to their make.
    pub fn edit(&mut self, field: FilterField, value: &str) {
        if field == FilterField::Make {
            self.criteria.model = None;
        }
        self.set(field, value);
    }

    /// Applies a submitted form on top of this (committed) state: only fields
    /// whose value differs are edited, make first.
    pub fn apply_form<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let submitted: Vec<(FilterField, String)> = pairs
            .into_iter()
            .filter_map(|(k, v)| FilterField::from_key(k.as_ref()).map(|f| (f, v.as_ref().trim().to_string())))
            .collect();
        let committed = self.clone();

        for field in FilterField::ALL {
            // Last submitted value wins for repeated keys
            let Some((_, value)) = submitted.iter().rev().find(|(f, _)| *f == field) else {
                continue;
            };
            if committed.value_of(field) != *value {
                self.edit(field, value);
            }
        }
    }

    /// Serialises every non-empty field, replacing the whole parameter set.
    pub fn commit(&self) -> Committed {
        Committed {
            query: self.to_query(),
            page: 0,
        }
    }

    pub fn reset(&mut self) -> Committed {
        self.criteria = FilterCriteria::default();
        self.commit()
    }

    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for field in FilterField::ALL {
            let value = self.value_of(field);
            if !value.is_empty() {
                serializer.append_pair(field.key(), &value);
            }
        }
        serializer.finish()
    }

    /// The field as the form shows it; empty when unset.
    pub fn value_of(&self, field: FilterField) -> String {
        let c = &self.criteria;
        let text = |v: Option<String>| v.unwrap_or_default();
        match field {
            FilterField::Make => text(c.make.clone()),
            FilterField::Model => text(c.model.clone()),
            FilterField::YearMin => text(c.year.min.map(|v| v.to_string())),
            FilterField::YearMax => text(c.year.max.map(|v| v.to_string())),
            FilterField::PriceMin => text(c.price.min.map(|v| v.to_string())),
            FilterField::PriceMax => text(c.price.max.map(|v| v.to_string())),
            FilterField::Transmission => text(c.transmission.map(|t| t.as_str().to_string())),
            FilterField::FuelType => text(c.fuel_type.map(|f| f.as_str().to_string())),
        }
    }

    // Writes one field from its text form; blank or unparseable clears it
    fn set(&mut self, field: FilterField, value: &str) {
        let value = value.trim();
        let text = || (!value.is_empty()).then(|| value.to_string());
        let c = &mut self.criteria;
        match field {
            FilterField::Make => c.make = text(),
            FilterField::Model => c.model = text(),
            FilterField::YearMin => c.year.min = value.parse().ok(),
            FilterField::YearMax => c.year.max = value.parse().ok(),
            FilterField::PriceMin => c.price.min = value.parse().ok(),
            FilterField::PriceMax => c.price.max = value.parse().ok(),
            FilterField::Transmission => c.transmission = Transmission::parse(value),
            FilterField::FuelType => c.fuel_type = FuelType::parse(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{predicates_for, Predicate, Scalar};

    #[test]
    fn hydrate_ignores_unknown_and_malformed_parameters() {
        let state = FilterState::from_query(
            "make=Toyota&yearMin=abc&yearMax=2020&priceMin=&transmission=warp&utm_source=x&fuelType=diesel",
        );
        let c = state.criteria();
        assert_eq!(c.make.as_deref(), Some("Toyota"));
        assert_eq!(c.year, Bounds { min: None, max: Some(2020) });
        assert!(c.price.is_empty());
        assert_eq!(c.transmission, None);
        assert_eq!(c.fuel_type, Some(FuelType::Diesel));
    }

    #[test]
    fn commit_and_hydrate_round_trip() {
        let mut state = FilterState::default();
        state.edit(FilterField::Make, "Honda");
        state.edit(FilterField::Model, "HR-V");
        state.edit(FilterField::YearMin, "2018");
        state.edit(FilterField::PriceMax, "300000000");
        state.edit(FilterField::Transmission, "automatic");

        let committed = state.commit();
        assert_eq!(committed.page, 0);
        assert_eq!(
            committed.query,
            "make=Honda&model=HR-V&yearMin=2018&priceMax=300000000&transmission=automatic"
        );
        assert_eq!(FilterState::from_query(&committed.query), state);
    }

    #[test]
    fn editing_make_clears_model() {
        let mut state = FilterState::from_query("make=Toyota&model=Avanza");
        state.edit(FilterField::Make, "Honda");
        assert_eq!(state.criteria().make.as_deref(), Some("Honda"));
        assert_eq!(state.criteria().model, None);

        // Even re-selecting the same make drops the model
        state.edit(FilterField::Model, "Jazz");
        state.edit(FilterField::Make, "Honda");
        assert_eq!(state.criteria().model, None);
    }

    #[test]
    fn submitted_form_with_new_make_drops_stale_model() {
        let mut state = FilterState::from_query("make=Toyota&model=Avanza");
        // The model select still carries the old value
        state.apply_form([("model", "Avanza"), ("make", "Honda"), ("yearMin", "")]);
        assert_eq!(state.criteria().make.as_deref(), Some("Honda"));
        assert_eq!(state.criteria().model, None);

        // Model picked along with an unchanged make is kept, even if the
        // options list never heard of it
        state.apply_form([("make", "Honda"), ("model", "Civic Type R")]);
        assert_eq!(state.criteria().model.as_deref(), Some("Civic Type R"));
    }

    #[test]
    fn commit_drops_cleared_keys_and_reset_clears_everything() {
        let mut state = FilterState::from_query("make=Toyota&priceMin=100&fuelType=hybrid");
        state.edit(FilterField::PriceMin, "");
        assert_eq!(state.commit().query, "make=Toyota&fuelType=hybrid");

        let committed = state.reset();
        assert!(committed.query.is_empty());
        assert_eq!(committed.location("/cars"), "/cars");
        assert!(state.criteria().is_empty());
    }

    #[test]
    fn criteria_map_onto_store_filters() {
        let state = FilterState::from_query("make=Toyota&priceMin=100000000&fuelType=diesel");
        let predicates = predicates_for(&state.criteria().to_filters());
        assert!(predicates.contains(&Predicate::Eq("make".into(), Scalar::from("Toyota"))));
        assert!(predicates.contains(&Predicate::Gte("price".into(), Scalar::Int(100_000_000))));
        assert!(predicates.contains(&Predicate::Eq("fuel_type".into(), Scalar::from("diesel"))));
        assert!(predicates.contains(&Predicate::Eq("sold".into(), Scalar::Bool(false))));
        assert_eq!(predicates.len(), 4);
    }
}
