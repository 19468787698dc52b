// Builds store queries out of filter mappings: predicates, sort order and
// the offset window for one page.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// A single comparable value in a predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl Scalar {
    // Empty strings count as "no value", same as a missing field
    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// What a filter mapping may hold for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterValue {
    /// Undefined, null or empty; the field is skipped.
    Missing,
    Eq(Scalar),
    NotEq(Scalar),
    /// Set membership. An empty set is dropped, not turned into "match nothing".
    In(Vec<Scalar>),
    /// `{min, max}`, each half optional.
    Range {
        min: Option<Scalar>,
        max: Option<Scalar>,
    },
}

impl FilterValue {
    pub fn range(min: Option<impl Into<Scalar>>, max: Option<impl Into<Scalar>>) -> Self {
        FilterValue::Range {
            min: min.map(Into::into),
            max: max.map(Into::into),
        }
    }
}

/// Field → value mapping. Ordered so that identical filters always
/// serialise identically (cache keys depend on it).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filters(BTreeMap<String, FilterValue>);

impl Filters {
    pub fn new() -> Self {
        Filters(BTreeMap::new())
    }

    pub fn with(mut self, field: &str, value: FilterValue) -> Self {
        self.insert(field, value);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, FilterValue::Eq(value.into()))
    }

    pub fn insert(&mut self, field: &str, value: FilterValue) {
        self.0.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Scalar),
    NotEq(String, Scalar),
    Gte(String, Scalar),
    Lte(String, Scalar),
    In(String, Vec<Scalar>),
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq(f, _)
            | Predicate::NotEq(f, _)
            | Predicate::Gte(f, _)
            | Predicate::Lte(f, _)
            | Predicate::In(f, _) => f,
        }
    }

    // Right-hand side in the store's REST dialect: `eq.Toyota`, `in.("a","b")`
    fn operand(&self) -> String {
        match self {
            Predicate::Eq(_, v) => format!("eq.{}", v),
            Predicate::NotEq(_, v) => format!("neq.{}", v),
            Predicate::Gte(_, v) => format!("gte.{}", v),
            Predicate::Lte(_, v) => format!("lte.{}", v),
            Predicate::In(_, values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| match v {
                        Scalar::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                        other => other.to_string(),
                    })
                    .collect();
                format!("in.({})", quoted.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn new(field: &str, direction: Direction) -> Self {
        Sort {
            field: field.to_string(),
            direction,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self::new(field, Direction::Asc)
    }
}

// Newest first unless asked otherwise
impl Default for Sort {
    fn default() -> Self {
        Sort::new("created_at", Direction::Desc)
    }
}

/// 0-based page index and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub index: u64,
    pub size: u64,
}

impl Page {
    pub fn new(index: u64, size: u64) -> Self {
        Page {
            index,
            size: size.max(1),
        }
    }

    pub fn first(size: u64) -> Self {
        Self::new(0, size)
    }

    /// Inclusive row range `[index*size, (index+1)*size - 1]`.
    pub fn bounds(&self) -> (u64, u64) {
        let from = self.index.saturating_mul(self.size);
        let to = from.saturating_add(self.size - 1);
        (from, to)
    }
}

/// A read against one table of the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub table: String,
    pub columns: String,
    pub predicates: Vec<Predicate>,
    pub order: Option<Sort>,
    pub range: Option<(u64, u64)>,
    pub limit: Option<u64>,
    pub exact_count: bool,
}

impl StoreQuery {
    pub fn table(table: &str) -> Self {
        StoreQuery {
            table: table.to_string(),
            columns: "*".to_string(),
            predicates: Vec::new(),
            order: None,
            range: None,
            limit: None,
            exact_count: false,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filters: &Filters) -> Self {
        self.predicates.extend(predicates_for(filters));
        self
    }

    pub fn order(mut self, sort: &Sort) -> Self {
        self.order = Some(sort.clone());
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.range = Some(page.bounds());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn exact_count(mut self) -> Self {
        self.exact_count = true;
        self
    }

    /// Query-string parameters for the REST endpoint of `table`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        for predicate in &self.predicates {
            params.push((predicate.field().to_string(), predicate.operand()));
        }
        if let Some(sort) = &self.order {
            let direction = match sort.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", sort.field, direction)));
        }
        match (self.range, self.limit) {
            (Some((from, to)), _) => {
                params.push(("offset".to_string(), from.to_string()));
                params.push(("limit".to_string(), (to - from + 1).to_string()));
            }
            (None, Some(limit)) => params.push(("limit".to_string(), limit.to_string())),
            (None, None) => {}
        }
        params
    }
}

// Turns one filter mapping into store predicates. Missing, blank and empty
// values produce nothing.
pub fn predicates_for(filters: &Filters) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    for (field, value) in filters.iter() {
        match value {
            FilterValue::Missing => {}
            FilterValue::Eq(v) if !v.is_blank() => {
                predicates.push(Predicate::Eq(field.clone(), v.clone()))
            }
            FilterValue::NotEq(v) if !v.is_blank() => {
                predicates.push(Predicate::NotEq(field.clone(), v.clone()))
            }
            FilterValue::In(values) => {
                let values: Vec<Scalar> = values.iter().filter(|v| !v.is_blank()).cloned().collect();
                if !values.is_empty() {
                    predicates.push(Predicate::In(field.clone(), values));
                }
            }
            FilterValue::Range { min, max } => {
                if let Some(min) = min.as_ref().filter(|v| !v.is_blank()) {
                    predicates.push(Predicate::Gte(field.clone(), min.clone()));
                }
                if let Some(max) = max.as_ref().filter(|v| !v.is_blank()) {
                    predicates.push(Predicate::Lte(field.clone(), max.clone()));
                }
            }
            FilterValue::Eq(_) | FilterValue::NotEq(_) => {}
        }
    }
    predicates
}

/// The paginated, filtered and sorted `cars` query behind the listing.
pub fn build_car_query(filters: &Filters, sort: &Sort, page: Page) -> StoreQuery {
    StoreQuery::table("cars")
        .filter(filters)
        .order(sort)
        .page(page)
        .exact_count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_become_equality_predicates() {
        let filters = Filters::new().eq("make", "Toyota").eq("sold", false);
        let predicates = predicates_for(&filters);
        assert_eq!(
            predicates,
            vec![
                Predicate::Eq("make".into(), Scalar::from("Toyota")),
                Predicate::Eq("sold".into(), Scalar::Bool(false)),
            ]
        );
    }

    #[test]
    fn blank_and_missing_values_are_skipped() {
        let filters = Filters::new()
            .eq("make", "")
            .with("model", FilterValue::Missing)
            .with("color", FilterValue::In(vec![]));
        assert!(predicates_for(&filters).is_empty());
    }

    #[test]
    fn ranges_produce_independent_bounds() {
        let only_min = Filters::new().with("price", FilterValue::range(Some(100_000_000i64), None::<i64>));
        assert_eq!(
            predicates_for(&only_min),
            vec![Predicate::Gte("price".into(), Scalar::Int(100_000_000))]
        );

        let both = Filters::new().with("year", FilterValue::range(Some(2015), Some(2020)));
        assert_eq!(
            predicates_for(&both),
            vec![
                Predicate::Gte("year".into(), Scalar::Int(2015)),
                Predicate::Lte("year".into(), Scalar::Int(2020)),
            ]
        );
    }

    #[test]
    fn page_maps_to_inclusive_offsets() {
        assert_eq!(Page::new(0, 9).bounds(), (0, 8));
        assert_eq!(Page::new(2, 9).bounds(), (18, 26));
        // A zero size is bumped to one row per page
        assert_eq!(Page::new(3, 0).bounds(), (3, 3));
    }

    #[test]
    fn car_query_renders_rest_parameters() {
        let filters = Filters::new()
            .eq("make", "Toyota")
            .with("price", FilterValue::range(Some(100_000_000i64), None::<i64>))
            .with("fuel_type", FilterValue::In(vec!["diesel".into(), "hybrid".into()]));
        let query = build_car_query(&filters, &Sort::default(), Page::new(1, 9));
        let params = query.to_params();

        assert!(params.contains(&("select".into(), "*".into())));
        assert!(params.contains(&("make".into(), "eq.Toyota".into())));
        assert!(params.contains(&("price".into(), "gte.100000000".into())));
        assert!(params.contains(&("fuel_type".into(), "in.(\"diesel\",\"hybrid\")".into())));
        assert!(params.contains(&("order".into(), "created_at.desc".into())));
        assert!(params.contains(&("offset".into(), "9".into())));
        assert!(params.contains(&("limit".into(), "9".into())));
        assert!(query.exact_count);
    }
}
