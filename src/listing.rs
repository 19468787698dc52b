// Listing view controller: turns {filter criteria, page, sort} into a view
// state through the request cache, and keeps late answers for superseded
// criteria from replacing what is shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::form_urlencoded;

use crate::cache::{CacheKey, CatalogCache, RequestState};
use crate::filters::{FilterCriteria, FilterState};
use crate::models::{Car, PageResult};
use crate::query::{Direction, Page, Sort};

/// Clamps an addressed page into `[0, total_pages)`; 0 when there are no pages.
pub fn clamp_page(requested: u64, total_pages: u64) -> u64 {
    requested.min(total_pages.saturating_sub(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    current: u64,
    total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub index: u64,
    pub label: u64,
    pub current: bool,
}

impl Pagination {
    pub fn new(requested: u64, total_pages: u64) -> Self {
        Pagination {
            current: clamp_page(requested, total_pages),
            total_pages,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current > 0
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.total_pages
    }

    /// Moves to `page` when it is a valid index; anything else is a no-op.
    pub fn go_to_page(&mut self, page: u64) -> bool {
        if page < self.total_pages {
            self.current = page;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        match self.current.checked_sub(1) {
            Some(page) => self.go_to_page(page),
            None => false,
        }
    }

    pub fn next(&mut self) -> bool {
        self.go_to_page(self.current + 1)
    }

    // Links for the current page and up to two either side
    pub fn links(&self) -> Vec<PageLink> {
        if self.total_pages == 0 {
            return Vec::new();
        }
        let first = self.current.saturating_sub(2);
        let last = (self.current + 2).min(self.total_pages - 1);
        (first..=last)
            .map(|index| PageLink {
                index,
                label: index + 1,
                current: index == self.current,
            })
            .collect()
    }
}

/// Sort choices offered above the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOption {
    #[default]
    Newest,
    PriceLow,
    PriceHigh,
    YearNew,
    YearOld,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::Newest,
        SortOption::PriceLow,
        SortOption::PriceHigh,
        SortOption::YearNew,
        SortOption::YearOld,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SortOption::Newest => "newest",
            SortOption::PriceLow => "price-low",
            SortOption::PriceHigh => "price-high",
            SortOption::YearNew => "year-new",
            SortOption::YearOld => "year-old",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOption::Newest => "Terbaru",
            SortOption::PriceLow => "Harga: Rendah ke Tinggi",
            SortOption::PriceHigh => "Harga: Tinggi ke Rendah",
            SortOption::YearNew => "Tahun: Terbaru",
            SortOption::YearOld => "Tahun: Terlama",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == value)
    }

    pub fn to_sort(self) -> Sort {
        match self {
            SortOption::Newest => Sort::default(),
            SortOption::PriceLow => Sort::new("price", Direction::Asc),
            SortOption::PriceHigh => Sort::new("price", Direction::Desc),
            SortOption::YearNew => Sort::new("year", Direction::Desc),
            SortOption::YearOld => Sort::new("year", Direction::Asc),
        }
    }
}

/// Everything the listing URL addresses: filters, sort and page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub filters: FilterState,
    pub sort: SortOption,
    pub page: u64,
}

impl ListingQuery {
    pub fn from_query(query: &str) -> Self {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let value = |key: &str| pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        ListingQuery {
            filters: FilterState::hydrate(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            sort: value("sort").and_then(SortOption::parse).unwrap_or_default(),
            // Malformed or negative page numbers fall back to the first page
            page: value("page").and_then(|p| p.trim().parse().ok()).unwrap_or(0),
        }
    }

    /// Listing URL for another page, keeping filters and sort.
    pub fn href_for_page(&self, page: u64) -> String {
        self.href(self.sort, page)
    }

    /// Listing URL for another sort order; goes back to the first page.
    pub fn href_for_sort(&self, sort: SortOption) -> String {
        self.href(sort, 0)
    }

    fn href(&self, sort: SortOption, page: u64) -> String {
        let mut query = self.filters.to_query();
        let mut extra = form_urlencoded::Serializer::new(String::new());
        if sort != SortOption::Newest {
            extra.append_pair("sort", sort.key());
        }
        if page > 0 {
            extra.append_pair("page", &page.to_string());
        }
        let extra = extra.finish();
        if !extra.is_empty() {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&extra);
        }
        if query.is_empty() {
            "/cars".to_string()
        } else {
            format!("/cars?{}", query)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ListingState {
    /// No data yet for the current key.
    Loading,
    /// The fetch failed and nothing usable is cached.
    Error(String),
    /// The fetch succeeded with zero matches.
    Empty,
    Populated(Arc<PageResult<Car>>),
}

impl From<RequestState<PageResult<Car>>> for ListingState {
    fn from(state: RequestState<PageResult<Car>>) -> Self {
        match state {
            RequestState::Loading => ListingState::Loading,
            RequestState::Error(e) => ListingState::Error(e),
            RequestState::Data(page) if page.items.is_empty() => ListingState::Empty,
            RequestState::Data(page) => ListingState::Populated(page),
        }
    }
}

/// What the listing shows for one set of criteria.
#[derive(Debug, Clone)]
pub struct ListingView {
    pub criteria: FilterCriteria,
    pub key: CacheKey,
    pub state: ListingState,
    pub pagination: Pagination,
    pub total_count: u64,
}

impl ListingView {
    pub fn cars(&self) -> &[Car] {
        match &self.state {
            ListingState::Populated(page) => &page.items,
            _ => &[],
        }
    }
}

/// Loads one listing. A page past the end is clamped to the last page and
/// fetched again.
pub async fn load_listing(cache: &CatalogCache, query: &ListingQuery, page_size: u64) -> ListingView {
    let filters = query.filters.criteria().to_filters();
    let sort = query.sort.to_sort();
    let mut page = Page::new(query.page, page_size);
    let mut state = cache.cars(page, &filters, &sort).await;

    if let RequestState::Data(result) = &state {
        let last = clamp_page(page.index, result.total_pages);
        if result.total_pages > 0 && last != page.index {
            tracing::debug!(requested = page.index, clamped = last, "Requested page is past the end, clamping");
            page = Page::new(last, page_size);
            state = cache.cars(page, &filters, &sort).await;
        }
    }

    let (total_count, total_pages) = match &state {
        RequestState::Data(result) => (result.total_count, result.total_pages),
        _ => (0, 0),
    };

    ListingView {
        criteria: query.filters.criteria().clone(),
        key: CatalogCache::cars_key(page, &filters, &sort),
        state: state.into(),
        pagination: Pagination::new(page.index, total_pages),
        total_count,
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Shown(ListingView),
    /// A newer load was issued before this one resolved.
    Superseded,
}

impl LoadOutcome {
    pub fn into_view(self) -> Option<ListingView> {
        match self {
            LoadOutcome::Shown(view) => Some(view),
            LoadOutcome::Superseded => None,
        }
    }
}

/// Tags every load with a ticket; only the newest ticket may replace what
/// is shown.
#[derive(Debug)]
pub struct ListingController {
    cache: CatalogCache,
    page_size: u64,
    latest: AtomicU64,
    shown: Mutex<Option<ListingView>>,
}

impl ListingController {
    pub fn new(cache: CatalogCache, page_size: u64) -> Self {
        ListingController {
            cache,
            page_size,
            latest: AtomicU64::new(0),
            shown: Mutex::new(None),
        }
    }

    pub async fn load(&self, query: &ListingQuery) -> LoadOutcome {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        // Old data stays shown while the new key is loading
        let view = load_listing(&self.cache, query, self.page_size).await;

        let mut shown = self.shown.lock().await;
        if self.latest.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, key = %view.key, "Ignoring listing for superseded criteria");
            return LoadOutcome::Superseded;
        }
        *shown = Some(view.clone());
        LoadOutcome::Shown(view)
    }

    pub async fn shown(&self) -> Option<ListingView> {
        self.shown.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fixtures, Catalog};
    use crate::config::Settings;
    use crate::query::{Predicate, Scalar, StoreQuery};
    use crate::store::{rest_mock, MemoryStore, RestStore, Rows, StoreError, StoreHandle, TableStore};
    use async_trait::async_trait;
    use std::time::Duration;

    fn cache_over(store: StoreHandle) -> CatalogCache {
        CatalogCache::new(Catalog::new(store), &Settings::defaults().cache)
    }

    // Answers Toyota queries slowly, everything else at once
    struct SlowToyota(MemoryStore);

    #[async_trait]
    impl TableStore for SlowToyota {
        async fn select(&self, query: &StoreQuery) -> Result<Rows, StoreError> {
            let toyota = Predicate::Eq("make".into(), Scalar::from("Toyota"));
            if query.predicates.contains(&toyota) {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            self.0.select(query).await
        }
    }

    struct Unreachable;

    #[async_trait]
    impl TableStore for Unreachable {
        async fn select(&self, _query: &StoreQuery) -> Result<Rows, StoreError> {
            Err(StoreError::InvalidResponse("timed out".into()))
        }
    }

    #[test]
    fn nine_per_page_over_twenty_cars() {
        let total_pages = crate::models::total_pages(20, 9);
        assert_eq!(total_pages, 3);

        let mut pagination = Pagination::new(5, total_pages);
        assert_eq!(pagination.current(), 2);
        assert!(!pagination.has_next());
        assert!(pagination.has_previous());

        // Out-of-range jumps change nothing
        assert!(!pagination.go_to_page(3));
        assert_eq!(pagination.current(), 2);
        assert!(pagination.go_to_page(0));
        assert!(!pagination.has_previous());
        assert!(!pagination.previous());
        assert!(pagination.next());
        assert_eq!(pagination.current(), 1);
    }

    #[test]
    fn reachable_pages_never_start_past_the_total() {
        for size in 1..=10u64 {
            for count in 0..=40u64 {
                let pages = crate::models::total_pages(count, size);
                let mut pagination = Pagination::new(0, pages);
                for target in 0..pages + 3 {
                    pagination.go_to_page(target);
                    assert!(pagination.current() * size <= count);
                }
            }
        }
    }

    #[test]
    fn page_links_window_around_current() {
        let links = Pagination::new(4, 10).links();
        let labels: Vec<u64> = links.iter().map(|l| l.label).collect();
        assert_eq!(labels, vec![3, 4, 5, 6, 7]);
        assert!(links.iter().any(|l| l.current && l.index == 4));
        assert!(Pagination::new(0, 0).links().is_empty());
        assert_eq!(Pagination::new(0, 1).links().len(), 1);
    }

    #[test]
    fn listing_query_parses_sort_and_page() {
        let query = ListingQuery::from_query("make=Honda&sort=price-low&page=2&page=x");
        assert_eq!(query.sort, SortOption::PriceLow);
        // Last value wins and is malformed
        assert_eq!(query.page, 0);
        assert_eq!(query.href_for_page(3), "/cars?make=Honda&sort=price-low&page=3");
        assert_eq!(query.href_for_sort(SortOption::Newest), "/cars?make=Honda");
        assert_eq!(ListingQuery::default().href_for_page(0), "/cars");
    }

    #[tokio::test]
    async fn states_for_populated_empty_and_error() {
        let cache = cache_over(fixtures::handle());
        let view = load_listing(&cache, &ListingQuery::from_query("make=Honda"), 9).await;
        assert!(matches!(view.state, ListingState::Populated(_)));
        assert_eq!(view.cars().len(), 2);
        assert_eq!(view.total_count, 2);

        let view = load_listing(&cache, &ListingQuery::from_query("make=Ferrari"), 9).await;
        assert!(matches!(view.state, ListingState::Empty));
        assert_eq!(view.pagination.total_pages(), 0);

        let broken = cache_over(StoreHandle::new(Unreachable));
        let view = load_listing(&broken, &ListingQuery::default(), 9).await;
        assert!(matches!(view.state, ListingState::Error(_)));
    }

    #[tokio::test]
    async fn pages_past_the_end_are_clamped() {
        let cache = cache_over(fixtures::handle());
        // Six unsold cars, two per page
        let view = load_listing(&cache, &ListingQuery::from_query("page=5"), 2).await;
        assert_eq!(view.pagination.current(), 2);
        assert_eq!(view.pagination.total_pages(), 3);
        assert_eq!(view.cars().len(), 2);
    }

    #[tokio::test]
    async fn pages_past_the_end_are_clamped_against_the_rest_store() {
        let base_url = rest_mock::serve().await;
        let store = RestStore::new(reqwest::Client::new(), &base_url, rest_mock::API_KEY);
        let cache = cache_over(StoreHandle::new(store));

        // Seven rows behind the REST interface, two per page
        let view = load_listing(&cache, &ListingQuery::from_query("page=5"), 2).await;
        assert!(matches!(view.state, ListingState::Populated(_)));
        assert_eq!(view.pagination.current(), 3);
        assert_eq!(view.pagination.total_pages(), 4);
        assert_eq!(view.cars().len(), 1);
    }

    #[tokio::test]
    async fn late_answers_for_old_criteria_never_replace_newer_ones() {
        let cache = cache_over(StoreHandle::new(SlowToyota(fixtures::memory_store())));
        let controller = ListingController::new(cache, 9);

        let a = ListingQuery::from_query("make=Toyota");
        let b = ListingQuery::from_query("make=Honda");
        let (first, second) = tokio::join!(controller.load(&a), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.load(&b).await
        });

        assert!(matches!(first, LoadOutcome::Superseded));
        let second = second.into_view().unwrap();
        assert!(second.cars().iter().all(|c| c.make == "Honda"));

        let shown = controller.shown().await.unwrap();
        assert_eq!(shown.criteria.make.as_deref(), Some("Honda"));
        assert!(shown.cars().iter().all(|c| c.make == "Honda"));
    }
}
