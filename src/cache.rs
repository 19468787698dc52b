// Keyed request cache in front of the catalog: concurrent requests for one
// key share a single in-flight fetch, fresh values are served without a
// store call, stale values are served while one background refresh runs, and
// entries nobody asked for during the retention window are dropped.

use cached::{Cached, TimedCache};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::catalog::{available_cars, Catalog};
use crate::config::CacheSettings;
use crate::models::{Car, FilterOptions, PageResult, Testimonial};
use crate::query::{Filters, Page, Sort};

/// Operation name plus a deterministic serialisation of its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(operation: &str, params: &impl Serialize) -> Self {
        let params = serde_json::to_string(params).unwrap_or_default();
        CacheKey(format!("{}:{}", operation, params))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a view sees for one request.
#[derive(Debug)]
pub enum RequestState<V> {
    Loading,
    Data(Arc<V>),
    Error(String),
}

impl<V> Clone for RequestState<V> {
    fn clone(&self) -> Self {
        match self {
            RequestState::Loading => RequestState::Loading,
            RequestState::Data(v) => RequestState::Data(Arc::clone(v)),
            RequestState::Error(e) => RequestState::Error(e.clone()),
        }
    }
}

impl<V> RequestState<V> {
    pub fn into_result(self) -> Result<Arc<V>, String> {
        match self {
            RequestState::Data(v) => Ok(v),
            RequestState::Error(e) => Err(e),
            RequestState::Loading => Err("request still loading".to_string()),
        }
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, String>>>;

struct Resolved<V> {
    value: Arc<V>,
    fetched_at: Instant,
}

impl<V> Clone for Resolved<V> {
    fn clone(&self) -> Self {
        Resolved {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

struct InFlight<V> {
    generation: u64,
    started_at: Instant,
    future: SharedFetch<V>,
}

struct Slots<V> {
    resolved: TimedCache<CacheKey, Resolved<V>>,
    in_flight: HashMap<CacheKey, InFlight<V>>,
    next_generation: u64,
}

pub struct QueryCache<V> {
    name: &'static str,
    stale_after: Duration,
    retention: Duration,
    slots: Arc<Mutex<Slots<V>>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        QueryCache {
            name: self.name,
            stale_after: self.stale_after,
            retention: self.retention,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("name", &self.name)
            .field("stale_after", &self.stale_after)
            .finish()
    }
}

impl<V: Send + Sync + 'static> QueryCache<V> {
    pub fn new(name: &'static str, stale_after: Duration, retention: Duration) -> Self {
        // Retention is refreshed on every hit, so only unused entries expire
        let resolved = TimedCache::with_lifespan_and_refresh(retention.as_secs().max(1), true);
        QueryCache {
            name,
            stale_after,
            retention,
            slots: Arc::new(Mutex::new(Slots {
                resolved,
                in_flight: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Resolves `key`, calling `load` only when no usable value or in-flight
    /// request exists. The returned state is `Data` or `Error`.
    pub async fn fetch<F, Fut>(&self, key: CacheKey, load: F) -> RequestState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, String>> + Send + 'static,
    {
        let mut slots = self.slots.lock().await;

        if let Some(resolved) = slots.resolved.cache_get(&key).cloned() {
            if resolved.fetched_at.elapsed() < self.stale_after {
                tracing::debug!(cache = self.name, %key, "Cache hit");
                return RequestState::Data(resolved.value);
            }
            // Stale: answer with the last good value, refresh behind it
            if !slots.in_flight.contains_key(&key) {
                tracing::debug!(cache = self.name, %key, "Serving stale value, revalidating");
                self.start(&mut slots, key, load());
            }
            return RequestState::Data(resolved.value);
        }

        let future = match slots.in_flight.get(&key) {
            Some(in_flight) => {
                tracing::debug!(cache = self.name, %key, "Joining in-flight request");
                in_flight.future.clone()
            }
            None => {
                tracing::debug!(cache = self.name, %key, "Cache miss");
                self.start(&mut slots, key, load())
            }
        };
        drop(slots);

        match future.await {
            Ok(value) => RequestState::Data(value),
            Err(e) => RequestState::Error(e),
        }
    }

    /// Current state of `key` without starting anything. `None` when the key
    /// was never requested (or has expired).
    pub async fn peek(&self, key: &CacheKey) -> Option<RequestState<V>> {
        let mut slots = self.slots.lock().await;
        if let Some(resolved) = slots.resolved.cache_get(key) {
            return Some(RequestState::Data(Arc::clone(&resolved.value)));
        }
        slots.in_flight.contains_key(key).then_some(RequestState::Loading)
    }

    /// Drops the value and orphans any in-flight request for `key`; a late
    /// resolution of that request no longer lands in the cache.
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut slots = self.slots.lock().await;
        slots.resolved.cache_remove(key);
        slots.in_flight.remove(key);
    }

    fn start<Fut>(&self, slots: &mut Slots<V>, key: CacheKey, load: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = Result<V, String>> + Send + 'static,
    {
        // Expired entries are swept whenever new work starts. A request
        // running longer than the retention window is orphaned; its late
        // resolution no longer lands.
        slots.resolved.flush();
        let retention = self.retention;
        let before = slots.in_flight.len();
        slots.in_flight.retain(|_, f| f.started_at.elapsed() < retention);
        let orphaned = before - slots.in_flight.len();
        if orphaned > 0 {
            tracing::warn!(cache = self.name, orphaned, "Dropped in-flight requests older than the retention window");
        }

        slots.next_generation += 1;
        let generation = slots.next_generation;
        let shared_slots = Arc::clone(&self.slots);
        let name = self.name;
        let task_key = key.clone();

        let future = async move {
            let outcome = load.await.map(Arc::new);
            let mut slots = shared_slots.lock().await;
            let is_current = slots
                .in_flight
                .get(&task_key)
                .is_some_and(|f| f.generation == generation);
            if is_current {
                slots.in_flight.remove(&task_key);
                match &outcome {
                    Ok(value) => {
                        slots.resolved.cache_set(
                            task_key,
                            Resolved {
                                value: Arc::clone(value),
                                fetched_at: Instant::now(),
                            },
                        );
                    }
                    // Errors are never cached; any older value stays
                    Err(e) => tracing::warn!(cache = name, key = %task_key, "Fetch failed: {}", e),
                }
            } else {
                tracing::debug!(cache = name, key = %task_key, generation, "Discarding superseded resolution");
            }
            outcome
        }
        .boxed()
        .shared();

        slots.in_flight.insert(
            key,
            InFlight {
                generation,
                started_at: Instant::now(),
                future: future.clone(),
            },
        );
        // Runs to completion even when every caller goes away
        tokio::spawn(future.clone());
        future
    }
}

/// The catalog behind per-operation caches with their own staleness windows.
#[derive(Clone, Debug)]
pub struct CatalogCache {
    catalog: Catalog,
    cars: QueryCache<PageResult<Car>>,
    car_detail: QueryCache<Option<Car>>,
    similar: QueryCache<Vec<Car>>,
    testimonials: QueryCache<Vec<Testimonial>>,
    filter_options: QueryCache<FilterOptions>,
}

#[derive(Serialize)]
struct ListCarsParams<'a> {
    page: Page,
    filters: &'a Filters,
    sort: &'a Sort,
}

impl CatalogCache {
    pub fn new(catalog: Catalog, settings: &CacheSettings) -> Self {
        let retention = Duration::from_secs(settings.retention_secs);
        CatalogCache {
            catalog,
            cars: QueryCache::new("list_cars", settings.car_pages(), retention),
            car_detail: QueryCache::new("get_car", settings.car_detail(), retention),
            similar: QueryCache::new("similar_cars", settings.car_pages(), retention),
            testimonials: QueryCache::new("list_testimonials", settings.testimonials(), retention),
            filter_options: QueryCache::new("filter_options", settings.filter_options(), retention),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cars_key(page: Page, filters: &Filters, sort: &Sort) -> CacheKey {
        CacheKey::new("list_cars", &ListCarsParams { page, filters, sort })
    }

    pub async fn cars(&self, page: Page, filters: &Filters, sort: &Sort) -> RequestState<PageResult<Car>> {
        let key = Self::cars_key(page, filters, sort);
        let (catalog, filters, sort) = (self.catalog.clone(), filters.clone(), sort.clone());
        self.cars
            .fetch(key, move || async move {
                catalog
                    .list_cars(page, &filters, &sort)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
    }

    pub async fn car(&self, slug_or_id: &str) -> RequestState<Option<Car>> {
        let key = CacheKey::new("get_car", &slug_or_id);
        let (catalog, slug_or_id) = (self.catalog.clone(), slug_or_id.to_string());
        self.car_detail
            .fetch(key, move || async move {
                catalog
                    .get_car_by_slug_or_id(&slug_or_id)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
    }

    pub async fn similar_cars(&self, car: &Car, limit: u64) -> RequestState<Vec<Car>> {
        let key = CacheKey::new("similar_cars", &(&car.make, &car.id, limit));
        let (catalog, car) = (self.catalog.clone(), car.clone());
        self.similar
            .fetch(key, move || async move {
                catalog.similar_cars(&car, limit).await.map_err(|e| e.to_string())
            })
            .await
    }

    pub async fn testimonials(&self, limit: u64) -> RequestState<Vec<Testimonial>> {
        let key = CacheKey::new("list_testimonials", &limit);
        let catalog = self.catalog.clone();
        self.testimonials
            .fetch(key, move || async move {
                catalog.list_testimonials(limit).await.map_err(|e| e.to_string())
            })
            .await
    }

    pub async fn filter_options(&self) -> RequestState<FilterOptions> {
        let key = CacheKey::new("filter_options", &());
        let catalog = self.catalog.clone();
        self.filter_options
            .fetch(key, move || async move {
                catalog.filter_options().await.map_err(|e| e.to_string())
            })
            .await
    }

    /// Newest unsold cars, through the same cache as the listing.
    pub async fn featured_cars(&self, limit: u64) -> RequestState<PageResult<Car>> {
        self.cars(Page::first(limit), &available_cars(), &Sort::default()).await
    }
}
