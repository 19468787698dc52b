// Catalog pages: the filterable listing, filter commit/reset redirects and
// the car detail page.

use askama::Template;
use axum::{
    extract::{Path, RawForm, RawQuery, State},
    response::{IntoResponse, Redirect},
};
use url::form_urlencoded;

use super::render;
use crate::cache::RequestState;
use crate::catalog::or_empty;
use crate::error::{AppError, AppResult};
use crate::filters::{FilterField, FilterState};
use crate::listing::{load_listing, ListingQuery, ListingState, ListingView, SortOption};
use crate::models::{FilterOptions, FuelType, Transmission};
use crate::view::{
    meta_description, specifications, CarCard, Contact, Gallery, GalleryView, Layout, PriceComparison,
    SelectOption, Spec,
};
use crate::AppState;

const SIMILAR_CARS: u64 = 3;

// Form field carrying the committed query string the form was rendered from
const COMMITTED_FIELD: &str = "committed";

/// Filter form as rendered from the committed state.
struct FilterForm {
    committed: String,
    makes: Vec<SelectOption>,
    models: Vec<SelectOption>,
    model_enabled: bool,
    year_min: Vec<SelectOption>,
    year_max: Vec<SelectOption>,
    price_min: String,
    price_max: String,
    transmissions: Vec<SelectOption>,
    fuel_types: Vec<SelectOption>,
}

impl FilterForm {
    fn new(state: &FilterState, options: &FilterOptions) -> Self {
        let make = state.value_of(FilterField::Make);
        let model = state.value_of(FilterField::Model);

        let mut models = SelectOption::plain(options.models_for(&make), &model);
        // A committed model the options never listed is still shown selected
        if !model.is_empty() && !models.iter().any(|o| o.value == model) {
            models.push(SelectOption::new(model.clone(), model.clone(), &model));
        }

        FilterForm {
            committed: state.to_query(),
            makes: SelectOption::plain(&options.makes, &make),
            models,
            model_enabled: !make.is_empty(),
            year_min: SelectOption::plain(&options.years, &state.value_of(FilterField::YearMin)),
            year_max: SelectOption::plain(&options.years, &state.value_of(FilterField::YearMax)),
            price_min: state.value_of(FilterField::PriceMin),
            price_max: state.value_of(FilterField::PriceMax),
            transmissions: Transmission::ALL
                .iter()
                .map(|t| SelectOption::new(t.as_str(), t.label(), &state.value_of(FilterField::Transmission)))
                .collect(),
            fuel_types: FuelType::ALL
                .iter()
                .map(|f| SelectOption::new(f.as_str(), f.label(), &state.value_of(FilterField::FuelType)))
                .collect(),
        }
    }
}

struct PageLinkView {
    label: u64,
    href: String,
    current: bool,
}

struct SortLink {
    label: &'static str,
    href: String,
    selected: bool,
}

#[derive(Template)]
#[template(path = "cars.html")]
struct CarsTemplate {
    layout: Layout,
    form: FilterForm,
    sorts: Vec<SortLink>,
    summary: String,
    loading: bool,
    error: Option<String>,
    empty: bool,
    cards: Vec<CarCard>,
    show_pagination: bool,
    previous_href: Option<String>,
    next_href: Option<String>,
    pages: Vec<PageLinkView>,
}

impl CarsTemplate {
    fn new(layout: Layout, query: &ListingQuery, view: &ListingView, options: &FilterOptions, contact: &Contact) -> Self {
        let pagination = view.pagination;
        // Links keep the page the listing actually shows, not the one asked for
        let shown = ListingQuery {
            page: pagination.current(),
            ..query.clone()
        };

        let previous_href = pagination.has_previous().then(|| shown.href_for_page(pagination.current() - 1));
        let next_href = pagination.has_next().then(|| shown.href_for_page(pagination.current() + 1));

        let (loading, error, empty) = match &view.state {
            ListingState::Loading => (true, None, false),
            ListingState::Error(_) => (false, Some("Tidak dapat memuat daftar mobil. Silakan coba lagi.".to_string()), false),
            ListingState::Empty => (false, None, true),
            ListingState::Populated(_) => (false, None, false),
        };

        CarsTemplate {
            layout,
            form: FilterForm::new(&query.filters, options),
            sorts: SortOption::ALL
                .iter()
                .map(|&s| SortLink {
                    label: s.label(),
                    href: shown.href_for_sort(s),
                    selected: s == query.sort,
                })
                .collect(),
            summary: format!("Menampilkan {} dari {} mobil", view.cars().len(), view.total_count),
            loading,
            error,
            empty,
            cards: CarCard::list(view.cars(), contact),
            show_pagination: pagination.total_pages() > 1,
            previous_href,
            next_href,
            pages: pagination
                .links()
                .into_iter()
                .map(|link| PageLinkView {
                    label: link.label,
                    href: shown.href_for_page(link.index),
                    current: link.current,
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "car_detail.html")]
struct CarDetailTemplate {
    layout: Layout,
    title: String,
    price: String,
    market_price: Option<String>,
    sold: bool,
    gallery: GalleryView,
    description: Vec<String>,
    specs: Vec<Spec>,
    features: Vec<String>,
    comparison: Option<PriceComparison>,
    inquiry_link: String,
    similar: Vec<CarCard>,
}

pub async fn listing(State(app_state): State<AppState>, RawQuery(query): RawQuery) -> AppResult<impl IntoResponse> {
    let query = ListingQuery::from_query(query.as_deref().unwrap_or_default());
    tracing::info!("[HANDLER] /cars - Request received: {:?}, page {}", query.filters.criteria(), query.page);

    let settings = &app_state.settings;
    let layout = Layout::from_settings(settings, "/cars", "Mobil Kami");
    if !app_state.catalog.catalog().is_configured() {
        return Err(AppError::Unconfigured(layout));
    }

    // Each request addresses exactly one set of criteria, so its answer is
    // always the newest for this response
    let (view, options) = tokio::join!(
        load_listing(&app_state.catalog, &query, settings.page_size),
        app_state.catalog.filter_options()
    );
    let options = or_empty(options.into_result(), "filter options");

    tracing::debug!("[HANDLER] /cars - Showing {} of {} cars", view.cars().len(), view.total_count);
    let contact = Contact::from_settings(settings);
    render(CarsTemplate::new(layout, &query, &view, &options, &contact))
}

/// Commits the submitted form on top of the state it was rendered from.
pub async fn apply_filter(RawForm(body): RawForm) -> Redirect {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(&body).into_owned().collect();
    let committed = pairs
        .iter()
        .find(|(k, _)| k == COMMITTED_FIELD)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default();

    let mut state = FilterState::from_query(committed);
    state.apply_form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let commit = state.commit();
    tracing::info!("[HANDLER] /cars/filter - Committed filters: '{}'", commit.query);
    Redirect::to(&commit.location("/cars"))
}

pub async fn reset_filter() -> Redirect {
    let commit = FilterState::default().reset();
    tracing::info!("[HANDLER] /cars/reset - Filters cleared");
    Redirect::to(&commit.location("/cars"))
}

pub async fn detail(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /cars/:slug - Request received for '{}'", slug);
    let settings = &app_state.settings;
    let path = format!("/cars/{}", slug);

    if !app_state.catalog.catalog().is_configured() {
        return Err(AppError::Unconfigured(Layout::from_settings(settings, &path, "Mobil Kami")));
    }

    let car = match app_state.catalog.car(&slug).await {
        RequestState::Data(car) => match car.as_ref() {
            Some(car) => car.clone(),
            None => {
                tracing::info!("[HANDLER] /cars/:slug - No car with slug or id '{}'", slug);
                return Err(AppError::NotFound(Layout::from_settings(settings, &path, "Halaman Tidak Ditemukan")));
            }
        },
        RequestState::Error(e) => {
            return Err(AppError::Unavailable(Layout::from_settings(settings, &path, "Mobil Kami"), e));
        }
        RequestState::Loading => {
            return Err(AppError::Unavailable(
                Layout::from_settings(settings, &path, "Mobil Kami"),
                "car lookup did not resolve".to_string(),
            ));
        }
    };

    let similar = or_empty(
        app_state.catalog.similar_cars(&car, SIMILAR_CARS).await.into_result(),
        "similar cars",
    );

    let contact = Contact::from_settings(settings);
    let title = car.title();
    let gallery = Gallery::from_query(car.gallery_images(), query.as_deref().unwrap_or_default());
    let canonical = format!("/cars/{}", car.slug);

    render(CarDetailTemplate {
        layout: Layout::from_settings(settings, &canonical, &title).with_description(meta_description(&car)),
        gallery: gallery.view(&canonical, &title),
        price: crate::view::format_rupiah(car.price),
        market_price: car.discount().and(car.market_price).map(crate::view::format_rupiah),
        sold: car.sold,
        description: car
            .description
            .lines()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        specs: specifications(&car),
        features: car.features.clone(),
        // Sold cars no longer advertise savings
        comparison: if car.sold { None } else { PriceComparison::for_car(&car) },
        inquiry_link: contact.inquiry_link(&car),
        similar: CarCard::list(&similar, &contact),
        title,
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use scraper::{Html, Selector};

    use crate::routes::testing::{app, get, send, unconfigured_app};

    fn count(body: &str, selector: &str) -> usize {
        let document = Html::parse_document(body);
        let selector = Selector::parse(selector).unwrap();
        document.select(&selector).count()
    }

    fn texts(body: &str, selector: &str) -> Vec<String> {
        let document = Html::parse_document(body);
        let selector = Selector::parse(selector).unwrap();
        document
            .select(&selector)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .collect()
    }

    #[tokio::test]
    async fn listing_applies_committed_filters() {
        let (status, _, body) = get(app(), "/cars?make=Toyota&transmission=manual").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(texts(&body, ".car-card .car-title"), vec!["2015 Toyota Avanza"]);
        assert!(body.contains("Menampilkan 1 dari 1 mobil"));

        // The form reflects the committed state
        assert_eq!(count(&body, "select[name=make] option[selected]"), 1);
        assert_eq!(texts(&body, "select[name=model] option"), vec!["Semua Model", "Avanza", "Fortuner", "Yaris"]);
    }

    #[tokio::test]
    async fn listing_paginates_and_clamps() {
        let (_, _, body) = get(app(), "/cars").await;
        // Six unsold cars fit on one page of nine
        assert_eq!(count(&body, ".car-card"), 6);
        assert_eq!(count(&body, ".pagination"), 0);

        let (status, _, body) = get(app(), "/cars?page=9").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&body, ".car-card"), 6);
    }

    #[tokio::test]
    async fn listing_sorts_by_price() {
        let (_, _, body) = get(app(), "/cars?sort=price-low").await;
        let prices = texts(&body, ".car-card .car-price");
        assert_eq!(prices.first().map(String::as_str), Some("Rp 99.000.000"));
        assert_eq!(prices.last().map(String::as_str), Some("Rp 450.000.000"));
    }

    #[tokio::test]
    async fn empty_listing_says_so() {
        let (status, _, body) = get(app(), "/cars?make=Ferrari").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Tidak ada mobil yang ditemukan"));
        assert_eq!(count(&body, ".car-card"), 0);
    }

    #[tokio::test]
    async fn listing_without_a_store_shows_the_banner() {
        let (status, _, body) = get(unconfigured_app(), "/cars").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("Tidak dapat terhubung ke database"));
    }

    #[tokio::test]
    async fn changing_make_drops_the_stale_model() {
        let request = Request::post("/cars/filter")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "committed=make%3DToyota%26model%3DAvanza&make=Honda&model=Avanza&yearMin=&priceMax=300000000",
            ))
            .unwrap();
        let (status, location, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/cars?make=Honda&priceMax=300000000"));
    }

    #[tokio::test]
    async fn reset_goes_back_to_the_bare_listing() {
        let (status, location, _) = get(app(), "/cars/reset").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/cars"));
    }

    #[tokio::test]
    async fn detail_page_renders_car_and_similar_cars() {
        let (status, _, body) = get(app(), "/cars/toyota-avanza-c1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(texts(&body, "h1"), vec!["2018 Toyota Avanza"]);
        assert!(body.contains("Rp 150.000.000"));
        // Discount widget: 50 million off a 200 million market price
        assert!(body.contains("Rp 50.000.000"));
        assert!(body.contains("25%"));

        let similar = texts(&body, ".similar .car-card .car-title");
        assert!(!similar.is_empty());
        assert!(similar.iter().all(|t| t.contains("Toyota")));
        assert!(!similar.iter().any(|t| t == "2018 Toyota Avanza"));

        let document = Html::parse_document(&body);
        let inquiry = Selector::parse("a.inquiry").unwrap();
        let href = document.select(&inquiry).next().and_then(|a| a.value().attr("href")).unwrap();
        assert!(href.starts_with("https://wa.me/628119288855?text=Halo%2C%20saya%20tertarik"));
    }

    #[tokio::test]
    async fn sold_car_shows_notice_without_comparison() {
        let (status, _, body) = get(app(), "/cars/toyota-yaris-c4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&body, ".sold-notice"), 1);
        assert_eq!(count(&body, ".price-comparison"), 0);
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let (status, _, body) = get(app(), "/cars/no-such-car").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Halaman Tidak Ditemukan"));
    }
}
