// Marketing pages: home, about, contact, testimonials and the 404 fallback.
// Catalog reads on these pages degrade to empty sections instead of failing.

use askama::Template;
use axum::{extract::State, http::Uri, response::IntoResponse};

use super::render;
use crate::catalog::or_empty;
use crate::error::{AppError, AppResult};
use crate::view::{CarCard, Contact, Layout, TestimonialCard};
use crate::AppState;

const FEATURED_CARS: u64 = 6;
const HOME_TESTIMONIALS: u64 = 6;
const TESTIMONIALS_PAGE_LIMIT: u64 = 30;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    layout: Layout,
    configured: bool,
    cars: Vec<CarCard>,
    testimonials: Vec<TestimonialCard>,
}

#[derive(Template)]
#[template(path = "about.html")]
struct AboutTemplate {
    layout: Layout,
}

#[derive(Template)]
#[template(path = "contact.html")]
struct ContactTemplate {
    layout: Layout,
    email: &'static str,
    maps_link: &'static str,
}

#[derive(Template)]
#[template(path = "testimonials.html")]
struct TestimonialsTemplate {
    layout: Layout,
    configured: bool,
    testimonials: Vec<TestimonialCard>,
}

pub async fn home(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] / - Request received.");
    let settings = &app_state.settings;
    let contact = Contact::from_settings(settings);

    let (cars, testimonials) = tokio::join!(
        app_state.catalog.featured_cars(FEATURED_CARS),
        app_state.catalog.testimonials(HOME_TESTIMONIALS)
    );
    let cars = or_empty(cars.into_result(), "featured cars");
    let testimonials = or_empty(testimonials.into_result(), "testimonials");

    render(HomeTemplate {
        layout: Layout::from_settings(settings, "/", ""),
        configured: app_state.catalog.catalog().is_configured(),
        cars: CarCard::list(&cars.items, &contact),
        testimonials: testimonials.iter().map(TestimonialCard::new).collect(),
    })
}

pub async fn about(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /about - Request received.");
    render(AboutTemplate {
        layout: Layout::from_settings(&app_state.settings, "/about", "Tentang Kami"),
    })
}

pub async fn contact(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /contact - Request received.");
    render(ContactTemplate {
        layout: Layout::from_settings(&app_state.settings, "/contact", "Hubungi Kami"),
        email: "powerauto.id@gmail.com",
        maps_link: "https://maps.app.goo.gl/MrarwqXy3gih1T396",
    })
}

pub async fn testimonials(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /testimonials - Request received.");
    let testimonials = or_empty(
        app_state.catalog.testimonials(TESTIMONIALS_PAGE_LIMIT).await.into_result(),
        "testimonials",
    );
    render(TestimonialsTemplate {
        layout: Layout::from_settings(&app_state.settings, "/testimonials", "Testimonial Pelanggan"),
        configured: app_state.catalog.catalog().is_configured(),
        testimonials: testimonials.iter().map(TestimonialCard::new).collect(),
    })
}

pub async fn not_found(State(app_state): State<AppState>, uri: Uri) -> AppError {
    tracing::info!("[HANDLER] No route for {}", uri.path());
    AppError::NotFound(Layout::from_settings(&app_state.settings, uri.path(), "Halaman Tidak Ditemukan"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use scraper::{Html, Selector};

    use crate::routes::testing::{app, get, unconfigured_app};

    #[tokio::test]
    async fn home_shows_newest_unsold_cars_and_testimonials() {
        let (status, _, body) = get(app(), "/").await;
        assert_eq!(status, StatusCode::OK);

        let document = Html::parse_document(&body);
        let cards = Selector::parse(".car-card").unwrap();
        assert_eq!(document.select(&cards).count(), 6);
        assert!(!body.contains("Toyota Yaris"), "sold cars are not featured");

        let quotes = Selector::parse(".testimonial").unwrap();
        assert_eq!(document.select(&quotes).count(), 3);
    }

    #[tokio::test]
    async fn home_without_a_store_still_renders() {
        let (status, _, body) = get(unconfigured_app(), "/").await;
        assert_eq!(status, StatusCode::OK);
        let document = Html::parse_document(&body);
        let banner = Selector::parse(".connection-error").unwrap();
        assert_eq!(document.select(&banner).count(), 1);
    }

    #[tokio::test]
    async fn static_pages_render() {
        for (path, marker) in [
            ("/about", "Sejarah Kami"),
            ("/contact", "Informasi Kontak"),
            ("/testimonials", "Testimonial"),
        ] {
            let (status, _, body) = get(app(), path).await;
            assert_eq!(status, StatusCode::OK, "{}", path);
            assert!(body.contains(marker), "{} should mention {}", path, marker);
        }
    }

    #[tokio::test]
    async fn unknown_paths_get_the_not_found_page() {
        let (status, _, body) = get(app(), "/no/such/page").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Halaman Tidak Ditemukan"));
    }
}
