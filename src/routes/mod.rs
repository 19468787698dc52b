// Route definitions

use askama::Template;
use axum::{
    response::Html,
    routing::{get, post},
    Router,
};

use crate::error::{AppError, AppResult};
use crate::AppState;

mod api;
mod cars;
mod static_pages;

pub fn create_router(app_state: AppState) -> Router {
    // JSON API over the same cached catalog as the pages
    let api_router = Router::new()
        .route("/cars", get(api::list_cars))
        .route("/cars/:key", get(api::get_car))
        .route("/filter-options", get(api::filter_options))
        .route("/testimonials", get(api::list_testimonials))
        .route("/health", get(api::health))
        .with_state(app_state.clone());

    Router::new()
        .route("/", get(static_pages::home))
        .route("/about", get(static_pages::about))
        .route("/contact", get(static_pages::contact))
        .route("/testimonials", get(static_pages::testimonials))
        .route("/cars", get(cars::listing))
        .route("/cars/filter", post(cars::apply_filter))
        .route("/cars/reset", get(cars::reset_filter))
        .route("/cars/:slug", get(cars::detail))
        .nest("/api", api_router)
        .fallback(static_pages::not_found)
        .with_state(app_state)
}

// Renders a page template, logging failures before they become a 500
fn render<T: Template>(template: T) -> AppResult<Html<String>> {
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!("Failed to render {} template: {}", std::any::type_name::<T>(), e);
            Err(AppError::InternalServerError(anyhow::Error::new(e)))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::catalog::fixtures;
    use crate::config::Settings;
    use crate::store::StoreHandle;
    use crate::AppState;

    pub fn app() -> Router {
        super::create_router(AppState::new(Settings::defaults(), fixtures::handle()))
    }

    pub fn unconfigured_app() -> Router {
        super::create_router(AppState::new(Settings::defaults(), StoreHandle::Unconfigured))
    }

    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, location, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }
}
