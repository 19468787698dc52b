// Error types for handlers. Page handlers return `AppError`, which renders a
// full error page; JSON handlers return `ApiError`, which renders `{"error"}`.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::catalog::CatalogError;
use crate::view::Layout;

#[derive(Debug)]
pub enum AppError {
    NotFound(Layout),
    /// No store credentials were configured at startup.
    Unconfigured(Layout),
    /// The store could not be reached for a page that cannot degrade.
    Unavailable(Layout, String),
    InternalServerError(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::InternalServerError(error)
    }
}

impl From<askama::Error> for AppError {
    fn from(error: askama::Error) -> Self {
        AppError::InternalServerError(anyhow::Error::new(error))
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "unavailable.html")]
pub struct UnavailableTemplate {
    pub layout: Layout,
    pub heading: &'static str,
    pub configured: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, rendered) = match self {
            AppError::NotFound(layout) => (StatusCode::NOT_FOUND, NotFoundTemplate { layout }.render()),
            AppError::Unconfigured(layout) => {
                tracing::warn!("Page requested while the catalog store is not configured");
                let page = UnavailableTemplate {
                    layout,
                    heading: "Tidak dapat terhubung ke database",
                    configured: false,
                };
                (StatusCode::SERVICE_UNAVAILABLE, page.render())
            }
            AppError::Unavailable(layout, reason) => {
                tracing::error!("Catalog store unavailable: {}", reason);
                let page = UnavailableTemplate {
                    layout,
                    heading: "Terjadi gangguan koneksi",
                    configured: true,
                };
                (StatusCode::SERVICE_UNAVAILABLE, page.render())
            }
            AppError::InternalServerError(e) => {
                tracing::error!("Internal server error: {:?}", e);
                // Don't expose internal details to the client
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
            }
        };

        match rendered {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                (status, status.canonical_reason().unwrap_or("Error")).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Error body of the JSON API.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        tracing::warn!("API request failed: {}", error);
        ApiError::unavailable(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
