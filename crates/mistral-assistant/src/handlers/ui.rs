use axum::http::header;
use axum::response::{Html, IntoResponse};

use crate::presentation::INDEX_HTML;

/// GET /
pub async fn index() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache, no-store")],
        Html(INDEX_HTML),
    )
}
