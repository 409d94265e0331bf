use axum::Json;
use serde::Serialize;

use crate::presentation::EXAMPLE_PROMPTS;

#[derive(Serialize)]
pub struct ExamplesResponse {
    examples: &'static [&'static str],
}

/// GET /api/v1/examples
pub async fn list_examples() -> Json<ExamplesResponse> {
    Json(ExamplesResponse {
        examples: EXAMPLE_PROMPTS,
    })
}
