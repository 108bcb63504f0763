use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::middleware::MaybeUser;
use crate::services::suggestion_service::{self, Suggestions, DEFAULT_LIMIT};
use crate::state::AppState;
use crate::utils::AppError;

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/suggestions",
    tag = "Search",
    params(
        ("q" = String, Query, description = "Prefix typed so far; under 2 characters yields nothing"),
        ("limit" = Option<usize>, Query, description = "Maximum suggestions (default 8, max 20)")
    ),
    responses(
        (status = 200, description = "Merged suggestions", body = Suggestions),
        (status = 500, description = "Every suggestion source failed")
    )
)]
pub async fn suggestions(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<SuggestionQuery>,
) -> Result<HttpResponse, AppError> {
    log::debug!("💡 GET /suggestions - q: '{}'", query.q);

    let result = suggestion_service::get_suggestions(
        &state.db,
        state.search.as_ref(),
        &query.q,
        query.limit.unwrap_or(DEFAULT_LIMIT),
        user.can_see_private(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "suggestions": result.suggestions,
        "degraded": result.degraded
    })))
}
