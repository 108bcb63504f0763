use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::middleware::MaybeUser;
use crate::services::search_service::{build_filter, SearchFilters, SearchHit};
use crate::state::AppState;
use crate::utils::{AppError, Pagination};

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub region: Option<String>,
    pub document_type: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub region: Option<String>,
    pub document_type: Option<String>,
    pub date: Option<String>,
    pub content_url: Option<String>,
    pub file_type: Option<String>,
    pub score: f64,
    pub highlights: Vec<String>,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        // Fragments from every highlighted field, in field-name order so output is stable
        let mut fields: Vec<_> = hit.highlights.into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let highlights = fields.into_iter().flat_map(|(_, fragments)| fragments).collect();

        let doc = hit.document;
        SearchResult {
            id: doc.id,
            name: doc.name,
            title: doc.title,
            author: doc.author,
            region: doc.region,
            document_type: doc.document_type,
            date: doc.date,
            content_url: doc.content_url,
            file_type: doc.file_type,
            score: hit.score,
            highlights,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/search",
    tag = "Search",
    params(
        ("q" = Option<String>, Query, description = "Full-text query; empty matches everything"),
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "Page size (max 50)"),
        ("region" = Option<String>, Query, description = "Exact region"),
        ("documentType" = Option<String>, Query, description = "Exact document type"),
        ("author" = Option<String>, Query, description = "Exact author")
    ),
    responses(
        (status = 200, description = "Ranked results", body = [SearchResult]),
        (status = 503, description = "Search not configured")
    )
)]
pub async fn search(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let client = state.search()?;
    let pagination = Pagination::new(query.page, query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let text = query.q.as_deref().unwrap_or("").trim();

    log::info!("🔎 GET /search - q: '{}', page: {}", text, pagination.page);

    let filters = SearchFilters {
        region: query.region.clone(),
        document_type: query.document_type.clone(),
        author: query.author.clone(),
    };
    let filter = build_filter(&filters, user.can_see_private());

    let page = client
        .search(text, filter, pagination.skip(), pagination.limit)
        .await?;

    let results: Vec<SearchResult> = page.hits.into_iter().map(SearchResult::from).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "results": results,
        "total": page.total,
        "page": pagination.page,
        "limit": pagination.limit
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search_service::SearchDocument;
    use actix_web::{test as actix_test, App};
    use std::collections::HashMap;

    #[actix_web::test]
    async fn unconfigured_search_is_unavailable() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::for_tests().await))
                .route("/api/search", web::get().to(search)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api/search?q=rights").to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), 503);
        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["success"], false);
    }

    #[test]
    fn hit_flattens_highlights() {
        let mut highlights = HashMap::new();
        highlights.insert("title".to_string(), vec!["<mark>Bill</mark> of Rights".to_string()]);
        highlights.insert("content".to_string(), vec!["the <mark>bill</mark>".to_string()]);

        let hit = SearchHit {
            score: 1.5,
            highlights,
            document: SearchDocument {
                id: "abc".into(),
                title: Some("Bill of Rights".into()),
                ..Default::default()
            },
        };

        let result = SearchResult::from(hit);
        assert_eq!(result.id, "abc");
        assert_eq!(result.highlights, vec!["the <mark>bill</mark>", "<mark>Bill</mark> of Rights"]);
        assert_eq!(result.score, 1.5);
    }
}
