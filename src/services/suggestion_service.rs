use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use serde::Serialize;

use crate::database::MongoDB;
use crate::models::{AccessLevel, Archive, ARCHIVES_COLLECTION};
use crate::services::search_service::SearchClient;
use crate::utils::{escape_regex, AppError};

pub const MIN_QUERY_LEN: usize = 2;
pub const DEFAULT_LIMIT: usize = 8;
pub const MAX_LIMIT: usize = 20;

#[derive(Debug, Serialize, PartialEq, utoipa::ToSchema)]
pub struct Suggestions {
    pub suggestions: Vec<String>,
    /// True when one of the sources failed and results are partial
    pub degraded: bool,
}

/// Merges suggestion lists in priority order: trims, drops blanks,
/// de-duplicates case-insensitively keeping the first spelling, truncates.
pub fn merge_suggestions(sources: &[Vec<String>], limit: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut merged = Vec::new();

    for candidate in sources.iter().flatten() {
        if merged.len() >= limit {
            break;
        }
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        merged.push(trimmed.to_string());
    }

    merged
}

/// Picks the strings from an archive entry that actually matched the query
fn matching_terms(archive: &Archive, needle: &str) -> Vec<String> {
    let mut terms = Vec::new();
    if let Some(title) = &archive.metadata.title {
        if title.to_lowercase().contains(needle) {
            terms.push(title.clone());
        }
    }
    if archive.name.to_lowercase().contains(needle) {
        terms.push(archive.name.clone());
    }
    for keyword in &archive.metadata.keywords {
        if keyword.to_lowercase().contains(needle) {
            terms.push(keyword.clone());
        }
    }
    terms
}

async fn mongo_suggestions(db: &MongoDB, query: &str, limit: usize, include_private: bool) -> Result<Vec<String>, AppError> {
    let pattern = escape_regex(query);
    let regex = doc! { "$regex": &pattern, "$options": "i" };

    let mut filter: Document = doc! {
        "$or": [
            { "name": regex.clone() },
            { "metadata.title": regex.clone() },
            { "metadata.keywords": regex },
        ]
    };
    if !include_private {
        filter.insert("accessLevel", AccessLevel::Public.as_str());
    }

    let archives: Vec<Archive> = db
        .collection::<Archive>(ARCHIVES_COLLECTION)
        .find(filter)
        .limit(limit as i64)
        .await?
        .try_collect()
        .await?;

    let needle = query.to_lowercase();
    Ok(archives.iter().flat_map(|a| matching_terms(a, &needle)).collect())
}

/// Suggestions from Azure Search first, then MongoDB keyword matches. Both sources are queried together.
///
/// A failing source is logged and skipped; the call only fails when every
/// configured source failed.
pub async fn get_suggestions(
    db: &MongoDB,
    search: Option<&SearchClient>,
    query: &str,
    limit: usize,
    include_private: bool,
) -> Result<Suggestions, AppError> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(Suggestions { suggestions: Vec::new(), degraded: false });
    }
    let limit = limit.clamp(1, MAX_LIMIT);

    let azure = async {
        match search {
            Some(client) => Some(client.suggest(query, limit, include_private).await),
            None => None,
        }
    };
    let (azure, mongo) = futures::join!(azure, mongo_suggestions(db, query, limit, include_private));

    combine(azure, mongo, limit)
}

fn combine(
    azure: Option<Result<Vec<String>, AppError>>,
    mongo: Result<Vec<String>, AppError>,
    limit: usize,
) -> Result<Suggestions, AppError> {
    let mut sources = Vec::new();
    let mut failures = 0;
    let mut attempted = 1;

    if let Some(result) = azure {
        attempted += 1;
        match result {
            Ok(list) => sources.push(list),
            Err(e) => {
                log::warn!("⚠️  Azure suggestions unavailable: {}", e);
                failures += 1;
            }
        }
    }
    match mongo {
        Ok(list) => sources.push(list),
        Err(e) => {
            log::warn!("⚠️  MongoDB suggestions unavailable: {}", e);
            failures += 1;
        }
    }

    if failures == attempted {
        return Err(AppError::Internal("All suggestion sources failed".to_string()));
    }

    Ok(Suggestions {
        suggestions: merge_suggestions(&sources, limit),
        degraded: failures > 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArchiveMetadata;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_dedupes_case_insensitively_in_priority_order() {
        let azure = strings(&["Bill of Rights", "Judiciary"]);
        let mongo = strings(&["bill of rights", "  Judiciary ", "Parliament", ""]);
        assert_eq!(
            merge_suggestions(&[azure, mongo], 10),
            strings(&["Bill of Rights", "Judiciary", "Parliament"])
        );
    }

    #[test]
    fn merge_truncates_to_limit() {
        let list = strings(&["a1", "a2", "a3", "a4"]);
        assert_eq!(merge_suggestions(&[list], 2), strings(&["a1", "a2"]));
    }

    #[test]
    fn one_failing_source_degrades() {
        let result = combine(
            Some(Err(AppError::External("timeout".into()))),
            Ok(strings(&["Kenya"])),
            5,
        )
        .unwrap();
        assert!(result.degraded);
        assert_eq!(result.suggestions, strings(&["Kenya"]));
    }

    #[test]
    fn all_sources_failing_is_an_error() {
        let result = combine(
            Some(Err(AppError::External("timeout".into()))),
            Err(AppError::Database("down".into())),
            5,
        );
        assert!(result.is_err());

        assert!(combine(None, Err(AppError::Database("down".into())), 5).is_err());
    }

    #[test]
    fn mongo_only_is_not_degraded() {
        let result = combine(None, Ok(strings(&["Ghana"])), 5).unwrap();
        assert!(!result.degraded);
    }

    #[test]
    fn matching_terms_only_returns_hits() {
        let archive = Archive::directory(
            "Ghana 1992".into(),
            None,
            AccessLevel::Public,
            ArchiveMetadata {
                title: Some("Fourth Republic Constitution".into()),
                keywords: vec!["republic".into(), "chieftaincy".into()],
                ..Default::default()
            },
            None,
        );
        assert_eq!(
            matching_terms(&archive, "republic"),
            strings(&["Fourth Republic Constitution", "republic"])
        );
    }
    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn mongo_source_answers_without_search() {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/archive_test".to_string());
        let db = MongoDB::new(&uri).await.expect("Failed to connect to MongoDB");

        let marker = format!("Zanzibar {}", mongodb::bson::oid::ObjectId::new().to_hex());
        let archive = Archive::directory(
            marker.clone(),
            None,
            AccessLevel::Public,
            ArchiveMetadata::default(),
            None,
        );
        let coll = db.collection::<Archive>(ARCHIVES_COLLECTION);
        let id = coll.insert_one(&archive).await.unwrap().inserted_id;

        let result = get_suggestions(&db, None, &marker, 5, false).await.unwrap();
        assert!(!result.degraded);
        assert_eq!(result.suggestions, vec![marker]);

        coll.delete_one(doc! { "_id": id }).await.unwrap();
    }
}
