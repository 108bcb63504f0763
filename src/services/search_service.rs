//! Azure Cognitive Search client over the Search REST API.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::models::{AccessLevel, Archive};
use crate::utils::{escape_odata, AppError};

const SEARCH_API_VERSION: &str = "2023-11-01";
pub const SUGGESTER_NAME: &str = "sg";

/// Document shape pushed to and read back from the search index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub access_level: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl From<&Archive> for SearchDocument {
    fn from(a: &Archive) -> Self {
        SearchDocument {
            id: a.id_hex(),
            name: Some(a.name.clone()),
            title: a.metadata.title.clone(),
            author: a.metadata.author.clone(),
            region: a.metadata.region.clone(),
            document_type: a.metadata.document_type.clone(),
            date: a.metadata.date.clone(),
            keywords: a.metadata.keywords.clone(),
            content: a.content_text.clone(),
            content_url: a.content_url.clone(),
            file_type: a.file_type.clone(),
            access_level: Some(a.access_level.as_str().to_string()),
            parent_id: a.parent_id.map(|id| id.to_hex()),
        }
    }
}

#[derive(Serialize)]
struct IndexAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    document: &'a SearchDocument,
}

#[derive(Serialize)]
struct DeleteAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    id: &'a str,
}

#[derive(Serialize)]
struct Batch<T> {
    value: Vec<T>,
}

/// Optional equality filters accepted by the search endpoint
#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub region: Option<String>,
    pub document_type: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "@search.score", default)]
    pub score: f64,
    #[serde(rename = "@search.highlights", default)]
    pub highlights: HashMap<String, Vec<String>>,
    #[serde(flatten)]
    pub document: SearchDocument,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(rename = "@odata.count", default)]
    count: Option<u64>,
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug)]
pub struct SearchPage {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SuggestResponseBody {
    #[serde(default)]
    value: Vec<SuggestHit>,
}

#[derive(Debug, Deserialize)]
struct SuggestHit {
    #[serde(rename = "@search.text")]
    text: String,
}

/// Builds the OData `$filter` for a query; anonymous callers only see public documents
pub fn build_filter(filters: &SearchFilters, include_private: bool) -> Option<String> {
    let mut clauses = Vec::new();

    let fields = [
        ("region", &filters.region),
        ("documentType", &filters.document_type),
        ("author", &filters.author),
    ];
    for (field, value) in fields {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            clauses.push(format!("{} eq '{}'", field, escape_odata(v)));
        }
    }

    if !include_private {
        clauses.push(format!("accessLevel eq '{}'", AccessLevel::Public.as_str()));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    }
}

#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    index: String,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            index: config.index.clone(),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.endpoint, self.index, suffix, SEARCH_API_VERSION
        )
    }

    pub async fn search(
        &self,
        text: &str,
        filter: Option<String>,
        skip: u64,
        top: u64,
    ) -> Result<SearchPage, AppError> {
        let query = if text.trim().is_empty() { "*" } else { text.trim() };

        let mut body = serde_json::json!({
            "search": query,
            "count": true,
            "skip": skip,
            "top": top,
            "searchMode": "all",
            "highlight": "content,title",
            "highlightPreTag": "<mark>",
            "highlightPostTag": "</mark>",
        });
        if let Some(f) = filter {
            body["filter"] = serde_json::Value::String(f);
        }

        log::debug!("🔎 Azure Search query: {}", body);

        let response = self
            .http
            .post(self.url("/docs/search"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!("Azure Search returned {}: {}", status, detail)));
        }

        let parsed: SearchResponseBody = response.json().await?;
        Ok(SearchPage {
            total: parsed.count.unwrap_or(parsed.value.len() as u64),
            hits: parsed.value,
        })
    }

    pub async fn suggest(&self, text: &str, top: usize, include_private: bool) -> Result<Vec<String>, AppError> {
        let mut body = serde_json::json!({
            "search": text,
            "suggesterName": SUGGESTER_NAME,
            "top": top,
            "fuzzy": true,
        });
        if let Some(f) = build_filter(&SearchFilters::default(), include_private) {
            body["filter"] = serde_json::Value::String(f);
        }

        let response = self
            .http
            .post(self.url("/docs/suggest"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Azure Search suggest returned {}",
                response.status()
            )));
        }

        let parsed: SuggestResponseBody = response.json().await?;
        Ok(parsed.value.into_iter().map(|hit| hit.text).collect())
    }

    /// Adds or updates documents in the index
    pub async fn index_documents(&self, documents: &[SearchDocument]) -> Result<(), AppError> {
        if documents.is_empty() {
            return Ok(());
        }
        let batch = Batch {
            value: documents
                .iter()
                .map(|document| IndexAction { action: "mergeOrUpload", document })
                .collect(),
        };
        self.post_batch(&batch).await?;
        log::info!("🔎 Indexed {} document(s)", documents.len());
        Ok(())
    }

    pub async fn delete_documents(&self, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let batch = Batch {
            value: ids
                .iter()
                .map(|id| DeleteAction { action: "delete", id: id.as_str() })
                .collect(),
        };
        self.post_batch(&batch).await?;
        log::info!("🔎 Removed {} document(s) from index", ids.len());
        Ok(())
    }

    async fn post_batch<T: Serialize>(&self, batch: &Batch<T>) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("/docs/index"))
            .header("api-key", &self.api_key)
            .json(batch)
            .send()
            .await?;

        // 207 means some documents in the batch failed
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(AppError::External(format!("Azure Search indexing returned {}", status))),
        }
    }

    /// Creates the index (with the suggester) when it does not exist
    pub async fn ensure_index(&self) -> Result<(), AppError> {
        let existing = self
            .http
            .get(self.url(""))
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if existing.status().is_success() {
            log::info!("🔎 Search index '{}' ready", self.index);
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            return Err(AppError::External(format!(
                "Azure Search index lookup returned {}",
                existing.status()
            )));
        }

        let response = self
            .http
            .put(self.url(""))
            .header("api-key", &self.api_key)
            .json(&index_definition(&self.index))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Azure Search index creation returned {}",
                response.status()
            )));
        }

        log::info!("🔎 Created search index '{}'", self.index);
        Ok(())
    }
}

fn index_definition(name: &str) -> serde_json::Value {
    fn field(name: &str, searchable: bool, filterable: bool) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "type": "Edm.String",
            "searchable": searchable,
            "filterable": filterable,
            "retrievable": true,
        })
    }

    serde_json::json!({
        "name": name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "filterable": true },
            field("name", true, false),
            field("title", true, false),
            field("author", true, true),
            field("region", true, true),
            field("documentType", true, true),
            field("date", false, true),
            { "name": "keywords", "type": "Collection(Edm.String)", "searchable": true, "filterable": true },
            field("content", true, false),
            field("contentUrl", false, false),
            field("fileType", false, true),
            field("accessLevel", false, true),
            field("parentId", false, true),
        ],
        "suggesters": [
            {
                "name": SUGGESTER_NAME,
                "searchMode": "analyzingInfixMatching",
                "sourceFields": ["name", "title", "author", "keywords"]
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveKind, ArchiveMetadata};
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn anonymous_filter_restricts_to_public() {
        let filter = build_filter(&SearchFilters::default(), false);
        assert_eq!(filter.as_deref(), Some("accessLevel eq 'public'"));
        assert_eq!(build_filter(&SearchFilters::default(), true), None);
    }

    #[test]
    fn filters_are_joined_and_escaped() {
        let filters = SearchFilters {
            region: Some("Côte d'Ivoire".into()),
            document_type: Some("Constitution".into()),
            author: Some("  ".into()),
        };
        assert_eq!(
            build_filter(&filters, false).unwrap(),
            "region eq 'Côte d''Ivoire' and documentType eq 'Constitution' and accessLevel eq 'public'"
        );
    }

    #[test]
    fn index_action_flattens_document() {
        let doc = SearchDocument {
            id: "abc".into(),
            title: Some("Bill of Rights".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(IndexAction { action: "mergeOrUpload", document: &doc }).unwrap();
        assert_eq!(json["@search.action"], "mergeOrUpload");
        assert_eq!(json["id"], "abc");
        assert_eq!(json["title"], "Bill of Rights");
    }

    #[test]
    fn parses_search_response() {
        let raw = serde_json::json!({
            "@odata.count": 42,
            "value": [{
                "@search.score": 3.5,
                "@search.highlights": { "content": ["the <mark>court</mark>"] },
                "id": "65f0c0ffee",
                "title": "Judiciary",
                "keywords": ["courts"]
            }]
        });
        let body: SearchResponseBody = serde_json::from_value(raw).unwrap();
        assert_eq!(body.count, Some(42));
        assert_eq!(body.value[0].score, 3.5);
        assert_eq!(body.value[0].document.title.as_deref(), Some("Judiciary"));
        assert_eq!(body.value[0].highlights["content"][0], "the <mark>court</mark>");
    }

    #[test]
    fn document_from_archive_copies_metadata() {
        let mut archive = Archive::directory(
            "kenya-2010.pdf".into(),
            Some(ObjectId::new()),
            AccessLevel::Private,
            ArchiveMetadata {
                title: Some("Constitution of Kenya".into()),
                keywords: vec!["devolution".into()],
                ..Default::default()
            },
            None,
        );
        archive.id = Some(ObjectId::new());
        archive.kind = ArchiveKind::File;
        archive.content_text = Some("We, the people of Kenya".into());

        let doc = SearchDocument::from(&archive);
        assert_eq!(doc.id, archive.id_hex());
        assert_eq!(doc.access_level.as_deref(), Some("private"));
        assert_eq!(doc.keywords, vec!["devolution"]);
        assert_eq!(doc.content.as_deref(), Some("We, the people of Kenya"));
    }

    #[test]
    fn index_definition_declares_suggester() {
        let def = index_definition("archives-index");
        assert_eq!(def["suggesters"][0]["name"], SUGGESTER_NAME);
        assert_eq!(def["fields"][0]["key"], true);
    }
}
