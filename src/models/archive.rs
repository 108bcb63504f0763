use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;
use crate::utils::format_file_size;

pub const ARCHIVES_COLLECTION: &str = "archives";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Public,
    Private,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Some(AccessLevel::Public),
            "private" => Some(AccessLevel::Private),
            _ => None,
        }
    }
}

/// Descriptive metadata attached to an archive entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

impl ArchiveMetadata {
    /// Trims every field, drops blanks and de-duplicates keywords.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        let mut keywords: Vec<String> = Vec::new();
        for kw in self.keywords {
            let kw = kw.trim().to_string();
            if !kw.is_empty() && !keywords.iter().any(|k| k.eq_ignore_ascii_case(&kw)) {
                keywords.push(kw);
            }
        }

        Self {
            region: clean(self.region),
            keywords,
            title: clean(self.title),
            author: clean(self.author),
            date: clean(self.date),
            document_type: clean(self.document_type),
        }
    }
}

/// File or directory record in the archive tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArchiveKind,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    #[serde(default)]
    pub children: Vec<ObjectId>,
    #[serde(default)]
    pub metadata: ArchiveMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ObjectId>,
    #[serde(default)]
    pub access_level: AccessLevel,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Archive {
    pub fn directory(
        name: String,
        parent_id: Option<ObjectId>,
        access_level: AccessLevel,
        metadata: ArchiveMetadata,
        created_by: Option<ObjectId>,
    ) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            name,
            kind: ArchiveKind::Directory,
            parent_id,
            children: Vec::new(),
            metadata,
            content_url: None,
            blob_name: None,
            content_text: None,
            file_size: None,
            file_type: None,
            created_by,
            access_level,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file(
        name: String,
        parent_id: Option<ObjectId>,
        access_level: AccessLevel,
        metadata: ArchiveMetadata,
        created_by: Option<ObjectId>,
    ) -> Self {
        Self {
            kind: ArchiveKind::File,
            ..Self::directory(name, parent_id, access_level, metadata, created_by)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ArchiveKind::Directory
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArchiveKind,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub metadata: ArchiveMetadata,
    pub content_url: Option<String>,
    pub file_size: Option<i64>,
    pub file_size_label: Option<String>,
    pub file_type: Option<String>,
    pub created_by: Option<String>,
    pub access_level: AccessLevel,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Archive> for ArchiveResponse {
    fn from(a: Archive) -> Self {
        ArchiveResponse {
            id: a.id_hex(),
            name: a.name,
            kind: a.kind,
            parent_id: a.parent_id.map(|id| id.to_hex()),
            children: a.children.iter().map(|id| id.to_hex()).collect(),
            metadata: a.metadata,
            content_url: a.content_url,
            file_size: a.file_size,
            file_size_label: a.file_size.map(|size| format_file_size(size.max(0) as u64)),
            file_type: a.file_type,
            created_by: a.created_by.map(|id| id.to_hex()),
            access_level: a.access_level,
            created_at: format_datetime(a.created_at),
            updated_at: format_datetime(a.updated_at),
        }
    }
}

/// One step of a breadcrumb trail
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Breadcrumb {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryRequest {
    pub name: String,
    pub parent_id: Option<String>,
    pub access_level: Option<AccessLevel>,
    pub metadata: Option<ArchiveMetadata>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArchiveRequest {
    pub name: Option<String>,
    pub access_level: Option<AccessLevel>,
    pub metadata: Option<ArchiveMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListArchivesQuery {
    pub parent_id: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolvePathQuery {
    pub path: String,
}
