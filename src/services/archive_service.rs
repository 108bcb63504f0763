use std::collections::HashSet;

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;

use crate::database::{parse_object_id, MongoDB};
use crate::models::{
    AccessLevel, Archive, ArchiveMetadata, Breadcrumb, CreateDirectoryRequest,
    UpdateArchiveRequest, ARCHIVES_COLLECTION,
};
use crate::services::blob_service::{blob_name_for, BlobContent};
use crate::services::search_service::SearchDocument;
use crate::state::AppState;
use crate::utils::{breadcrumb_paths, AppError, Page, Pagination};

/// Bound on ancestor walks and subtree traversal
pub const MAX_TREE_DEPTH: usize = 64;
const MAX_NAME_LEN: usize = 255;
const MAX_CONTENT_TEXT_CHARS: usize = 32_000;

/// A file received from the upload form
#[derive(Debug, Default)]
pub struct UploadInput {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub access_level: Option<AccessLevel>,
    pub metadata: ArchiveMetadata,
}

pub fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    if name.contains('/') {
        return Err(AppError::BadRequest("Name cannot contain '/'".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!("Name cannot exceed {} characters", MAX_NAME_LEN)));
    }
    Ok(name.to_string())
}

/// `None`, empty, `"root"` and `"null"` all address the top level
pub fn parse_parent_param(raw: Option<&str>) -> Result<Option<ObjectId>, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("root") | Some("null") => Ok(None),
        Some(id) => parse_object_id(id, "parent").map(Some),
    }
}

/// Plain-text extraction for text-like uploads, used for indexing and preview
pub fn extract_text(content_type: &str, file_name: &str, bytes: &[u8]) -> Option<String> {
    let ct = content_type.to_ascii_lowercase();
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();

    let texty = ct.starts_with("text/")
        || ct == "application/json"
        || ct == "application/xml"
        || matches!(ext.as_str(), "txt" | "md" | "csv" | "json" | "xml" | "html" | "htm");
    if !texty || bytes.is_empty() {
        return None;
    }

    let text: String = String::from_utf8_lossy(bytes).chars().take(MAX_CONTENT_TEXT_CHARS).collect();
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn visibility(include_private: bool) -> Document {
    if include_private {
        doc! {}
    } else {
        doc! { "accessLevel": AccessLevel::Public.as_str() }
    }
}

fn collection(db: &MongoDB) -> mongodb::Collection<Archive> {
    db.collection::<Archive>(ARCHIVES_COLLECTION)
}

pub async fn find_visible(db: &MongoDB, id: ObjectId, include_private: bool) -> Result<Archive, AppError> {
    let mut filter = visibility(include_private);
    filter.insert("_id", id);
    collection(db)
        .find_one(filter)
        .await?
        .ok_or_else(|| AppError::NotFound("Archive entry not found".to_string()))
}

pub async fn get_archive(db: &MongoDB, id: &str, include_private: bool) -> Result<Archive, AppError> {
    let id = parse_object_id(id, "archive")?;
    find_visible(db, id, include_private).await
}

/// Children of a directory (or the root): directories first, then by name
pub async fn list_children(
    db: &MongoDB,
    parent: Option<&str>,
    pagination: Pagination,
    include_private: bool,
) -> Result<Page<Archive>, AppError> {
    let parent_id = parse_parent_param(parent)?;

    if let Some(pid) = parent_id {
        let dir = find_visible(db, pid, include_private).await?;
        if !dir.is_directory() {
            return Err(AppError::BadRequest("Parent is not a directory".to_string()));
        }
    }

    let mut filter = visibility(include_private);
    filter.insert("parentId", parent_id.map(Bson::ObjectId).unwrap_or(Bson::Null));

    let coll = collection(db);
    let total = coll.count_documents(filter.clone()).await?;
    let items: Vec<Archive> = coll
        .find(filter)
        .sort(doc! { "type": 1, "name": 1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;

    Ok(Page::new(items, total, pagination))
}

/// Breadcrumb for an ancestor, refusing ancestors the caller cannot see
fn ancestor_crumb(parent: &Archive, include_private: bool) -> Result<Breadcrumb, AppError> {
    if !include_private && parent.access_level != AccessLevel::Public {
        return Err(AppError::NotFound("Archive entry not found".to_string()));
    }
    Ok(Breadcrumb { id: parent.id_hex(), name: parent.name.clone() })
}

/// Root-first ancestor chain ending with the entry itself.
///
/// An entry below a directory the caller cannot see answers 404, the same as a
/// hidden entry, so the chain never names private directories.
pub async fn breadcrumbs(db: &MongoDB, archive: &Archive, include_private: bool) -> Result<Vec<Breadcrumb>, AppError> {
    let coll = collection(db);
    let mut trail = vec![Breadcrumb { id: archive.id_hex(), name: archive.name.clone() }];
    let mut seen: HashSet<ObjectId> = archive.id.into_iter().collect();
    let mut next = archive.parent_id;

    while let Some(pid) = next {
        if trail.len() > MAX_TREE_DEPTH || !seen.insert(pid) {
            log::warn!("⚠️  Archive tree walk stopped at {} (cycle or excessive depth)", pid);
            break;
        }
        match coll.find_one(doc! { "_id": pid }).await? {
            Some(parent) => {
                trail.push(ancestor_crumb(&parent, include_private)?);
                next = parent.parent_id;
            }
            None => break,
        }
    }

    trail.reverse();
    Ok(trail)
}

/// Walks a slash path from the root by entry names
pub async fn resolve_path(db: &MongoDB, path: &str, include_private: bool) -> Result<Archive, AppError> {
    let segments = breadcrumb_paths(path);
    if segments.is_empty() {
        return Err(AppError::BadRequest("Path must name at least one entry".to_string()));
    }

    let coll = collection(db);
    let mut parent: Option<ObjectId> = None;
    let mut current: Option<Archive> = None;

    for (segment, walked) in segments {
        let mut filter = visibility(include_private);
        filter.insert("parentId", parent.map(Bson::ObjectId).unwrap_or(Bson::Null));
        filter.insert("name", segment);

        let entry = coll
            .find_one(filter)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Nothing found at '{}'", walked)))?;
        parent = entry.id;
        current = Some(entry);
    }

    current.ok_or_else(|| AppError::NotFound("Archive entry not found".to_string()))
}

/// Checks that a requested parent exists and is a directory
async fn checked_parent(db: &MongoDB, raw: Option<&str>) -> Result<Option<ObjectId>, AppError> {
    let Some(pid) = parse_parent_param(raw)? else {
        return Ok(None);
    };
    let parent = collection(db)
        .find_one(doc! { "_id": pid })
        .await?
        .ok_or_else(|| AppError::BadRequest("Parent directory not found".to_string()))?;
    if !parent.is_directory() {
        return Err(AppError::BadRequest("Parent is not a directory".to_string()));
    }
    Ok(Some(pid))
}

/// Inserts an entry and mirrors it into the parent's `children`
async fn insert_entry(db: &MongoDB, mut archive: Archive) -> Result<Archive, AppError> {
    let coll = collection(db);
    let result = coll.insert_one(&archive).await?;
    archive.id = result.inserted_id.as_object_id();

    if let (Some(pid), Some(id)) = (archive.parent_id, archive.id) {
        coll.update_one(
            doc! { "_id": pid },
            doc! { "$addToSet": { "children": id }, "$set": { "updatedAt": BsonDateTime::now() } },
        )
        .await?;
    }

    Ok(archive)
}

pub async fn create_directory(
    db: &MongoDB,
    request: &CreateDirectoryRequest,
    created_by: Option<ObjectId>,
) -> Result<Archive, AppError> {
    let name = validate_name(&request.name)?;
    let parent_id = checked_parent(db, request.parent_id.as_deref()).await?;

    let dir = Archive::directory(
        name,
        parent_id,
        request.access_level.unwrap_or_default(),
        request.metadata.clone().unwrap_or_default().normalized(),
        created_by,
    );

    let dir = insert_entry(db, dir).await?;
    log::info!("📁 Created directory '{}' ({})", dir.name, dir.id_hex());
    Ok(dir)
}

async fn index_archive(state: &AppState, archive: &Archive) {
    if archive.is_directory() {
        return;
    }
    if let Some(search) = &state.search {
        if let Err(e) = search.index_documents(&[SearchDocument::from(archive)]).await {
            log::warn!("⚠️  Failed to index {}: {}", archive.id_hex(), e);
        }
    }
}

pub async fn upload_file(state: &AppState, input: UploadInput, created_by: Option<ObjectId>) -> Result<Archive, AppError> {
    let blob = state.blob()?;

    if input.bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }
    let name = validate_name(input.name.as_deref().unwrap_or(&input.file_name))?;
    let parent_id = checked_parent(&state.db, input.parent_id.as_deref()).await?;

    let size = input.bytes.len() as u64;
    let content_text = extract_text(&input.content_type, &input.file_name, &input.bytes);
    let blob_name = blob_name_for(&input.file_name);

    let url = blob.put_blob(&blob_name, input.bytes, &input.content_type).await?;

    let stored_size = match blob.verify_blob(&blob_name, Some(size)).await {
        Ok(length) => length,
        Err(e) => {
            log::error!("❌ Upload verification failed for {}: {}", blob_name, e);
            if let Err(cleanup) = blob.delete_blob(&blob_name).await {
                log::warn!("⚠️  Could not remove unverified blob {}: {}", blob_name, cleanup);
            }
            return Err(e);
        }
    };

    let mut archive = Archive::file(
        name,
        parent_id,
        input.access_level.unwrap_or_default(),
        input.metadata.normalized(),
        created_by,
    );
    archive.content_url = Some(url);
    archive.blob_name = Some(blob_name.clone());
    archive.content_text = content_text;
    archive.file_size = Some(stored_size as i64);
    archive.file_type = Some(input.content_type);

    let archive = match insert_entry(&state.db, archive).await {
        Ok(a) => a,
        Err(e) => {
            // Keep storage in step with the database
            if let Err(cleanup) = blob.delete_blob(&blob_name).await {
                log::warn!("⚠️  Could not remove orphaned blob {}: {}", blob_name, cleanup);
            }
            return Err(e);
        }
    };

    index_archive(state, &archive).await;

    log::info!("📄 Stored file '{}' ({} bytes) as {}", archive.name, size, archive.id_hex());
    Ok(archive)
}

pub async fn update_archive(state: &AppState, id: &str, request: &UpdateArchiveRequest) -> Result<Archive, AppError> {
    let id = parse_object_id(id, "archive")?;

    let mut set = Document::new();
    if let Some(name) = &request.name {
        set.insert("name", validate_name(name)?);
    }
    if let Some(level) = request.access_level {
        set.insert("accessLevel", level.as_str());
    }
    if let Some(metadata) = &request.metadata {
        set.insert("metadata", mongodb::bson::to_bson(&metadata.clone().normalized())?);
    }
    if set.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    set.insert("updatedAt", BsonDateTime::now());

    let archive = collection(&state.db)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("Archive entry not found".to_string()))?;

    index_archive(state, &archive).await;

    log::info!("✏️  Updated archive entry {}", archive.id_hex());
    Ok(archive)
}

/// Every entry under `root`, root included; stops on revisits and at the depth bound
async fn collect_subtree(db: &MongoDB, root: Archive) -> Result<Vec<Archive>, AppError> {
    let coll = collection(db);
    let mut seen: HashSet<ObjectId> = root.id.into_iter().collect();
    let mut frontier: Vec<ObjectId> = if root.is_directory() { root.id.into_iter().collect() } else { Vec::new() };
    let mut entries = vec![root];
    let mut depth = 0;

    while !frontier.is_empty() && depth < MAX_TREE_DEPTH {
        let children: Vec<Archive> = coll
            .find(doc! { "parentId": { "$in": frontier.clone() } })
            .await?
            .try_collect()
            .await?;

        frontier.clear();
        for child in children {
            let Some(cid) = child.id else { continue };
            if !seen.insert(cid) {
                continue;
            }
            if child.is_directory() {
                frontier.push(cid);
            }
            entries.push(child);
        }
        depth += 1;
    }

    Ok(entries)
}

/// Deletes an entry and, for directories, all descendants. Returns how many were removed.
pub async fn delete_archive(state: &AppState, id: &str) -> Result<u64, AppError> {
    let id = parse_object_id(id, "archive")?;
    let coll = collection(&state.db);

    let root = coll
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::NotFound("Archive entry not found".to_string()))?;
    let parent_id = root.parent_id;

    let entries = collect_subtree(&state.db, root).await?;
    let ids: Vec<ObjectId> = entries.iter().filter_map(|a| a.id).collect();

    let result = coll.delete_many(doc! { "_id": { "$in": ids.clone() } }).await?;

    if let Some(pid) = parent_id {
        coll.update_one(
            doc! { "_id": pid },
            doc! { "$pull": { "children": id }, "$set": { "updatedAt": BsonDateTime::now() } },
        )
        .await?;
    }

    // Storage and index cleanup is best effort once the records are gone
    if let Some(blob) = &state.blob {
        for name in entries.iter().filter_map(|a| a.blob_name.as_deref()) {
            if let Err(e) = blob.delete_blob(name).await {
                log::warn!("⚠️  Failed to delete blob {}: {}", name, e);
            }
        }
    }
    if let Some(search) = &state.search {
        let file_ids: Vec<String> = entries
            .iter()
            .filter(|a| !a.is_directory())
            .map(|a| a.id_hex())
            .collect();
        if let Err(e) = search.delete_documents(&file_ids).await {
            log::warn!("⚠️  Failed to remove {} document(s) from index: {}", file_ids.len(), e);
        }
    }

    log::info!("🗑️ Deleted {} archive entr(ies) under {}", result.deleted_count, id);
    Ok(result.deleted_count)
}

pub async fn download(state: &AppState, id: &str, include_private: bool) -> Result<(Archive, BlobContent), AppError> {
    let archive = get_archive(&state.db, id, include_private).await?;
    if archive.is_directory() {
        return Err(AppError::BadRequest("Directories cannot be downloaded".to_string()));
    }
    let blob_name = archive
        .blob_name
        .clone()
        .ok_or_else(|| AppError::NotFound("File content not found".to_string()))?;

    let content = state.blob()?.get_blob(&blob_name).await?;
    Ok((archive, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_validated() {
        assert_eq!(validate_name("  Kenya  ").unwrap(), "Kenya");
        assert!(validate_name("   ").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn parent_param_accepts_root_aliases() {
        assert_eq!(parse_parent_param(None).unwrap(), None);
        assert_eq!(parse_parent_param(Some("root")).unwrap(), None);
        assert_eq!(parse_parent_param(Some(" null ")).unwrap(), None);
        assert_eq!(parse_parent_param(Some("")).unwrap(), None);

        let id = ObjectId::new();
        assert_eq!(parse_parent_param(Some(&id.to_hex())).unwrap(), Some(id));
        assert!(matches!(parse_parent_param(Some("zzz")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn extracts_text_only_from_text_like_files() {
        assert_eq!(
            extract_text("text/plain", "preamble.txt", b"  We the people  ").as_deref(),
            Some("We the people")
        );
        assert!(extract_text("application/octet-stream", "notes.md", b"# Title").is_some());
        assert!(extract_text("application/pdf", "kenya.pdf", b"%PDF-1.7").is_none());
        assert!(extract_text("text/plain", "empty.txt", b"").is_none());
    }

    #[test]
    fn extracted_text_is_capped() {
        let big = "a".repeat(MAX_CONTENT_TEXT_CHARS + 100);
        let text = extract_text("text/plain", "big.txt", big.as_bytes()).unwrap();
        assert_eq!(text.chars().count(), MAX_CONTENT_TEXT_CHARS);
    }

    #[test]
    fn anonymous_visibility_is_public_only() {
        assert_eq!(visibility(false), doc! { "accessLevel": "public" });
        assert!(visibility(true).is_empty());
    }

    #[actix_web::test]
    async fn upload_without_storage_is_unavailable() {
        let state = AppState::for_tests().await;
        let input = UploadInput {
            file_name: "a.txt".into(),
            content_type: "text/plain".into(),
            bytes: b"hello".to_vec(),
            ..Default::default()
        };
        let err = upload_file(&state, input, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
    #[test]
    fn hidden_ancestors_are_not_named() {
        let mut dir = Archive::directory("Drafts".into(), None, AccessLevel::Private, ArchiveMetadata::default(), None);
        dir.id = Some(ObjectId::new());

        assert!(matches!(ancestor_crumb(&dir, false), Err(AppError::NotFound(_))));
        let crumb = ancestor_crumb(&dir, true).unwrap();
        assert_eq!(crumb.name, "Drafts");

        dir.access_level = AccessLevel::Public;
        assert_eq!(ancestor_crumb(&dir, false).unwrap().id, dir.id_hex());
    }

    async fn live_state() -> AppState {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/archive_test".to_string());
        let mut state = AppState::for_tests().await;
        state.db = MongoDB::new(&uri).await.expect("Failed to connect to MongoDB");
        state
    }

    /// Top-level directory with a unique name so runs do not collide
    async fn scratch_root(db: &MongoDB, access_level: AccessLevel) -> Archive {
        let request = CreateDirectoryRequest {
            name: format!("scratch-{}", ObjectId::new().to_hex()),
            parent_id: None,
            access_level: Some(access_level),
            metadata: None,
        };
        create_directory(db, &request, None).await.unwrap()
    }

    async fn add_file(db: &MongoDB, parent: &Archive, name: &str, access_level: AccessLevel) -> Archive {
        let file = Archive::file(name.into(), parent.id, access_level, ArchiveMetadata::default(), None);
        insert_entry(db, file).await.unwrap()
    }

    async fn add_dir(db: &MongoDB, parent: &Archive, name: &str) -> Archive {
        let request = CreateDirectoryRequest {
            name: name.into(),
            parent_id: Some(parent.id_hex()),
            access_level: None,
            metadata: None,
        };
        create_directory(db, &request, None).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn listing_puts_directories_first_and_counts_visible_entries() {
        let state = live_state().await;
        let db = &state.db;
        let root = scratch_root(db, AccessLevel::Public).await;

        add_file(db, &root, "c-file", AccessLevel::Public).await;
        add_dir(db, &root, "b-dir").await;
        add_file(db, &root, "a-file", AccessLevel::Public).await;
        add_dir(db, &root, "a-dir").await;
        add_file(db, &root, "hidden", AccessLevel::Private).await;

        let parent = root.id_hex();
        let first = list_children(db, Some(&parent), Pagination::new(Some(1), Some(3), 20, 100), false)
            .await
            .unwrap();
        let names: Vec<&str> = first.items.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a-dir", "b-dir", "a-file"]);
        assert_eq!((first.total, first.pages), (4, 2));

        let second = list_children(db, Some(&parent), Pagination::new(Some(2), Some(3), 20, 100), false)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "c-file");

        let signed_in = list_children(db, Some(&parent), Pagination::new(None, None, 20, 100), true)
            .await
            .unwrap();
        assert_eq!(signed_in.total, 5);

        assert_eq!(delete_archive(&state, &parent).await.unwrap(), 6);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn resolve_walks_names_and_reports_missing_segment() {
        let state = live_state().await;
        let db = &state.db;
        let root = scratch_root(db, AccessLevel::Public).await;
        let kenya = add_dir(db, &root, "Kenya").await;

        let found = resolve_path(db, &format!("/{}/Kenya", root.name), false).await.unwrap();
        assert_eq!(found.id, kenya.id);

        let err = resolve_path(db, &format!("/{}/Ghana", root.name), false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        delete_archive(&state, &root.id_hex()).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn children_mirror_inserts_and_recursive_deletes() {
        let state = live_state().await;
        let db = &state.db;
        let root = scratch_root(db, AccessLevel::Public).await;
        let chapter = add_dir(db, &root, "Chapter 4").await;
        add_file(db, &chapter, "article-26.txt", AccessLevel::Public).await;
        add_dir(db, &chapter, "Annexes").await;

        let stored = find_visible(db, root.id.unwrap(), true).await.unwrap();
        assert_eq!(stored.children, vec![chapter.id.unwrap()]);

        assert_eq!(delete_archive(&state, &chapter.id_hex()).await.unwrap(), 3);

        let stored = find_visible(db, root.id.unwrap(), true).await.unwrap();
        assert!(stored.children.is_empty());
        let remaining = collection(db)
            .count_documents(doc! { "parentId": chapter.id })
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        assert_eq!(delete_archive(&state, &root.id_hex()).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn breadcrumbs_hide_private_ancestors() {
        let state = live_state().await;
        let db = &state.db;
        let drafts = scratch_root(db, AccessLevel::Private).await;
        let file = add_file(db, &drafts, "preamble.txt", AccessLevel::Public).await;

        let err = breadcrumbs(db, &file, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let trail = breadcrumbs(db, &file, true).await.unwrap();
        let names: Vec<&str> = trail.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec![drafts.name.as_str(), "preamble.txt"]);

        delete_archive(&state, &drafts.id_hex()).await.unwrap();
    }
}
