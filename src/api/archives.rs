use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse};
use futures::StreamExt;
use mongodb::bson::oid::ObjectId;

use crate::middleware::{AdminUser, MaybeUser};
use crate::models::{
    AccessLevel, ArchiveMetadata, ArchiveResponse, Breadcrumb, CreateDirectoryRequest, ListArchivesQuery,
    ResolvePathQuery, UpdateArchiveRequest,
};
use crate::services::archive_service::{self, UploadInput};
use crate::state::AppState;
use crate::utils::{AppError, Pagination};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

fn acting_user(admin: &AdminUser) -> Option<ObjectId> {
    ObjectId::parse_str(&admin.0.sub).ok()
}

#[utoipa::path(
    get,
    path = "/api/archives",
    tag = "Archives",
    params(
        ("parentId" = Option<String>, Query, description = "Parent directory; root when absent"),
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "Page size (max 100)")
    ),
    responses(
        (status = 200, description = "Directory listing", body = [ArchiveResponse]),
        (status = 400, description = "Invalid parent ID"),
        (status = 404, description = "Parent not found")
    )
)]
pub async fn list_archives(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<ListArchivesQuery>,
) -> Result<HttpResponse, AppError> {
    let pagination = Pagination::new(query.page, query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    log::info!(
        "📂 GET /archives - parent: {}, page: {}",
        query.parent_id.as_deref().unwrap_or("root"),
        pagination.page
    );

    let page = archive_service::list_children(
        &state.db,
        query.parent_id.as_deref(),
        pagination,
        user.can_see_private(),
    )
    .await?
    .map(ArchiveResponse::from);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "items": page.items,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
        "pages": page.pages
    })))
}

#[utoipa::path(
    get,
    path = "/api/archives/{id}",
    tag = "Archives",
    params(("id" = String, Path, description = "Archive entry ObjectId")),
    responses(
        (status = 200, description = "Archive entry", body = ArchiveResponse),
        (status = 400, description = "Invalid archive ID"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_archive(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let archive = archive_service::get_archive(&state.db, &path, user.can_see_private()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "archive": ArchiveResponse::from(archive)
    })))
}

#[utoipa::path(
    get,
    path = "/api/archives/{id}/path",
    tag = "Archives",
    params(("id" = String, Path, description = "Archive entry ObjectId")),
    responses(
        (status = 200, description = "Breadcrumbs from the root", body = [Breadcrumb]),
        (status = 404, description = "Not found, or below a directory the caller cannot see")
    )
)]
pub async fn get_breadcrumbs(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let include_private = user.can_see_private();
    let archive = archive_service::get_archive(&state.db, &path, include_private).await?;
    let trail = archive_service::breadcrumbs(&state.db, &archive, include_private).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "path": trail })))
}

#[utoipa::path(
    get,
    path = "/api/archives/resolve",
    tag = "Archives",
    params(("path" = String, Query, description = "Slash separated path from the root")),
    responses(
        (status = 200, description = "Entry at the path", body = ArchiveResponse),
        (status = 404, description = "A segment is missing")
    )
)]
pub async fn resolve_path(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<ResolvePathQuery>,
) -> Result<HttpResponse, AppError> {
    log::info!("🧭 GET /archives/resolve - path: {}", query.path);

    let include_private = user.can_see_private();
    let archive = archive_service::resolve_path(&state.db, &query.path, include_private).await?;
    let trail = archive_service::breadcrumbs(&state.db, &archive, include_private).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "archive": ArchiveResponse::from(archive),
        "path": trail
    })))
}

#[utoipa::path(
    get,
    path = "/api/archives/{id}/download",
    tag = "Archives",
    params(("id" = String, Path, description = "Archive entry ObjectId")),
    responses(
        (status = 200, description = "File bytes"),
        (status = 400, description = "Entry is a directory"),
        (status = 404, description = "Not found"),
        (status = 503, description = "Storage not configured")
    )
)]
pub async fn download(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("⬇️  GET /archives/{}/download", path);

    let (archive, content) = archive_service::download(&state, &path, user.can_see_private()).await?;
    let content_type = content
        .content_type
        .or(archive.file_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((header::CONTENT_DISPOSITION, content_disposition(&archive.name)))
        .body(content.bytes))
}

fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

#[utoipa::path(
    post,
    path = "/api/archives/directories",
    tag = "Archives",
    request_body = CreateDirectoryRequest,
    responses(
        (status = 201, description = "Directory created", body = ArchiveResponse),
        (status = 400, description = "Invalid name or parent")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_directory(
    state: web::Data<AppState>,
    admin: AdminUser,
    request: web::Json<CreateDirectoryRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📁 POST /archives/directories - name: {}", request.name);

    let dir = archive_service::create_directory(&state.db, &request, acting_user(&admin)).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "archive": ArchiveResponse::from(dir)
    })))
}

/// Collects the upload form. The `file` part is buffered up to `max_bytes`.
async fn read_upload_form(mut payload: Multipart, max_bytes: usize) -> Result<UploadInput, AppError> {
    let mut input = UploadInput::default();
    let mut has_file = false;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;

        let (name, file_name) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => continue,
        };

        if name == "file" {
            has_file = true;
            input.file_name = file_name.unwrap_or_else(|| "upload".to_string());
            input.content_type = field
                .content_type()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
                if input.bytes.len() + chunk.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File exceeds the {} byte limit",
                        max_bytes
                    )));
                }
                input.bytes.extend_from_slice(&chunk);
            }
            continue;
        }

        let mut raw = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
            if raw.len() + chunk.len() > 64 * 1024 {
                return Err(AppError::BadRequest(format!("Field '{}' is too long", name)));
            }
            raw.extend_from_slice(&chunk);
        }
        let value = String::from_utf8_lossy(&raw).trim().to_string();
        apply_form_field(&mut input, &name, value)?;
    }

    if !has_file {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    }
    Ok(input)
}

fn apply_form_field(input: &mut UploadInput, name: &str, value: String) -> Result<(), AppError> {
    if value.is_empty() {
        return Ok(());
    }
    let meta: &mut ArchiveMetadata = &mut input.metadata;
    match name {
        "parentId" => input.parent_id = Some(value),
        "name" => input.name = Some(value),
        "accessLevel" => {
            input.access_level = Some(
                AccessLevel::parse(&value)
                    .ok_or_else(|| AppError::BadRequest(format!("Invalid access level '{}'", value)))?,
            )
        }
        "title" => meta.title = Some(value),
        "author" => meta.author = Some(value),
        "region" => meta.region = Some(value),
        "date" => meta.date = Some(value),
        "documentType" => meta.document_type = Some(value),
        "keywords" => meta.keywords = value.split(',').map(str::to_string).collect(),
        other => log::debug!("Ignoring upload field '{}'", other),
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/archives/upload",
    tag = "Archives",
    request_body(content_type = "multipart/form-data", description = "`file` plus optional metadata fields"),
    responses(
        (status = 201, description = "File stored", body = ArchiveResponse),
        (status = 400, description = "Missing file or invalid parent"),
        (status = 413, description = "File too large"),
        (status = 503, description = "Storage not configured")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload(
    state: web::Data<AppState>,
    admin: AdminUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let input = read_upload_form(payload, state.config.max_upload_bytes).await?;
    log::info!(
        "📤 POST /archives/upload - {} ({} bytes, {})",
        input.file_name,
        input.bytes.len(),
        input.content_type
    );

    let archive = archive_service::upload_file(&state, input, acting_user(&admin)).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "archive": ArchiveResponse::from(archive)
    })))
}

#[utoipa::path(
    put,
    path = "/api/archives/{id}",
    tag = "Archives",
    params(("id" = String, Path, description = "Archive entry ObjectId")),
    request_body = UpdateArchiveRequest,
    responses(
        (status = 200, description = "Entry updated", body = ArchiveResponse),
        (status = 400, description = "Invalid ID or empty update"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_archive(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdateArchiveRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️  PUT /archives/{}", path);

    let archive = archive_service::update_archive(&state, &path, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "archive": ArchiveResponse::from(archive)
    })))
}

#[utoipa::path(
    delete,
    path = "/api/archives/{id}",
    tag = "Archives",
    params(("id" = String, Path, description = "Archive entry ObjectId")),
    responses(
        (status = 200, description = "Entry and descendants removed"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_archive(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /archives/{}", path);

    let deleted = archive_service::delete_archive(&state, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "deleted": deleted
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list_archives))
        .route("/resolve", web::get().to(resolve_path))
        .route("/directories", web::post().to(create_directory))
        .route("/upload", web::post().to(upload))
        .route("/{id}", web::get().to(get_archive))
        .route("/{id}", web::put().to(update_archive))
        .route("/{id}", web::delete().to(delete_archive))
        .route("/{id}/path", web::get().to(get_breadcrumbs))
        .route("/{id}/download", web::get().to(download));
}
