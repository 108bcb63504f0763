use actix_web::{web, HttpResponse};

use crate::models::{CreateUserRequest, UpdateUserRequest, UserResponse};
use crate::services::auth_service::Claims;
use crate::services::user_service;
use crate::state::AppState;
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users, newest first", body = [UserResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    log::info!("👥 GET /users");

    let users = user_service::list_users(&state.db).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": users.len(),
        "users": users
    })))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 400, description = "Invalid user ID"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let user = user_service::get_user(&state.db, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate email")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    state: web::Data<AppState>,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("👤 POST /users - email: {}", request.email);

    let user = user_service::create_user(&state.db, &request).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "user": user })))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid ID or empty update"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️  PUT /users/{}", path);

    let user = user_service::update_user(&state.db, &path, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "User ObjectId")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Invalid ID or self-deletion"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AppError> {
    log::info!("🗑️ DELETE /users/{} by {}", path, claims.sub);

    user_service::delete_user(&state.db, &path, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "User deleted successfully"
    })))
}
