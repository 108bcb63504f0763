use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;

use crate::database::{parse_object_id, MongoDB};
use crate::models::{CreateUserRequest, Role, UpdateUserRequest, User, UserResponse, USERS_COLLECTION};
use crate::services::auth_service::{hash_password, normalize_email, validate_email, validate_password};
use crate::utils::AppError;

fn duplicate_email(e: mongodb::error::Error) -> AppError {
    match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email already in use".to_string()),
        other => other,
    }
}

pub async fn list_users(db: &MongoDB) -> Result<Vec<UserResponse>, AppError> {
    let users: Vec<User> = db
        .collection::<User>(USERS_COLLECTION)
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(users.into_iter().map(UserResponse::from).collect())
}

pub async fn get_user(db: &MongoDB, id: &str) -> Result<UserResponse, AppError> {
    let id = parse_object_id(id, "user")?;
    db.collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "_id": id })
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn create_user(db: &MongoDB, request: &CreateUserRequest) -> Result<UserResponse, AppError> {
    let email = normalize_email(&request.email);
    validate_email(&email)?;
    validate_password(&request.password)?;

    let collection = db.collection::<User>(USERS_COLLECTION);
    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_password(&request.password).await?;
    let mut user = User::new(email, Some(password_hash), None, request.role.unwrap_or_default());

    let result = collection.insert_one(&user).await.map_err(duplicate_email)?;
    user.id = result.inserted_id.as_object_id();

    log::info!("👤 Created user {} ({})", user.email, user.role.as_str());
    Ok(UserResponse::from(user))
}

/// Builds the `$set` document for an update; errors when nothing would change
pub async fn build_user_update(request: &UpdateUserRequest) -> Result<Document, AppError> {
    let mut set = Document::new();

    if let Some(email) = &request.email {
        let email = normalize_email(email);
        validate_email(&email)?;
        set.insert("email", email);
    }
    if let Some(password) = &request.password {
        validate_password(password)?;
        set.insert("password", hash_password(password).await?);
    }
    if let Some(role) = request.role {
        set.insert("role", role.as_str());
    }
    if let Some(active) = request.is_active {
        set.insert("isActive", active);
    }

    if set.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    set.insert("updatedAt", BsonDateTime::now());
    Ok(set)
}

pub async fn update_user(db: &MongoDB, id: &str, request: &UpdateUserRequest) -> Result<UserResponse, AppError> {
    let id = parse_object_id(id, "user")?;
    let set = build_user_update(request).await?;

    db.collection::<User>(USERS_COLLECTION)
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await
        .map_err(duplicate_email)?
        .map(UserResponse::from)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn delete_user(db: &MongoDB, id: &str, acting_user: &str) -> Result<(), AppError> {
    let id = parse_object_id(id, "user")?;
    if id.to_hex() == acting_user {
        return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
    }

    let result = db
        .collection::<User>(USERS_COLLECTION)
        .delete_one(doc! { "_id": id })
        .await?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    log::info!("🗑️ Deleted user {}", id);
    Ok(())
}

/// Creates the configured admin account at startup when it is missing
pub async fn seed_admin(db: &MongoDB, email: &str, password: &str) -> Result<Option<ObjectId>, AppError> {
    let email = normalize_email(email);
    let collection = db.collection::<User>(USERS_COLLECTION);

    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        log::info!("👤 Admin {} already present, skipping seed", email);
        return Ok(None);
    }

    validate_email(&email)?;
    validate_password(password)?;

    let user = User::new(email.clone(), Some(hash_password(password).await?), None, Role::Admin);
    let result = collection.insert_one(&user).await?;

    log::info!("   ✅ Seeded admin account {}", email);
    Ok(result.inserted_id.as_object_id())
}
