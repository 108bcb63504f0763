use std::collections::HashSet;

use actix_web::web;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::database::{parse_object_id, MongoDB};
use crate::models::{Role, User, UserResponse, USERS_COLLECTION};
use crate::state::AppState;
use crate::utils::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
const RESET_TOKEN_TTL_MINUTES: i64 = 60;
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user ObjectId (hex)
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GoogleLoginRequest {
    /// Google ID token from the browser sign-in flow
    pub credential: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check only: one '@', non-empty local part, dotted domain, no whitespace
pub fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::BadRequest("A valid email is required".to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// bcrypt runs on the blocking pool so it does not stall an actix worker
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    web::block(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| AppError::Internal(format!("Blocking pool error: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    web::block(move || verify(password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Blocking pool error: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password verification error: {}", e)))
}

// Generate JWT token
pub fn generate_jwt(user: &User, cfg: &JwtConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id_hex(),
        email: user.email.clone(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(cfg.ttl_hours)).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: cfg.audience.clone(),
        iss: cfg.issuer.clone(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(cfg.secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

// Verify JWT token
pub fn verify_token(token: &str, cfg: &JwtConfig) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[cfg.audience.as_str()]);
    validation.iss = Some(HashSet::from([cfg.issuer.clone()]));

    decode::<Claims>(token, &DecodingKey::from_secret(cfg.secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Reset tokens are stored hashed; only the emailed copy can redeem them
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_reset_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn auth_response(user: User, cfg: &JwtConfig) -> Result<AuthResponse, AppError> {
    let token = generate_jwt(&user, cfg)?;
    Ok(AuthResponse {
        success: true,
        token,
        user: UserResponse::from(user),
    })
}

pub async fn signup(state: &AppState, request: &SignupRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&request.email);
    validate_email(&email)?;
    validate_password(&request.password)?;

    let collection = state.db.collection::<User>(USERS_COLLECTION);

    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_password(&request.password).await?;
    let mut user = User::new(email, Some(password_hash), None, Role::User);

    // The unique index still guards the race between the check and the insert
    let result = collection.insert_one(&user).await.map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("User already exists".to_string()),
        other => other,
    })?;
    user.id = result.inserted_id.as_object_id();

    log::info!("✅ User registered: {}", user.email);
    auth_response(user, &state.config.jwt)
}

pub async fn login(state: &AppState, request: &LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&request.email);
    let collection = state.db.collection::<User>(USERS_COLLECTION);

    let user = collection
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let stored = user.password.as_deref().ok_or_else(|| {
        AppError::Unauthorized("This account uses Google sign-in. Please sign in with Google.".to_string())
    })?;

    if !verify_password(&request.password, stored).await? {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    let now = BsonDateTime::now();
    collection
        .update_one(doc! { "_id": user.id }, doc! { "$set": { "lastLogin": now } })
        .await?;

    let mut user = user;
    user.last_login = Some(now);
    auth_response(user, &state.config.jwt)
}

/// Signs in with a Google ID token: by googleId, else links by email, else creates
pub async fn google_login(state: &AppState, request: &GoogleLoginRequest) -> Result<AuthResponse, AppError> {
    let client_id = state
        .config
        .google_client_id
        .as_deref()
        .ok_or_else(|| AppError::Unavailable("Google sign-in is not configured".to_string()))?;

    let response = state
        .http
        .get(GOOGLE_TOKENINFO_URL)
        .query(&[("id_token", request.credential.as_str())])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::Unauthorized("Invalid Google credential".to_string()));
    }

    let info: GoogleTokenInfo = response.json().await?;
    if info.aud != client_id {
        return Err(AppError::Unauthorized("Google credential was issued for another client".to_string()));
    }
    if info.email_verified.as_deref() != Some("true") {
        return Err(AppError::Unauthorized("Google email is not verified".to_string()));
    }
    let email = info
        .email
        .as_deref()
        .map(normalize_email)
        .ok_or_else(|| AppError::Unauthorized("Google credential has no email".to_string()))?;

    let collection = state.db.collection::<User>(USERS_COLLECTION);
    let now = BsonDateTime::now();

    let user = if let Some(mut existing) = collection.find_one(doc! { "googleId": &info.sub }).await? {
        log::info!("✅ Found existing user by googleId: {}", existing.id_hex());
        collection
            .update_one(doc! { "_id": existing.id }, doc! { "$set": { "lastLogin": now, "updatedAt": now } })
            .await?;
        existing.last_login = Some(now);
        existing
    } else if let Some(mut existing) = collection.find_one(doc! { "email": &email }).await? {
        log::info!("🔗 Linking Google account to existing user: {}", existing.id_hex());
        collection
            .update_one(
                doc! { "_id": existing.id },
                doc! { "$set": { "googleId": &info.sub, "lastLogin": now, "updatedAt": now } },
            )
            .await?;
        existing.google_id = Some(info.sub.clone());
        existing.last_login = Some(now);
        existing
    } else {
        let mut user = User::new(email, None, Some(info.sub.clone()), Role::User);
        user.last_login = Some(now);
        let result = collection.insert_one(&user).await?;
        user.id = result.inserted_id.as_object_id();
        log::info!("✅ Created user from Google sign-in: {}", user.email);
        user
    };

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    auth_response(user, &state.config.jwt)
}

/// Always succeeds from the caller's point of view so registered emails cannot be enumerated
pub async fn forgot_password(state: &AppState, request: &ForgotPasswordRequest) -> Result<(), AppError> {
    let email = normalize_email(&request.email);
    if validate_email(&email).is_err() {
        log::info!("🔑 Password reset requested for a malformed email");
        return Ok(());
    }

    let collection = state.db.collection::<User>(USERS_COLLECTION);
    let Some(user) = collection.find_one(doc! { "email": &email }).await? else {
        log::info!("🔑 Password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_reset_token();
    let expires = BsonDateTime::from_millis(
        (Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES)).timestamp_millis(),
    );

    collection
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": {
                "resetTokenHash": hash_reset_token(&token),
                "resetTokenExpires": expires,
                "updatedAt": BsonDateTime::now(),
            } },
        )
        .await?;

    let link = format!("{}/reset-password/{}", state.config.frontend_url, token);
    if let Err(e) = state.mailer.send_password_reset(&user.email, &link).await {
        log::error!("❌ Failed to send reset email to {}: {}", user.email, e);
    }

    Ok(())
}

pub async fn reset_password(state: &AppState, request: &ResetPasswordRequest) -> Result<(), AppError> {
    validate_password(&request.password)?;

    let collection = state.db.collection::<User>(USERS_COLLECTION);
    let user = collection
        .find_one(doc! {
            "resetTokenHash": hash_reset_token(request.token.trim()),
            "resetTokenExpires": { "$gt": BsonDateTime::now() },
        })
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

    let password_hash = hash_password(&request.password).await?;

    collection
        .update_one(
            doc! { "_id": user.id },
            doc! {
                "$set": { "password": password_hash, "updatedAt": BsonDateTime::now() },
                "$unset": { "resetTokenHash": "", "resetTokenExpires": "" },
            },
        )
        .await?;

    log::info!("🔑 Password reset completed for {}", user.email);
    Ok(())
}

// Get current user
/// Stored account behind a token subject; `None` when the id is malformed or gone.
pub async fn find_account(db: &MongoDB, user_id: &str) -> Result<Option<User>, AppError> {
    let Ok(id) = ObjectId::parse_str(user_id) else {
        return Ok(None);
    };
    Ok(db.collection::<User>(USERS_COLLECTION).find_one(doc! { "_id": id }).await?)
}

pub async fn get_current_user(db: &MongoDB, user_id: &str) -> Result<UserResponse, AppError> {
    let id = parse_object_id(user_id, "user")?;
    db.collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "_id": id })
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn cfg() -> JwtConfig {
        JwtConfig {
            secret: "unit-test-secret".into(),
            issuer: "constitutional-archive".into(),
            audience: "archive-api".into(),
            ttl_hours: 1,
        }
    }

    fn admin() -> User {
        let mut user = User::new("admin@archive.org".into(), None, None, Role::Admin);
        user.id = Some(ObjectId::new());
        user
    }

    #[test]
    fn jwt_round_trip() {
        let user = admin();
        let token = generate_jwt(&user, &cfg()).unwrap();
        let claims = verify_token(&token, &cfg()).unwrap();
        assert_eq!(claims.sub, user.id_hex());
        assert_eq!(claims.email, "admin@archive.org");
        assert!(claims.is_admin());
    }

    #[test]
    fn jwt_rejects_wrong_secret_and_audience() {
        let token = generate_jwt(&admin(), &cfg()).unwrap();

        let mut other = cfg();
        other.secret = "different".into();
        assert!(matches!(verify_token(&token, &other), Err(AppError::Unauthorized(_))));

        let mut other = cfg();
        other.audience = "someone-else".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn jwt_rejects_expired_token() {
        let mut expired = cfg();
        expired.ttl_hours = -2;
        let token = generate_jwt(&admin(), &expired).unwrap();
        assert!(verify_token(&token, &cfg()).is_err());
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("clerk@archive.org").is_ok());
        assert!(validate_email("clerk@archive").is_err());
        assert!(validate_email("@archive.org").is_err());
        assert!(validate_email("clerk archive@org.za").is_err());
        assert!(validate_email("a@b@c.org").is_err());
        assert_eq!(normalize_email("  Clerk@Archive.ORG "), "clerk@archive.org");
    }

    #[test]
    fn password_validation() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long-enough").is_ok());
    }

    #[test]
    fn reset_token_hash_is_stable_hex() {
        let h = hash_reset_token("abc");
        assert_eq!(h, hash_reset_token("abc"));
        assert_eq!(h.len(), 64);
        assert_ne!(h, hash_reset_token("abd"));
        assert_eq!(generate_reset_token().len(), 64);
    }

    #[actix_web::test]
    async fn bcrypt_round_trip() {
        let hashed = hash_password("correct horse").await.unwrap();
        assert!(verify_password("correct horse", &hashed).await.unwrap());
        assert!(!verify_password("wrong horse", &hashed).await.unwrap());
    }
    #[actix_web::test]
    async fn forgot_password_hides_malformed_email() {
        let state = AppState::for_tests().await;
        let request = ForgotPasswordRequest { email: "not-an-email".into() };
        assert!(forgot_password(&state, &request).await.is_ok());
    }

    async fn live_state() -> AppState {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/archive_test".to_string());
        let mut state = AppState::for_tests().await;
        state.db = MongoDB::new(&uri).await.expect("Failed to connect to MongoDB");
        state
    }

    #[actix_web::test]
    #[ignore] // Requires MongoDB to be running
    async fn duplicate_signup_is_conflict() {
        use actix_web::ResponseError;

        let state = live_state().await;
        let request = SignupRequest {
            email: format!("dup-{}@archive.org", ObjectId::new().to_hex()),
            password: "long-enough".into(),
        };

        let first = signup(&state, &request).await.unwrap();
        assert!(first.success);

        let err = signup(&state, &request).await.err().unwrap();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status_code(), 400);

        state
            .db
            .collection::<User>(USERS_COLLECTION)
            .delete_many(doc! { "email": normalize_email(&request.email) })
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn find_account_reads_stored_state() {
        let state = live_state().await;
        let users = state.db.collection::<User>(USERS_COLLECTION);

        let mut user = User::new(format!("inactive-{}@archive.org", ObjectId::new().to_hex()), None, None, Role::Admin);
        user.is_active = false;
        let id = users.insert_one(&user).await.unwrap().inserted_id.as_object_id().unwrap();

        let stored = find_account(&state.db, &id.to_hex()).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(find_account(&state.db, &ObjectId::new().to_hex()).await.unwrap().is_none());
        assert!(find_account(&state.db, "not-an-id").await.unwrap().is_none());

        users.delete_one(doc! { "_id": id }).await.unwrap();
    }
}
