use actix_web::{web, HttpResponse};

use crate::models::UserResponse;
use crate::services::auth_service::{
    self, AuthResponse, Claims, ForgotPasswordRequest, GoogleLoginRequest, LoginRequest, ResetPasswordRequest,
    SignupRequest,
};
use crate::state::AppState;
use crate::utils::AppError;

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "Auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or user already exists")
    )
)]
pub async fn signup(
    state: web::Data<AppState>,
    request: web::Json<SignupRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /auth/signup - email: {}", request.email);

    let response = auth_service::signup(&state, &request).await?;
    Ok(HttpResponse::Created().json(response))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is inactive")
    )
)]
pub async fn login(
    state: web::Data<AppState>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /auth/login - email: {}", request.email);

    match auth_service::login(&state, &request).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", request.email);
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", request.email, e);
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/google",
    tag = "Auth",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in with Google", body = AuthResponse),
        (status = 401, description = "Credential rejected"),
        (status = 503, description = "Google sign-in not configured")
    )
)]
pub async fn google(
    state: web::Data<AppState>,
    request: web::Json<GoogleLoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /auth/google");

    let response = auth_service::google_login(&state, &request).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists")
    )
)]
pub async fn forgot_password(
    state: web::Data<AppState>,
    request: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 POST /auth/forgot-password");

    auth_service::forgot_password(&state, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "If an account exists for that email, a reset link has been sent"
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid or expired token")
    )
)]
pub async fn reset_password(
    state: web::Data<AppState>,
    request: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 POST /auth/reset-password");

    auth_service::reset_password(&state, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Password has been reset"
    })))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    state: web::Data<AppState>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AppError> {
    log::info!("👤 GET /auth/me - user: {}", claims.sub);

    let user = auth_service::get_current_user(&state.db, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "user": user
    })))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    tag = "Auth",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Invalid or expired token")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn verify_token(claims: web::ReqData<Claims>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "valid": true,
        "userId": claims.sub,
        "email": claims.email,
        "role": claims.role,
        "exp": claims.exp
    }))
}
