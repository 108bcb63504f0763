use utoipa::OpenApi;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Constitutional Archive API",
        version = "1.0.0",
        description = "Browse, search and curate an archive of constitutional documents.\n\n**Authentication:** read routes accept an optional JWT Bearer token (anonymous callers see public entries only). User management and archive changes require an admin token.",
    ),
    paths(
        // Auth
        crate::api::auth::signup,
        crate::api::auth::login,
        crate::api::auth::google,
        crate::api::auth::forgot_password,
        crate::api::auth::reset_password,
        crate::api::auth::get_me,
        crate::api::auth::verify_token,

        // Users
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::create_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,

        // Archives
        crate::api::archives::list_archives,
        crate::api::archives::get_archive,
        crate::api::archives::get_breadcrumbs,
        crate::api::archives::resolve_path,
        crate::api::archives::download,
        crate::api::archives::create_directory,
        crate::api::archives::upload,
        crate::api::archives::update_archive,
        crate::api::archives::delete_archive,

        // Search
        crate::api::search::search,
        crate::api::suggestions::suggestions,

        // Health
        crate::api::health::health_check,
    ),
    components(
        schemas(
            crate::services::auth_service::SignupRequest,
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::GoogleLoginRequest,
            crate::services::auth_service::ForgotPasswordRequest,
            crate::services::auth_service::ResetPasswordRequest,
            crate::services::auth_service::AuthResponse,

            crate::models::Role,
            crate::models::UserResponse,
            crate::models::CreateUserRequest,
            crate::models::UpdateUserRequest,

            crate::models::ArchiveKind,
            crate::models::AccessLevel,
            crate::models::ArchiveMetadata,
            crate::models::ArchiveResponse,
            crate::models::Breadcrumb,
            crate::models::CreateDirectoryRequest,
            crate::models::UpdateArchiveRequest,

            crate::api::search::SearchResult,
            crate::services::suggestion_service::Suggestions,
            crate::api::health::HealthResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Email/password and Google sign-in, password reset, token inspection."),
        (name = "Users", description = "Admin-only user management."),
        (name = "Archives", description = "Directory tree browsing, file upload and download, curation."),
        (name = "Search", description = "Full-text search and type-ahead suggestions."),
        (name = "Health", description = "Liveness and dependency status."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter your JWT token"))
                        .build()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_archive_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/archives/{id}/download"));
        assert!(doc.paths.paths.contains_key("/api/suggestions"));
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
