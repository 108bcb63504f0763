mod api;
mod config;
mod database;
mod middleware;
mod models;
mod seeds;
mod services;
mod state;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::middleware::AuthMiddleware;
use crate::state::AppState;
use crate::utils::AppError;

const JSON_BODY_LIMIT: usize = 1024 * 1024;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("❌ Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    log::info!("🚀 Starting Constitutional Archive API...");

    let state = AppState::init(config).await.map_err(|e| {
        log::error!("❌ Startup failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e)
    })?;

    // 🌱 Bootstrap admin account
    seeds::admin_seed::seed_admin_account(&state.db, &state.config).await;

    let host = state.config.host.clone();
    let port = state.config.port;
    let frontend_url = state.config.frontend_url.clone();
    let mongo_client = state.db.client().clone();
    let state_data = web::Data::new(state);

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::CONTENT_DISPOSITION,
            ])
            .supports_credentials()
            .max_age(3600);

        // Malformed JSON bodies get the same envelope as every other error
        let json_config = web::JsonConfig::default()
            .limit(JSON_BODY_LIMIT)
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into());
        let query_config = web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into());

        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(state_data.clone())
            .app_data(json_config)
            .app_data(query_config)
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Auth endpoints
            .service(
                web::scope("/api/auth")
                    .route("/signup", web::post().to(api::auth::signup))
                    .route("/login", web::post().to(api::auth::login))
                    .route("/google", web::post().to(api::auth::google))
                    .route("/forgot-password", web::post().to(api::auth::forgot_password))
                    .route("/reset-password", web::post().to(api::auth::reset_password))
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware::authenticated())
                            .route(web::get().to(api::auth::get_me))
                    )
                    .service(
                        web::resource("/verify")
                            .wrap(AuthMiddleware::authenticated())
                            .route(web::get().to(api::auth::verify_token))
                    )
            )
            // Users: admin only
            .service(
                web::scope("/api/users")
                    .wrap(AuthMiddleware::admin())
                    .route("", web::get().to(api::users::list_users))
                    .route("", web::post().to(api::users::create_user))
                    .route("/{id}", web::get().to(api::users::get_user))
                    .route("/{id}", web::put().to(api::users::update_user))
                    .route("/{id}", web::delete().to(api::users::delete_user))
            )
            // Archives: public reads, admin writes (checked per handler)
            .service(web::scope("/api/archives").configure(api::archives::configure))
            // Search
            .route("/api/search", web::get().to(api::search::search))
            .route("/api/suggestions", web::get().to(api::suggestions::suggestions))
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    log::info!("👋 Server stopped, closing MongoDB connections...");
    mongo_client.shutdown().await;

    Ok(())
}
