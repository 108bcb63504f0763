use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::services::user_service;

/// Creates the bootstrap admin from ADMIN_EMAIL / ADMIN_PASSWORD.
/// Only inserts when no account with that email exists yet.
pub async fn seed_admin_account(db: &MongoDB, config: &AppConfig) {
    let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) else {
        log::info!("👤 Admin seed: ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping");
        return;
    };

    log::info!("👤 Admin seed: checking {}...", email);

    match user_service::seed_admin(db, email, password).await {
        Ok(Some(id)) => log::info!("✅ Admin account ready ({})", id),
        Ok(None) => {}
        Err(e) => log::error!("❌ Failed to seed admin account: {}", e),
    }
}
