use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::models::User;
use crate::services::auth_service;
use crate::services::blob_service::BlobStorage;
use crate::services::mail_service::Mailer;
use crate::services::search_service::SearchClient;
use crate::utils::AppError;

/// Shared handles passed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub db: MongoDB,
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub blob: Option<BlobStorage>,
    pub search: Option<SearchClient>,
    pub mailer: Mailer,
    /// Fixed account table standing in for the users collection
    #[cfg(test)]
    pub accounts: Option<Vec<User>>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> Result<Self, String> {
        let db = MongoDB::new(&config.mongodb_uri)
            .await
            .map_err(|e| format!("Failed to connect to MongoDB: {}", e))?;
        log::info!("✅ MongoDB connected successfully");

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        let blob = match &config.storage_connection_string {
            Some(conn) => {
                let storage = BlobStorage::new(http.clone(), conn, &config.storage_container)
                    .map_err(|e| e.to_string())?;
                if let Err(e) = storage.ensure_container().await {
                    log::warn!("⚠️  Could not ensure blob container '{}': {}", storage.container(), e);
                }
                Some(storage)
            }
            None => {
                log::warn!("⚠️  AZURE_STORAGE_CONNECTION_STRING not set: uploads disabled");
                None
            }
        };

        let search = match &config.search {
            Some(cfg) => {
                let client = SearchClient::new(http.clone(), cfg);
                if let Err(e) = client.ensure_index().await {
                    log::warn!("⚠️  Could not ensure search index '{}': {}", cfg.index, e);
                }
                Some(client)
            }
            None => {
                log::warn!("⚠️  Azure Search not configured: /api/search disabled");
                None
            }
        };

        let mailer = Mailer::new(config.smtp.as_ref()).map_err(|e| e.to_string())?;

        Ok(Self {
            db,
            config: Arc::new(config),
            http,
            blob,
            search,
            mailer,
            #[cfg(test)]
            accounts: None,
        })
    }

    pub fn blob(&self) -> Result<&BlobStorage, AppError> {
        self.blob
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("File storage is not configured".to_string()))
    }

    pub fn search(&self) -> Result<&SearchClient, AppError> {
        self.search
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("Search is not configured".to_string()))
    }

    /// Account a token subject points at, as currently stored
    pub async fn find_account(&self, user_id: &str) -> Result<Option<User>, AppError> {
        if let Some(found) = self.fixed_account(user_id) {
            return Ok(found);
        }
        auth_service::find_account(&self.db, user_id).await
    }

    #[cfg(not(test))]
    fn fixed_account(&self, _user_id: &str) -> Option<Option<User>> {
        None
    }

    #[cfg(test)]
    fn fixed_account(&self, user_id: &str) -> Option<Option<User>> {
        self.accounts
            .as_ref()
            .map(|accounts| accounts.iter().find(|u| u.id_hex() == user_id).cloned())
    }

    /// State with a lazily-connected database and no external services.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let config = AppConfig::for_tests();
        let db = MongoDB::connect_lazy(&config.mongodb_uri)
            .await
            .expect("lazy client");
        Self {
            db,
            config: Arc::new(config),
            http: reqwest::Client::new(),
            blob: None,
            search: None,
            mailer: Mailer::disabled(),
            accounts: Some(Vec::new()),
        }
    }

    /// Test state whose token subjects resolve against `accounts`.
    #[cfg(test)]
    pub async fn for_tests_with(accounts: Vec<User>) -> Self {
        let mut state = Self::for_tests().await;
        state.accounts = Some(accounts);
        state
    }
}

/// Stored account with an id plus a bearer header signed for it.
#[cfg(test)]
pub fn test_account(email: &str, role: crate::models::Role) -> (User, String) {
    let mut user = User::new(email.to_string(), None, None, role);
    user.id = Some(mongodb::bson::oid::ObjectId::new());
    let token = auth_service::generate_jwt(&user, &AppConfig::for_tests().jwt).expect("token");
    (user, format!("Bearer {}", token))
}
