use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};

use crate::models::{ARCHIVES_COLLECTION, USERS_COLLECTION};
use crate::utils::AppError;

const DEFAULT_DB_NAME: &str = "constitutional_archive";

/// Parses a hex ObjectId from a path or body, answering 400 when malformed.
pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {} ID", what)))
}

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    /// Connects, checks the connection and makes sure indexes exist.
    pub async fn new(uri: &str) -> Result<Self, mongodb::error::Error> {
        let mongodb = Self::connect_lazy(uri).await?;

        // Test connection
        mongodb.db.run_command(doc! { "ping": 1 }).await?;

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Builds the client without touching the server; the driver connects on first use.
    pub async fn connect_lazy(uri: &str) -> Result<Self, mongodb::error::Error> {
        let mut client_options = ClientOptions::parse(uri).await?;

        client_options.app_name = Some("constitutional-archive".to_string());
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));
        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        // Database name comes from the URI path when present
        let db_name = client_options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&db_name);

        Ok(Self { client, db })
    }

    /// Creates the indexes the route handlers rely on
    async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        log::info!("🔧 Creating database indexes...");

        let users = self.collection::<Document>(USERS_COLLECTION);

        // Unique email: duplicate signups surface as E11000
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        users.create_index(email_index).await?;
        log::info!("   ✅ Index ready: users(email) unique");

        let google_index = IndexModel::builder()
            .keys(doc! { "googleId": 1 })
            .options(IndexOptions::builder().sparse(true).build())
            .build();
        match users.create_index(google_index).await {
            Ok(_) => log::info!("   ✅ Index ready: users(googleId)"),
            Err(e) => log::debug!("   ℹ️  Index users(googleId) not created: {}", e),
        }

        let archives = self.collection::<Document>(ARCHIVES_COLLECTION);

        // Directory listing: children of a parent, directories first, by name
        let listing_index = IndexModel::builder()
            .keys(doc! { "parentId": 1, "type": 1, "name": 1 })
            .build();
        match archives.create_index(listing_index).await {
            Ok(_) => log::info!("   ✅ Index ready: archives(parentId, type, name)"),
            Err(e) => log::debug!("   ℹ️  Index archives(parentId, type, name) not created: {}", e),
        }

        let keywords_index = IndexModel::builder()
            .keys(doc! { "metadata.keywords": 1 })
            .build();
        match archives.create_index(keywords_index).await {
            Ok(_) => log::info!("   ✅ Index ready: archives(metadata.keywords)"),
            Err(e) => log::debug!("   ℹ️  Index archives(metadata.keywords) not created: {}", e),
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    /// Round-trips a ping; used by the health endpoint
    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_ids() {
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex(), "user").unwrap(), id);

        let err = parse_object_id("not-an-id", "user").unwrap_err();
        assert_eq!(err.to_string(), "Invalid user ID");
    }

    #[tokio::test]
    async fn database_name_comes_from_uri() {
        let db = MongoDB::connect_lazy("mongodb://localhost:27017/archive_test").await.unwrap();
        assert_eq!(db.db.name(), "archive_test");

        let db = MongoDB::connect_lazy("mongodb://localhost:27017").await.unwrap();
        assert_eq!(db.db.name(), DEFAULT_DB_NAME);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017/archive_test".to_string());
        let db = MongoDB::new(&uri).await;
        assert!(db.is_ok());
    }
}
