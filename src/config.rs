use std::env;

/// JWT signing settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

/// SMTP settings for password reset mail
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Azure Cognitive Search settings
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index: String,
}

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub jwt: JwtConfig,
    pub storage_connection_string: Option<String>,
    pub storage_container: String,
    pub search: Option<SearchConfig>,
    pub smtp: Option<SmtpConfig>,
    pub frontend_url: String,
    pub google_client_id: Option<String>,
    pub max_upload_bytes: usize,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let mongodb_uri = required("MONGODB_URI")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "constitutional-archive".to_string()),
            audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "archive-api".to_string()),
            ttl_hours: parsed("JWT_TTL_HOURS", 24),
        };

        // Search is only enabled when both endpoint and key are present
        let search = match (optional("AZURE_SEARCH_ENDPOINT"), optional("AZURE_SEARCH_API_KEY")) {
            (Some(endpoint), Some(api_key)) => Some(SearchConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
                index: env::var("AZURE_SEARCH_INDEX").unwrap_or_else(|_| "archives-index".to_string()),
            }),
            _ => None,
        };

        let smtp = optional("SMTP_HOST").map(|host| {
            let username = env::var("SMTP_USER").unwrap_or_default();
            SmtpConfig {
                host,
                port: parsed("SMTP_PORT", 587),
                from: optional("SMTP_FROM").unwrap_or_else(|| username.clone()),
                password: env::var("SMTP_PASS").unwrap_or_default(),
                username,
            }
        });

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT", 5000),
            mongodb_uri,
            jwt,
            storage_connection_string: optional("AZURE_STORAGE_CONNECTION_STRING"),
            storage_container: env::var("AZURE_STORAGE_CONTAINER").unwrap_or_else(|_| "archives".to_string()),
            search,
            smtp,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }

    /// Configuration used by handler tests: no external services.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            mongodb_uri: "mongodb://localhost:27017/archive_test".to_string(),
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: "constitutional-archive".to_string(),
                audience: "archive-api".to_string(),
                ttl_hours: 1,
            },
            storage_connection_string: None,
            storage_container: "archives".to_string(),
            search: None,
            smtp: None,
            frontend_url: "http://localhost:3000".to_string(),
            google_client_id: None,
            max_upload_bytes: 1024,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn required(key: &str) -> Result<String, String> {
    optional(key).ok_or_else(|| format!("{} must be set", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
