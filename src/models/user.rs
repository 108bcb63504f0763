use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;

pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// User account as stored in MongoDB
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    /// bcrypt hash; None for Google-only accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_expires: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<BsonDateTime>,
}

fn default_is_active() -> bool {
    true
}

impl User {
    pub fn new(email: String, password_hash: Option<String>, google_id: Option<String>, role: Role) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            email,
            password: password_hash,
            google_id,
            role,
            is_active: true,
            reset_token_hash: None,
            reset_token_expires: None,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// Public projection of a user; never carries secrets.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub has_password: bool,
    pub has_google: bool,
    pub created_at: String,
    pub updated_at: String,
    pub last_login: Option<String>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            id: u.id_hex(),
            email: u.email,
            role: u.role,
            is_active: u.is_active,
            has_password: u.password.is_some(),
            has_google: u.google_id.is_some(),
            created_at: format_datetime(u.created_at),
            updated_at: format_datetime(u.updated_at),
            last_login: u.last_login.map(format_datetime),
        }
    }
}

/// Admin request to create a user
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

/// Admin request to update a user; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_secrets() {
        let mut user = User::new(
            "clerk@archive.org".into(),
            Some("$2b$12$hash".into()),
            None,
            Role::Admin,
        );
        user.id = Some(ObjectId::new());
        user.reset_token_hash = Some("abc".into());

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["hasPassword"], true);
        assert_eq!(json["hasGoogle"], false);
        assert!(json.get("password").is_none());
        assert!(json.get("resetTokenHash").is_none());
    }

    #[test]
    fn missing_role_and_active_flag_take_defaults() {
        let doc = mongodb::bson::doc! {
            "email": "old@archive.org",
            "createdAt": BsonDateTime::now(),
            "updatedAt": BsonDateTime::now(),
        };
        let user: User = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert!(user.password.is_none());
    }
}
