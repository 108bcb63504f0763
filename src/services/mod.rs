pub mod archive_service;
pub mod auth_service;
pub mod blob_service;
pub mod mail_service;
pub mod search_service;
pub mod suggestion_service;
pub mod user_service;
