pub mod archives;
pub mod auth;
pub mod health;
pub mod search;
pub mod suggestions;
pub mod swagger;
pub mod users;
