pub mod auth;
pub mod security_headers;

pub use auth::{AdminUser, AuthMiddleware, MaybeUser};
pub use security_headers::SecurityHeaders;
