pub mod archive;
pub mod user;

pub use archive::*;
pub use user::*;

use mongodb::bson::DateTime as BsonDateTime;

/// RFC 3339 rendering of a stored timestamp for JSON responses.
pub fn format_datetime(dt: BsonDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(dt.timestamp_millis())
        .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
