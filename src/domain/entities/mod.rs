pub mod conversation;
pub mod message;
pub mod notification;
pub mod participant;

pub use conversation::*;
pub use message::*;
pub use notification::*;
pub use participant::*;

use chrono::SecondsFormat;

/// RFC 3339 UTC timestamp with microseconds; sorts lexicographically.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
