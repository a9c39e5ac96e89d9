/// User ids issued by the identity provider (the `sub` claim).
pub type DbId = i64;

/// Play ids are opaque strings: either client-chosen or a server UUIDv7.
pub type PlayId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
