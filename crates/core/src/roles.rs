//! Well-known role name constants.

/// Elevated role allowed to read and delete any play.
pub const ROLE_ADMIN: &str = "admin";

/// Default role for players recording their own sessions.
pub const ROLE_PLAYER: &str = "player";
