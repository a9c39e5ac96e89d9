//! Play session records and the session-creation wire types.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::keys::validate_client_play_id;
use crate::types::{DbId, PlayId, Timestamp};

/// Maximum length of the `gameId` / `levelId` / `deviceId` fields.
pub const MAX_REF_LENGTH: usize = 256;

/// One gameplay attempt, owned by the user that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySession {
    pub play_id: PlayId,
    pub owner_id: DbId,
    pub game_id: String,
    pub level_id: String,
    pub device_id: String,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRecord>,
}

impl PlaySession {
    /// Whether `user_id` owns this play.
    pub fn is_owned_by(&self, user_id: DbId) -> bool {
        self.owner_id == user_id
    }
}

/// Server-generated play id for requests without a `clientPlayId`.
///
/// UUIDv7 ids sort by creation time.
pub fn new_play_id() -> PlayId {
    uuid::Uuid::now_v7().to_string()
}

/// Uploaded recording attached to a play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub url: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_at: Timestamp,
}

/// Body of `POST /plays`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlayRequest {
    pub game_id: String,
    pub level_id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_play_id: Option<String>,
}

impl CreatePlayRequest {
    /// Reject blank references and malformed client ids.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("gameId", &self.game_id),
            ("levelId", &self.level_id),
            ("deviceId", &self.device_id),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{field} is required")));
            }
            if value.len() > MAX_REF_LENGTH {
                return Err(CoreError::Validation(format!(
                    "{field} exceeds {MAX_REF_LENGTH} characters"
                )));
            }
        }
        if let Some(id) = &self.client_play_id {
            validate_client_play_id(id)?;
        }
        Ok(())
    }
}

/// Response of `POST /plays`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlayResponse {
    pub play_id: PlayId,
    pub reused: bool,
}

/// Response of `POST /plays/{id}/media`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreatePlayRequest {
        CreatePlayRequest {
            game_id: "g1".into(),
            level_id: "l1".into(),
            device_id: "d1".into(),
            client_play_id: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn blank_level_is_rejected() {
        let mut req = request();
        req.level_id = "  ".into();
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("levelId"));
    }

    #[test]
    fn bad_client_play_id_is_rejected() {
        let mut req = request();
        req.client_play_id = Some("a/b".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn generated_ids_are_valid_client_ids() {
        let id = new_play_id();
        assert!(validate_client_play_id(&id).is_ok());
        assert_ne!(id, new_play_id());
    }

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let json = serde_json::json!({
            "gameId": "g", "levelId": "l", "deviceId": "d", "clientPlayId": "abc"
        });
        let req: CreatePlayRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.client_play_id.as_deref(), Some("abc"));
    }
}
