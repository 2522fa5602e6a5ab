/// Input validation for identifiers arriving from callers and publishers
use crate::fleet::ServerType;
use thiserror::Error;
use uuid::Uuid;

/// Longest server or proxy id accepted.
pub const MAX_SERVER_ID_LEN: usize = 128;

/// Most player ids accepted in one batch lookup.
pub const MAX_PLAYER_IDS: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid player id '{0}' (expected a UUID)")]
    PlayerIdInvalid(String),

    #[error("Player id list too large (max {max} ids, got {actual})")]
    PlayerIdListTooLarge { max: usize, actual: usize },

    #[error("Server id cannot be empty")]
    ServerIdEmpty,

    #[error("Server id too long (max {max} bytes, got {0})", max = MAX_SERVER_ID_LEN)]
    ServerIdTooLong(usize),

    #[error("Server id cannot contain control characters")]
    ServerIdInvalidChars,

    #[error("Unknown server type '{0}'")]
    ServerTypeUnknown(String),
}

/// Parses a player id
///
/// Rules:
/// - Must be a UUID (hyphenated, simple, braced or URN form)
pub fn validate_player_id(player_id: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(player_id).map_err(|_| ValidationError::PlayerIdInvalid(player_id.to_string()))
}

/// Parses a list of player ids for batch lookups
///
/// Rules:
/// - Max 1000 ids per request
/// - Each id must be valid
pub fn validate_player_ids(player_ids: &[String]) -> Result<Vec<Uuid>, ValidationError> {
    if player_ids.len() > MAX_PLAYER_IDS {
        return Err(ValidationError::PlayerIdListTooLarge {
            max: MAX_PLAYER_IDS,
            actual: player_ids.len(),
        });
    }

    player_ids.iter().map(|id| validate_player_id(id)).collect()
}

/// Validates a game server or proxy id
///
/// Rules:
/// - Cannot be empty
/// - Max 128 bytes
/// - No control characters; the id is otherwise opaque
pub fn validate_server_id(server_id: &str) -> Result<(), ValidationError> {
    if server_id.is_empty() {
        return Err(ValidationError::ServerIdEmpty);
    }

    if server_id.len() > MAX_SERVER_ID_LEN {
        return Err(ValidationError::ServerIdTooLong(server_id.len()));
    }

    if server_id.chars().any(char::is_control) {
        return Err(ValidationError::ServerIdInvalidChars);
    }

    Ok(())
}

/// Parses a server type wire name such as `LOBBY`
pub fn validate_server_type(server_type: &str) -> Result<ServerType, ValidationError> {
    server_type
        .parse()
        .map_err(|_| ValidationError::ServerTypeUnknown(server_type.to_string()))
}

/// Parses every server type in a batch; the first unknown name fails the batch
pub fn validate_server_types(server_types: &[String]) -> Result<Vec<ServerType>, ValidationError> {
    server_types
        .iter()
        .map(|t| validate_server_type(t))
        .collect()
}
