//! Player lifecycle messages and their decoding.
//!
//! A message arrives as an [`Envelope`]: a type tag naming the message and a
//! JSON payload. [`decode`] turns it into a [`PlayerEvent`] or a
//! [`DecodeError`]. Every decode error is permanent; the same bytes will never
//! decode on a later attempt.
//!
//! Server and proxy ids are opaque: any non-empty string is accepted. The
//! username is best-effort and never fails a message.

use crate::validation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use tracker_db::PlayerName;
use uuid::Uuid;

pub const CONNECT_TYPE: &str = "tracker.message.PlayerConnectMessage";
pub const DISCONNECT_TYPE: &str = "tracker.message.PlayerDisconnectMessage";
pub const SWITCH_TYPE: &str = "tracker.message.PlayerSwitchServerMessage";

/// One message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub type_tag: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(type_tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag: type_tag.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Player connected to a proxy.
    Connect {
        player_id: Uuid,
        proxy_id: String,
        username: Option<PlayerName>,
    },
    /// Player left the network.
    Disconnect { player_id: Uuid },
    /// Player was sent to a game server.
    Switch { player_id: Uuid, server_id: String },
}

impl PlayerEvent {
    pub fn player_id(&self) -> Uuid {
        match self {
            PlayerEvent::Connect { player_id, .. }
            | PlayerEvent::Disconnect { player_id }
            | PlayerEvent::Switch { player_id, .. } => *player_id,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            PlayerEvent::Connect { .. } => CONNECT_TYPE,
            PlayerEvent::Disconnect { .. } => DISCONNECT_TYPE,
            PlayerEvent::Switch { .. } => SWITCH_TYPE,
        }
    }

    /// Encode for publishing.
    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            PlayerEvent::Connect {
                player_id,
                proxy_id,
                username,
            } => serde_json::to_vec(&ConnectMessage {
                player_id: player_id.to_string(),
                server_id: proxy_id.clone(),
                player_username: username.as_ref().map(|name| name.to_string()),
            }),
            PlayerEvent::Disconnect { player_id } => serde_json::to_vec(&DisconnectMessage {
                player_id: player_id.to_string(),
            }),
            PlayerEvent::Switch {
                player_id,
                server_id,
            } => serde_json::to_vec(&SwitchMessage {
                player_id: player_id.to_string(),
                server_id: server_id.clone(),
            }),
        };
        // Plain string fields only, serialization cannot fail
        Envelope::new(self.type_tag(), payload.unwrap_or_default())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("malformed {type_tag} payload: {source}")]
    MalformedPayload {
        type_tag: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid player id '{0}'")]
    InvalidPlayerId(String),

    #[error("{0} cannot be empty")]
    EmptyServerId(&'static str),
}

/// Connect message; `server_id` is the proxy the player joined through.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectMessage {
    player_id: String,
    server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    player_username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectMessage {
    player_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchMessage {
    player_id: String,
    server_id: String,
}

/// Classify an envelope by its type tag and decode its payload.
pub fn decode(envelope: &Envelope) -> Result<PlayerEvent, DecodeError> {
    match envelope.type_tag.as_str() {
        CONNECT_TYPE => {
            let msg: ConnectMessage = parse(CONNECT_TYPE, &envelope.payload)?;
            Ok(PlayerEvent::Connect {
                player_id: player_id(&msg.player_id)?,
                proxy_id: server_id("proxy id", msg.server_id)?,
                username: username(msg.player_username),
            })
        }
        DISCONNECT_TYPE => {
            let msg: DisconnectMessage = parse(DISCONNECT_TYPE, &envelope.payload)?;
            Ok(PlayerEvent::Disconnect {
                player_id: player_id(&msg.player_id)?,
            })
        }
        SWITCH_TYPE => {
            let msg: SwitchMessage = parse(SWITCH_TYPE, &envelope.payload)?;
            Ok(PlayerEvent::Switch {
                player_id: player_id(&msg.player_id)?,
                server_id: server_id("server id", msg.server_id)?,
            })
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

fn parse<'a, T: Deserialize<'a>>(type_tag: &'static str, payload: &'a [u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError::MalformedPayload { type_tag, source })
}

fn player_id(raw: &str) -> Result<Uuid, DecodeError> {
    validation::validate_player_id(raw).map_err(|_| DecodeError::InvalidPlayerId(raw.to_string()))
}

fn server_id(field: &'static str, raw: String) -> Result<String, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyServerId(field));
    }
    Ok(raw)
}

fn username(raw: Option<String>) -> Option<PlayerName> {
    match raw.as_deref() {
        None | Some("") => None,
        Some(name) => match PlayerName::from(name) {
            Ok(name) => Some(name),
            Err(_) => {
                warn!(
                    username = name,
                    max_bytes = PlayerName::new().capacity(),
                    "username does not fit, dropping it"
                );
                None
            }
        },
    }
}
